//! Database schema definitions
//!
//! The run table is fixed; the metadata table name comes from
//! configuration and has already been validated as a plain identifier.

use crate::config::WriteMode;

/// SQL schema for run bookkeeping
pub const RUNS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    shards_planned INTEGER NOT NULL DEFAULT 0,
    shards_processed INTEGER NOT NULL DEFAULT 0,
    shards_skipped INTEGER NOT NULL DEFAULT 0,
    urls_filtered INTEGER NOT NULL DEFAULT 0,
    fetch_failures INTEGER NOT NULL DEFAULT 0,
    records_persisted INTEGER NOT NULL DEFAULT 0
);
"#;

/// Builds the DDL for the metadata table
pub fn metadata_table_sql(table: &str, mode: WriteMode) -> String {
    let mut sql = format!(
        "
CREATE TABLE IF NOT EXISTS {table} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    company_name TEXT,
    industry TEXT NOT NULL,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    extracted_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_{table}_industry ON {table}(industry);
CREATE INDEX IF NOT EXISTS idx_{table}_name ON {table}(company_name);
"
    );

    // Fails if the table already holds duplicate urls from append runs
    if mode == WriteMode::Upsert {
        sql.push_str(&format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_{table}_url_unique ON {table}(url);\n"
        ));
    } else {
        sql.push_str(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_url ON {table}(url);\n"
        ));
    }

    sql
}

/// Builds the insert statement for one metadata row
pub fn insert_sql(table: &str, mode: WriteMode) -> String {
    let insert = format!(
        "INSERT INTO {table} (url, company_name, industry, run_id, extracted_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)"
    );

    match mode {
        WriteMode::Append => insert,
        WriteMode::Upsert => format!(
            "{insert} ON CONFLICT(url) DO UPDATE SET \
             company_name = excluded.company_name, \
             industry = excluded.industry, \
             run_id = excluded.run_id, \
             extracted_at = excluded.extracted_at"
        ),
    }
}

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
/// * `table` - Name of the metadata table
/// * `mode` - Write policy for the metadata table
pub fn initialize_schema(
    conn: &rusqlite::Connection,
    table: &str,
    mode: WriteMode,
) -> Result<(), rusqlite::Error> {
    conn.execute_batch(RUNS_SQL)?;
    conn.execute_batch(&metadata_table_sql(table, mode))?;
    Ok(())
}
