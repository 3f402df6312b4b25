//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::config::{OutputConfig, WriteMode};
use crate::crawler::{Industry, RunSummary};
use crate::storage::schema::{initialize_schema, insert_sql};
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{PageMetadata, RunRecord, RunStatus};
use crate::EnrichError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

const RUN_COLUMNS: &str = "id, started_at, finished_at, config_hash, status, shards_planned, \
     shards_processed, shards_skipped, urls_filtered, fetch_failures, records_persisted";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
    table: String,
    mode: WriteMode,
}

impl SqliteStorage {
    /// Opens (or creates) the database described by the output configuration
    pub fn open(config: &OutputConfig) -> Result<Self, EnrichError> {
        Self::new(
            Path::new(&config.database_path),
            &config.table,
            config.write_mode,
        )
    }

    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `table` - Name of the metadata table
    /// * `mode` - Append or upsert-by-url
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(EnrichError)` - Failed to open database
    pub fn new(path: &Path, table: &str, mode: WriteMode) -> Result<Self, EnrichError> {
        check_table_name(table)?;

        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn, table, mode)?;

        Ok(Self {
            conn,
            table: table.to_string(),
            mode,
        })
    }

    /// Creates an in-memory database (for testing)
    pub fn new_in_memory(table: &str, mode: WriteMode) -> Result<Self, EnrichError> {
        check_table_name(table)?;
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn, table, mode)?;
        Ok(Self {
            conn,
            table: table.to_string(),
            mode,
        })
    }

    fn count(&self, sql: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

/// Rejects anything that is not a plain SQL identifier
fn check_table_name(table: &str) -> Result<(), StorageError> {
    let mut chars = table.chars();
    let valid = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false)
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidTable(table.to_string()))
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?).unwrap_or(RunStatus::Failed),
        shards_planned: row.get::<_, i64>(5)? as u64,
        shards_processed: row.get::<_, i64>(6)? as u64,
        shards_skipped: row.get::<_, i64>(7)? as u64,
        urls_filtered: row.get::<_, i64>(8)? as u64,
        fetch_failures: row.get::<_, i64>(9)? as u64,
        records_persisted: row.get::<_, i64>(10)? as u64,
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1");
        self.conn
            .query_row(&sql, params![run_id], run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM runs ORDER BY id DESC LIMIT 1");
        let run = self.conn.query_row(&sql, [], run_from_row).optional()?;
        Ok(run)
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        summary: &RunSummary,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, shards_planned = ?3,
             shards_processed = ?4, shards_skipped = ?5, urls_filtered = ?6,
             fetch_failures = ?7, records_persisted = ?8
             WHERE id = ?9",
            params![
                status.to_db_string(),
                now,
                summary.shards_planned as i64,
                summary.shards_processed as i64,
                summary.shards_skipped as i64,
                summary.urls_filtered as i64,
                summary.fetch_failures as i64,
                summary.records_persisted as i64,
                run_id
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Metadata Sink =====

    fn append_metadata(&mut self, run_id: i64, batch: &[PageMetadata]) -> StorageResult<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let sql = insert_sql(&self.table, self.mode);
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for meta in batch {
                written += stmt.execute(params![
                    meta.url,
                    meta.company_name,
                    meta.industry.as_str(),
                    run_id,
                    now
                ])?;
            }
        }
        tx.commit()?;

        Ok(written)
    }

    // ===== Statistics =====

    fn count_rows(&self) -> StorageResult<u64> {
        self.count(&format!("SELECT COUNT(*) FROM {}", self.table))
    }

    fn count_distinct_urls(&self) -> StorageResult<u64> {
        self.count(&format!("SELECT COUNT(DISTINCT url) FROM {}", self.table))
    }

    fn count_named_rows(&self) -> StorageResult<u64> {
        self.count(&format!(
            "SELECT COUNT(*) FROM {} WHERE company_name IS NOT NULL",
            self.table
        ))
    }

    fn count_by_industry(&self) -> StorageResult<HashMap<Industry, u64>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT industry, COUNT(*) FROM {} GROUP BY industry",
            self.table
        ))?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (industry, count) = row?;
            let industry = Industry::from_db_string(&industry).unwrap_or(Industry::Other);
            *counts.entry(industry).or_insert(0) += count as u64;
        }

        Ok(counts)
    }

    fn get_metadata_by_url(&self, url: &str) -> StorageResult<Vec<PageMetadata>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT url, company_name, industry FROM {} WHERE url = ?1 ORDER BY id",
            self.table
        ))?;

        let rows = stmt.query_map(params![url], |row| {
            Ok(PageMetadata {
                url: row.get(0)?,
                company_name: row.get(1)?,
                industry: Industry::from_db_string(&row.get::<_, String>(2)?)
                    .unwrap_or(Industry::Other),
            })
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }
}
