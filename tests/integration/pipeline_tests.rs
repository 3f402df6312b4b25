//! Integration tests for the harvesting pipeline
//!
//! These tests use wiremock to stand in for both the crawl storage and the
//! harvested websites, and run the full load, filter, fetch, and flush cycle
//! against a SQLite file.

use cc_enrich::config::{parse_config, Config, WriteMode};
use cc_enrich::crawler::{http_client_builder, Industry, Pipeline};
use cc_enrich::output::load_statistics;
use cc_enrich::storage::{open_storage, RunStatus, SqliteStorage, Storage};
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::Client;
use std::io::Write;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CRAWL: &str = "CC-MAIN-2023-23";

/// Hosts the mock server answers for through DNS overrides
const HOSTS: &[&str] = &["acme.com.au", "broken.com.au", "clinic.org.au", "example.com"];

fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

/// Builds a validated configuration pointing at the mock server
///
/// `extra` is spliced into the `[index]` table.
fn create_test_config(server: &MockServer, db_path: &str, extra: &str) -> Config {
    let toml = format!(
        r#"
[index]
base-url = "{}"
crawl-id = "{}"
{}

[fetcher]
timeout-secs = 5
max-concurrent-fetches = 4

[pipeline]
chunk-size = 2

[output]
database-path = '{}'
"#,
        server.uri(),
        CRAWL,
        extra,
        db_path
    );
    parse_config(&toml).expect("test config should be valid")
}

fn client_for(server: &MockServer) -> Client {
    let mut builder = http_client_builder(&Default::default());
    for host in HOSTS {
        builder = builder.resolve(host, *server.address());
    }
    builder.build().unwrap()
}

/// A shard line pointing at the mock server under a real-looking host
fn record(server: &MockServer, host: &str, page: &str) -> String {
    format!(
        "{{\"url\": \"http://{}:{}/{}\", \"status\": \"200\"}}\n",
        host,
        server.address().port(),
        page
    )
}

async fn mount_manifest(server: &MockServer, shards: &[&str]) {
    Mock::given(method("GET"))
        .and(path(format!("/crawl-data/{}/cc-index.paths.gz", CRAWL)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip(&shards.join("\n"))))
        .mount(server)
        .await;
}

async fn mount_shard(server: &MockServer, name: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/{}", name)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip(body)))
        .mount(server)
        .await;
}

async fn mount_page(server: &MockServer, page: &str, html: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/{}", page)))
        .respond_with(ResponseTemplate::new(200).set_body_string(html.to_string()))
        .mount(server)
        .await;
}

/// Two shards: the first has three records, two in the domain space and one
/// of those unreachable; the second returns a server error.
async fn mount_two_shard_crawl(server: &MockServer) {
    mount_manifest(
        server,
        &[
            "cc-index/collections/CC-MAIN-2023-23/indexes/cdx-00000.gz",
            "cc-index/collections/CC-MAIN-2023-23/indexes/cdx-00001.gz",
        ],
    )
    .await;

    let shard = [
        record(server, "acme.com.au", "home"),
        record(server, "broken.com.au", "gone"),
        record(server, "example.com", "ignored"),
    ]
    .concat();
    mount_shard(
        server,
        "cc-index/collections/CC-MAIN-2023-23/indexes/cdx-00000.gz",
        &shard,
    )
    .await;

    Mock::given(method("GET"))
        .and(path(
            "/cc-index/collections/CC-MAIN-2023-23/indexes/cdx-00001.gz",
        ))
        .respond_with(ResponseTemplate::new(500))
        .mount(server)
        .await;

    mount_page(
        server,
        "home",
        r#"<html><head>
            <meta property="og:title" content="Acme Pty Ltd">
            <title>Welcome</title>
        </head><body><p>Cloud software for small business</p></body></html>"#,
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_end_to_end_with_skipped_shard_and_failed_fetch() {
    let server = MockServer::start().await;
    mount_two_shard_crawl(&server).await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("harvest.db");
    let config = create_test_config(&server, db_path.to_str().unwrap(), "");

    let pipeline = Pipeline::with_client(&config, client_for(&server));
    let summary = {
        let mut storage = open_storage(&config.output).unwrap();
        pipeline.run(&mut storage, "test-hash").await.unwrap()
    };

    assert_eq!(summary.shards_planned, 2);
    assert_eq!(summary.shards_processed, 1);
    assert_eq!(summary.shards_skipped, 1);
    assert_eq!(summary.candidates_seen, 3);
    assert_eq!(summary.urls_filtered, 2);
    assert_eq!(summary.pages_fetched, 1);
    assert_eq!(summary.fetch_failures, 1);
    assert_eq!(summary.records_persisted, 1);
    assert!(!summary.interrupted);
    assert!(!summary.is_complete());
    assert_eq!(summary.to_string(), "Run completed with 1 skipped shards");

    // Reopen from disk to check what was actually committed
    let storage = open_storage(&config.output).unwrap();
    assert_eq!(storage.count_rows().unwrap(), 1);

    let acme_url = format!("http://acme.com.au:{}/home", server.address().port());
    let rows = storage.get_metadata_by_url(&acme_url).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].company_name.as_deref(), Some("Acme Pty Ltd"));
    assert_eq!(rows[0].industry, Industry::Technology);

    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "test-hash");
    assert_eq!(run.shards_skipped, 1);
    assert_eq!(run.fetch_failures, 1);
    assert_eq!(run.records_persisted, 1);
    assert!(run.finished_at.is_some());
}

#[tokio::test]
async fn test_append_mode_duplicates_on_rerun() {
    let server = MockServer::start().await;
    mount_two_shard_crawl(&server).await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("append.db");
    let config = create_test_config(&server, db_path.to_str().unwrap(), "");
    assert_eq!(config.output.write_mode, WriteMode::Append);

    let pipeline = Pipeline::with_client(&config, client_for(&server));
    let mut storage = open_storage(&config.output).unwrap();
    pipeline.run(&mut storage, "first").await.unwrap();
    pipeline.run(&mut storage, "second").await.unwrap();

    assert_eq!(storage.count_rows().unwrap(), 2);
    assert_eq!(storage.count_distinct_urls().unwrap(), 1);
}

#[tokio::test]
async fn test_upsert_mode_does_not_duplicate_on_rerun() {
    let server = MockServer::start().await;
    mount_two_shard_crawl(&server).await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("upsert.db");
    let mut config = create_test_config(&server, db_path.to_str().unwrap(), "");
    config.output.write_mode = WriteMode::Upsert;

    let pipeline = Pipeline::with_client(&config, client_for(&server));
    let mut storage = open_storage(&config.output).unwrap();
    pipeline.run(&mut storage, "first").await.unwrap();
    pipeline.run(&mut storage, "second").await.unwrap();

    assert_eq!(storage.count_rows().unwrap(), 1);
    assert_eq!(storage.count_distinct_urls().unwrap(), 1);
}

#[tokio::test]
async fn test_shard_offset_and_cap() {
    let server = MockServer::start().await;
    mount_manifest(&server, &["s/0.gz", "s/1.gz", "s/2.gz", "s/3.gz"]).await;

    for (i, host) in ["acme.com.au", "clinic.org.au", "broken.com.au", "acme.com.au"]
        .iter()
        .enumerate()
    {
        mount_shard(
            &server,
            &format!("s/{}.gz", i),
            &record(&server, host, &format!("page-{}", i)),
        )
        .await;
    }
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><head><title>Page</title></head><body>clinic</body></html>"),
        )
        .mount(&server)
        .await;

    let config = create_test_config(&server, ":memory:", "first-shard = 1\nmax-shards = 2");
    let pipeline = Pipeline::with_client(&config, client_for(&server));
    let mut storage = SqliteStorage::new_in_memory("common_crawl_raw", WriteMode::Append).unwrap();
    let summary = pipeline.run(&mut storage, "hash").await.unwrap();

    assert_eq!(summary.shards_in_manifest, 4);
    assert_eq!(summary.shards_planned, 2);
    assert_eq!(summary.shards_processed, 2);
    assert_eq!(summary.records_persisted, 2);
    assert!(summary.is_complete());

    let port = server.address().port();
    assert_eq!(
        storage
            .get_metadata_by_url(&format!("http://clinic.org.au:{}/page-1", port))
            .unwrap()
            .len(),
        1
    );
    assert!(storage
        .get_metadata_by_url(&format!("http://acme.com.au:{}/page-0", port))
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_cdx_and_malformed_lines() {
    let server = MockServer::start().await;
    mount_manifest(&server, &["s/cdx.gz"]).await;

    let port = server.address().port();
    let shard = format!(
        "au,com,acme)/ 20230528093512 {{\"url\": \"http://acme.com.au:{port}/cdx\", \"mime\": \"text/html\"}}\n\
         this line is not a record\n\
         {{\"status\": \"200\"}}\n\
         {{\"url\": \"http://clinic.org.au:{port}/json\"}}\n"
    );
    mount_shard(&server, "s/cdx.gz", &shard).await;
    mount_page(&server, "cdx", "<h1>Acme Homewares</h1><p>Visit our store</p>").await;
    mount_page(&server, "json", "<title>Harbour Clinic</title><p>See a doctor today</p>").await;

    let config = create_test_config(&server, ":memory:", "");
    let pipeline = Pipeline::with_client(&config, client_for(&server));
    let mut storage = SqliteStorage::new_in_memory("common_crawl_raw", WriteMode::Append).unwrap();
    let summary = pipeline.run(&mut storage, "hash").await.unwrap();

    assert_eq!(summary.candidates_seen, 2);
    assert_eq!(summary.records_skipped, 2);
    assert_eq!(summary.records_persisted, 2);
    assert!(summary.is_complete());

    let stats = load_statistics(&storage).unwrap();
    assert_eq!(stats.total_rows, 2);
    assert_eq!(stats.named_rows, 2);
    assert_eq!(stats.rows_by_industry.get(&Industry::Retail), Some(&1));
    assert_eq!(stats.rows_by_industry.get(&Industry::Healthcare), Some(&1));
}

#[tokio::test]
async fn test_missing_manifest_marks_run_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("failed.db");
    let config = create_test_config(&server, db_path.to_str().unwrap(), "");

    let pipeline = Pipeline::with_client(&config, client_for(&server));
    let mut storage = open_storage(&config.output).unwrap();
    assert!(pipeline.run(&mut storage, "hash").await.is_err());

    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(storage.count_rows().unwrap(), 0);
}
