//! Batch pipeline - main run orchestration
//!
//! One run walks the planned shards in manifest order. Each shard's filtered
//! URLs are cut into chunks; each chunk is fetched with bounded concurrency
//! and flushed to the sink as a single append before the next chunk is cut.
//!
//! Failure policy:
//! - manifest or sink failures end the run
//! - shard failures skip the shard
//! - page failures skip the page

use crate::config::{Config, IndexConfig};
use crate::crawler::chunker::Chunker;
use crate::crawler::fetcher::{build_http_client, harvest_page};
use crate::crawler::index::{load_shard_refs, plan_shards, ShardRef};
use crate::crawler::shard::fetch_shard;
use crate::state::{PhaseTracker, PipelinePhase};
use crate::storage::{PageMetadata, RunStatus, Storage};
use crate::url::{DomainFilter, FilteredUrl};
use crate::EnrichError;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Counters describing one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub shards_in_manifest: u64,
    pub shards_planned: u64,
    pub shards_processed: u64,
    pub shards_skipped: u64,
    pub candidates_seen: u64,
    pub records_skipped: u64,
    pub urls_filtered: u64,
    pub pages_fetched: u64,
    pub fetch_failures: u64,
    pub records_persisted: u64,
    pub chunks_flushed: u64,
    pub interrupted: bool,
}

impl RunSummary {
    /// True when every planned shard was processed without being skipped
    pub fn is_complete(&self) -> bool {
        !self.interrupted
            && self.shards_skipped == 0
            && self.shards_processed == self.shards_planned
    }

    /// Logs the summary at info level
    pub fn log(&self) {
        tracing::info!("{}", self);
        tracing::info!(
            "Shards: {} planned of {} listed, {} processed, {} skipped",
            self.shards_planned,
            self.shards_in_manifest,
            self.shards_processed,
            self.shards_skipped
        );
        tracing::info!(
            "URLs: {} candidates, {} undecodable records, {} in domain space",
            self.candidates_seen,
            self.records_skipped,
            self.urls_filtered
        );
        tracing::info!(
            "Pages: {} fetched, {} failed, {} persisted in {} chunks",
            self.pages_fetched,
            self.fetch_failures,
            self.records_persisted,
            self.chunks_flushed
        );
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.interrupted {
            write!(
                f,
                "Run interrupted after {} of {} shards",
                self.shards_processed + self.shards_skipped,
                self.shards_planned
            )
        } else if self.shards_skipped > 0 {
            write!(
                f,
                "Run completed with {} skipped shards",
                self.shards_skipped
            )
        } else {
            write!(f, "Run completed")
        }
    }
}

/// How processing of one shard ended
enum ShardOutcome {
    Completed,
    Skipped,
    Interrupted,
}

/// Mutable state of a run in progress
struct RunContext<'s, S> {
    storage: &'s mut S,
    run_id: i64,
    phase: PhaseTracker,
    summary: RunSummary,
}

impl<'s, S: Storage> RunContext<'s, S> {
    fn flush(&mut self, rows: &[PageMetadata]) -> Result<usize, EnrichError> {
        let written = if rows.is_empty() {
            0
        } else {
            self.storage.append_metadata(self.run_id, rows)?
        };

        self.summary.records_persisted += written as u64;
        self.summary.chunks_flushed += 1;
        Ok(written)
    }
}

/// Drives the load, filter, chunk, fetch, and flush cycle
pub struct Pipeline {
    client: Client,
    filter: DomainFilter,
    index: IndexConfig,
    chunk_size: usize,
    max_concurrent: usize,
    page_timeout: Duration,
    cancel: Arc<AtomicBool>,
}

impl Pipeline {
    /// Creates a pipeline with an HTTP client built from the fetcher settings
    pub fn new(config: &Config) -> Result<Self, EnrichError> {
        let client = build_http_client(&config.fetcher)?;
        Ok(Self::with_client(config, client))
    }

    /// Creates a pipeline around an existing HTTP client
    pub fn with_client(config: &Config, client: Client) -> Self {
        Self {
            client,
            filter: DomainFilter::from_config(&config.domain),
            index: config.index.clone(),
            chunk_size: config.pipeline.chunk_size.max(1),
            max_concurrent: config.fetcher.max_concurrent_fetches.max(1),
            page_timeout: Duration::from_secs(config.fetcher.timeout_secs),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag that stops the run at the next checkpoint when set
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Executes one run against the sink
    ///
    /// The run is recorded in the sink before any work starts and finished
    /// with its summary on every exit path, including fatal errors.
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - The run completed or was interrupted
    /// * `Err(EnrichError)` - A fatal error ended the run
    pub async fn run<S: Storage>(
        &self,
        storage: &mut S,
        config_hash: &str,
    ) -> Result<RunSummary, EnrichError> {
        let run_id = storage.create_run(config_hash)?;
        tracing::info!("Starting run {}", run_id);

        let mut ctx = RunContext {
            storage,
            run_id,
            phase: PhaseTracker::new(),
            summary: RunSummary::default(),
        };

        let start_time = Instant::now();
        let result = self.execute(&mut ctx).await;

        let status = match &result {
            Ok(()) if ctx.summary.interrupted => RunStatus::Interrupted,
            Ok(()) => RunStatus::Completed,
            Err(e) => {
                tracing::error!("Run {} failed in phase {}: {}", run_id, ctx.phase.current(), e);
                if ctx.phase.advance(PipelinePhase::Failed).is_err() {
                    tracing::debug!("Run {} already terminal", run_id);
                }
                RunStatus::Failed
            }
        };

        if let Err(e) = ctx.storage.finish_run(run_id, status, &ctx.summary) {
            tracing::error!("Failed to record end of run {}: {}", run_id, e);
            return Err(result.err().unwrap_or_else(|| e.into()));
        }

        result?;

        tracing::info!("Run {} finished in {:?}", run_id, start_time.elapsed());
        ctx.summary.log();

        Ok(ctx.summary)
    }

    async fn execute<S: Storage>(&self, ctx: &mut RunContext<'_, S>) -> Result<(), EnrichError> {
        let listed = load_shard_refs(&self.client, &self.index).await?;
        ctx.summary.shards_in_manifest = listed.len() as u64;

        let shards = plan_shards(listed, self.index.first_shard, self.index.max_shards);
        ctx.summary.shards_planned = shards.len() as u64;
        tracing::info!(
            "Planned {} of {} shards",
            ctx.summary.shards_planned,
            ctx.summary.shards_in_manifest
        );

        for (position, shard) in shards.iter().enumerate() {
            ctx.phase.advance(PipelinePhase::Filtering)?;

            if self.is_cancelled() {
                return self.interrupt(ctx);
            }

            tracing::info!(
                "Processing shard {}/{}: {}",
                position + 1,
                shards.len(),
                shard
            );

            match self.process_shard(ctx, shard).await? {
                ShardOutcome::Completed => ctx.summary.shards_processed += 1,
                ShardOutcome::Skipped => ctx.summary.shards_skipped += 1,
                ShardOutcome::Interrupted => return self.interrupt(ctx),
            }
        }

        ctx.phase.advance(PipelinePhase::Done)?;
        Ok(())
    }

    fn interrupt<S>(&self, ctx: &mut RunContext<'_, S>) -> Result<(), EnrichError> {
        tracing::warn!("Cancellation requested, stopping run {}", ctx.run_id);
        ctx.phase.advance(PipelinePhase::Interrupted)?;
        ctx.summary.interrupted = true;
        Ok(())
    }

    /// Streams one shard through the filter and flushes it chunk by chunk
    ///
    /// Only sink errors propagate. Download and decode failures are logged
    /// and reported as a skipped shard; chunks flushed before a mid-stream
    /// failure stay in the sink.
    async fn process_shard<S: Storage>(
        &self,
        ctx: &mut RunContext<'_, S>,
        shard: &ShardRef,
    ) -> Result<ShardOutcome, EnrichError> {
        let candidates = match fetch_shard(&self.client, shard).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!("Skipping shard: {}", e);
                return Ok(ShardOutcome::Skipped);
            }
        };

        let mut chunks = Chunker::new(candidates, &self.filter, self.chunk_size);
        let mut outcome = ShardOutcome::Completed;

        loop {
            if self.is_cancelled() {
                outcome = ShardOutcome::Interrupted;
                break;
            }

            ctx.phase.advance(PipelinePhase::Chunking)?;
            let Some(chunk) = chunks.next_chunk().await else {
                break;
            };

            ctx.phase.advance(PipelinePhase::Fetching)?;
            let rows = self.process_chunk(ctx, &chunk).await;

            ctx.phase.advance(PipelinePhase::Flushing)?;
            let written = ctx.flush(&rows)?;

            tracing::info!(
                "Chunk {}: {} of {} pages persisted",
                ctx.summary.chunks_flushed,
                written,
                chunk.len()
            );
        }

        ctx.summary.candidates_seen += chunks.candidates();
        ctx.summary.urls_filtered += chunks.filtered();
        ctx.summary.records_skipped += chunks.inner().skipped();

        if let Some(e) = chunks.take_error() {
            tracing::warn!("Skipping rest of shard: {}", e);
            outcome = ShardOutcome::Skipped;
        }

        Ok(outcome)
    }

    /// Fetches and extracts one chunk with at most `max_concurrent` requests in flight
    ///
    /// Returns only the successful extractions; failures are logged and counted.
    async fn process_chunk<S>(
        &self,
        ctx: &mut RunContext<'_, S>,
        chunk: &[FilteredUrl],
    ) -> Vec<PageMetadata> {
        let results: Vec<_> = stream::iter(
            chunk
                .iter()
                .map(|url| harvest_page(&self.client, url, self.page_timeout)),
        )
        .buffer_unordered(self.max_concurrent)
        .collect()
        .await;

        let mut rows = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(meta) => rows.push(meta),
                Err(e) => {
                    tracing::warn!("Skipping page {}: {}", e.url(), e);
                    ctx.summary.fetch_failures += 1;
                }
            }
        }

        ctx.summary.pages_fetched += rows.len() as u64;
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DomainConfig, FetcherConfig, OutputConfig, PipelineConfig, WriteMode};
    use crate::crawler::fetcher::http_client_builder;
    use crate::storage::SqliteStorage;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    const CRAWL: &str = "CC-TEST-01";

    fn gzip(text: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    fn test_config(base_url: &str, chunk_size: usize) -> Config {
        Config {
            index: IndexConfig {
                base_url: base_url.to_string(),
                crawl_id: CRAWL.to_string(),
                manifest_name: "cc-index.paths.gz".to_string(),
                first_shard: 0,
                max_shards: None,
            },
            fetcher: FetcherConfig {
                timeout_secs: 5,
                max_concurrent_fetches: 4,
                ..FetcherConfig::default()
            },
            pipeline: PipelineConfig { chunk_size },
            domain: DomainConfig::default(),
            output: OutputConfig {
                database_path: ":memory:".to_string(),
                table: "common_crawl_raw".to_string(),
                write_mode: WriteMode::Append,
            },
        }
    }

    /// Client that sends every `.com.au` host used below to the mock server
    fn client_for(server: &MockServer) -> Client {
        let mut builder = http_client_builder(&FetcherConfig::default());
        for host in ["acme.com.au", "beta.com.au", "gamma.org.au", "broken.com.au"] {
            builder = builder.resolve(host, *server.address());
        }
        builder.build().unwrap()
    }

    fn record(server: &MockServer, host: &str, page: &str) -> String {
        format!(
            "{{\"url\": \"http://{}:{}/{}\"}}\n",
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

    async fn mount_shard(server: &MockServer, name: &str, body: String) {
        Mock::given(method("GET"))
            .and(path(format!("/{}", name)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip(&body)))
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

    fn memory_storage() -> SqliteStorage {
        SqliteStorage::new_in_memory("common_crawl_raw", WriteMode::Append).unwrap()
    }

    /// Shard listing `n` pages on acme.com.au, named `page-0` onwards
    async fn mount_page_shard(server: &MockServer, n: usize) {
        mount_manifest(server, &["shards/a.gz"]).await;
        let body: String = (0..n)
            .map(|i| record(server, "acme.com.au", &format!("page-{}", i)))
            .collect();
        mount_shard(server, "shards/a.gz", body).await;
    }

    /// Answers slowly and remembers when each request arrived
    struct SlowPage {
        delay: Duration,
        arrivals: Arc<Mutex<Vec<Instant>>>,
    }

    impl Respond for SlowPage {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            self.arrivals.lock().unwrap().push(Instant::now());
            ResponseTemplate::new(200)
                .set_body_string("<title>Acme</title>")
                .set_delay(self.delay)
        }
    }

    /// Raises the cancel flag when the given request number arrives
    struct CancelOnRequest {
        cancel: Arc<AtomicBool>,
        seen: AtomicUsize,
        at: usize,
    }

    impl Respond for CancelOnRequest {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            if self.seen.fetch_add(1, Ordering::SeqCst) + 1 == self.at {
                self.cancel.store(true, Ordering::SeqCst);
            }
            ResponseTemplate::new(200).set_body_string("<title>Acme</title>")
        }
    }

    #[test]
    fn test_summary_display() {
        let mut summary = RunSummary {
            shards_planned: 3,
            shards_processed: 3,
            ..RunSummary::default()
        };
        assert!(summary.is_complete());
        assert_eq!(summary.to_string(), "Run completed");

        summary.shards_processed = 2;
        summary.shards_skipped = 1;
        assert!(!summary.is_complete());
        assert_eq!(summary.to_string(), "Run completed with 1 skipped shards");

        summary.interrupted = true;
        assert_eq!(summary.to_string(), "Run interrupted after 3 of 3 shards");
    }

    #[tokio::test]
    async fn test_run_flushes_chunks() {
        let server = MockServer::start().await;
        mount_manifest(&server, &["shards/a.gz"]).await;

        let mut body = String::new();
        for i in 0..5 {
            body.push_str(&record(&server, "acme.com.au", &format!("p{}", i)));
        }
        body.push_str("{\"url\": \"https://elsewhere.com/\"}\n");
        mount_shard(&server, "shards/a.gz", body).await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><head><title>Acme</title></head><body>cloud</body></html>"),
            )
            .mount(&server)
            .await;

        let pipeline = Pipeline::with_client(&test_config(&server.uri(), 2), client_for(&server));
        let mut storage = memory_storage();
        let summary = pipeline.run(&mut storage, "hash").await.unwrap();

        assert_eq!(summary.candidates_seen, 6);
        assert_eq!(summary.urls_filtered, 5);
        assert_eq!(summary.chunks_flushed, 3);
        assert_eq!(summary.records_persisted, 5);
        assert!(summary.is_complete());
        assert_eq!(storage.count_rows().unwrap(), 5);

        let run = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.records_persisted, 5);
    }

    #[tokio::test]
    async fn test_fetch_failure_does_not_block_chunk() {
        let server = MockServer::start().await;
        mount_manifest(&server, &["shards/a.gz"]).await;
        mount_shard(
            &server,
            "shards/a.gz",
            [
                record(&server, "acme.com.au", "ok-1"),
                record(&server, "broken.com.au", "missing"),
                record(&server, "beta.com.au", "ok-2"),
            ]
            .concat(),
        )
        .await;
        mount_page(&server, "ok-1", "<title>One</title>").await;
        mount_page(&server, "ok-2", "<title>Two</title>").await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let pipeline = Pipeline::with_client(&test_config(&server.uri(), 3), client_for(&server));
        let mut storage = memory_storage();
        let summary = pipeline.run(&mut storage, "hash").await.unwrap();

        assert_eq!(summary.chunks_flushed, 1);
        assert_eq!(summary.fetch_failures, 1);
        assert_eq!(summary.records_persisted, 2);
        assert!(summary.is_complete());
    }

    #[tokio::test]
    async fn test_unreachable_shard_is_skipped() {
        let server = MockServer::start().await;
        mount_manifest(&server, &["shards/gone.gz", "shards/a.gz"]).await;
        Mock::given(method("GET"))
            .and(path("/shards/gone.gz"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        mount_shard(&server, "shards/a.gz", record(&server, "acme.com.au", "home")).await;
        mount_page(&server, "home", "<title>Acme</title>").await;

        let pipeline = Pipeline::with_client(&test_config(&server.uri(), 10), client_for(&server));
        let mut storage = memory_storage();
        let summary = pipeline.run(&mut storage, "hash").await.unwrap();

        assert_eq!(summary.shards_skipped, 1);
        assert_eq!(summary.shards_processed, 1);
        assert_eq!(summary.records_persisted, 1);
        assert!(!summary.is_complete());
    }

    #[tokio::test]
    async fn test_missing_manifest_fails_run() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let pipeline = Pipeline::with_client(&test_config(&server.uri(), 10), client_for(&server));
        let mut storage = memory_storage();
        let err = pipeline.run(&mut storage, "hash").await.unwrap_err();

        assert!(matches!(err, EnrichError::Index(_)));
        let run = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(storage.count_rows().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_manifest_completes() {
        let server = MockServer::start().await;
        mount_manifest(&server, &[]).await;

        let pipeline = Pipeline::with_client(&test_config(&server.uri(), 10), client_for(&server));
        let mut storage = memory_storage();
        let summary = pipeline.run(&mut storage, "hash").await.unwrap();

        assert_eq!(summary.shards_planned, 0);
        assert!(summary.is_complete());
    }

    #[tokio::test]
    async fn test_cancelled_run_is_interrupted() {
        let server = MockServer::start().await;
        mount_manifest(&server, &["shards/a.gz"]).await;
        mount_shard(&server, "shards/a.gz", record(&server, "acme.com.au", "home")).await;

        let pipeline = Pipeline::with_client(&test_config(&server.uri(), 10), client_for(&server));
        pipeline.cancel_flag().store(true, Ordering::SeqCst);

        let mut storage = memory_storage();
        let summary = pipeline.run(&mut storage, "hash").await.unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.records_persisted, 0);
        let run = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Interrupted);
    }

    #[tokio::test]
    async fn test_page_fetches_never_exceed_limit() {
        let server = MockServer::start().await;
        mount_page_shard(&server, 6).await;

        let delay = Duration::from_millis(400);
        let arrivals = Arc::new(Mutex::new(Vec::new()));
        Mock::given(method("GET"))
            .and(path_regex("^/page-[0-9]+$"))
            .respond_with(SlowPage {
                delay,
                arrivals: Arc::clone(&arrivals),
            })
            .mount(&server)
            .await;

        let limit = 2;
        let mut config = test_config(&server.uri(), 6);
        config.fetcher.max_concurrent_fetches = limit;

        let pipeline = Pipeline::with_client(&config, client_for(&server));
        let mut storage = memory_storage();
        let started = Instant::now();
        let summary = pipeline.run(&mut storage, "hash").await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(summary.chunks_flushed, 1);
        assert_eq!(summary.records_persisted, 6);

        // A new request can only start once an earlier one has been answered,
        // so no window shorter than the delay may hold more than `limit` arrivals.
        let arrivals = arrivals.lock().unwrap().clone();
        assert_eq!(arrivals.len(), 6);
        let window = delay / 2;
        let peak = arrivals
            .iter()
            .map(|start| {
                arrivals
                    .iter()
                    .filter(|t| **t >= *start && t.duration_since(*start) < window)
                    .count()
            })
            .max()
            .unwrap();
        assert!(peak <= limit, "{} requests in flight", peak);
        assert!(elapsed >= delay * 3, "six pages took only {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_cancel_between_chunks_keeps_flushed_rows() {
        let server = MockServer::start().await;
        mount_page_shard(&server, 6).await;

        let mut config = test_config(&server.uri(), 2);
        config.fetcher.max_concurrent_fetches = 1;
        let pipeline = Pipeline::with_client(&config, client_for(&server));

        Mock::given(method("GET"))
            .and(path_regex("^/page-[0-9]+$"))
            .respond_with(CancelOnRequest {
                cancel: pipeline.cancel_flag(),
                seen: AtomicUsize::new(0),
                at: 2,
            })
            .mount(&server)
            .await;

        let mut storage = memory_storage();
        let summary = pipeline.run(&mut storage, "hash").await.unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.chunks_flushed, 1);
        assert_eq!(summary.records_persisted, 2);
        assert_eq!(storage.count_rows().unwrap(), 2);

        let run = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Interrupted);
        assert_eq!(run.records_persisted, 2);
    }
}
