//! Integration tests for the pipeline
//!
//! These tests use wiremock to serve listing sites (and, in one test, the
//! extraction endpoint) and run jobs through all three stages end-to-end.

use async_trait::async_trait;
use listing_relay::config::{
    Config, CrawlerConfig, ExtractionConfig, OutputConfig, PipelineConfig, RetryConfig,
    RetryConfigs, UserAgentConfig,
};
use listing_relay::crawler::{
    ExtractedRecord, ExtractionError, ExtractionRequest, ExtractionService, HttpExtractionService,
};
use listing_relay::listing::RawValue;
use listing_relay::output::SortKey;
use listing_relay::queue::Stage;
use listing_relay::state::{FailureReason, JobState};
use listing_relay::storage::{SqliteStorage, Storage};
use listing_relay::{JobRequest, Orchestrator};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn quick_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 0,
        base_delay_ms: 1,
        multiplier: 1.0,
        jitter: 0.0,
        max_delay_ms: 1,
    }
}

/// Creates a test configuration writing into `out`
fn create_test_config(out: &Path, extraction_endpoint: &str) -> Config {
    Config {
        pipeline: PipelineConfig {
            crawl_workers: 2,
            clean_workers: 1,
            format_workers: 1,
            fetch_workers: 2,
            queue_max_attempts: 2,
        },
        crawler: CrawlerConfig {
            max_depth: 2,
            max_pages: 20,
            fetch_timeout_ms: 5_000,
            max_page_chars: 5_000,
            chunk_overlap_chars: 200,
            max_chunks: 3,
            same_host_only: true,
            minimum_time_on_page: 0,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        retry: RetryConfigs {
            fetch: quick_retry(),
            extraction: quick_retry(),
            rate_limit: quick_retry(),
        },
        extraction: ExtractionConfig {
            endpoint: extraction_endpoint.to_string(),
            api_key_env: None,
            timeout_ms: 5_000,
        },
        output: OutputConfig {
            directory: out.display().to_string(),
            database_path: None,
            sort: SortKey::PriceAsc,
        },
        targets: vec![],
    }
}

/// Returns canned records keyed by the page path
#[derive(Default)]
struct ScriptedExtractor {
    by_path: HashMap<String, Vec<ExtractedRecord>>,
}

impl ScriptedExtractor {
    fn with(mut self, page: &str, fields: &[(&str, &str)]) -> Self {
        let record = fields
            .iter()
            .map(|(k, v)| (k.to_string(), RawValue::Text(v.to_string())))
            .collect();
        self.by_path.entry(page.to_string()).or_default().push(record);
        self
    }
}

#[async_trait]
impl ExtractionService for ScriptedExtractor {
    async fn extract(
        &self,
        request: &ExtractionRequest,
    ) -> Result<Vec<ExtractedRecord>, ExtractionError> {
        Ok(self
            .by_path
            .get(request.source_url.path())
            .cloned()
            .unwrap_or_default())
    }
}

struct UnavailableExtractor;

#[async_trait]
impl ExtractionService for UnavailableExtractor {
    async fn extract(
        &self,
        _request: &ExtractionRequest,
    ) -> Result<Vec<ExtractedRecord>, ExtractionError> {
        Err(ExtractionError::Unavailable("model offline".to_string()))
    }
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        format!("<html><body>{}</body></html>", body).into_bytes(),
        "text/html",
    )
}

async fn mount_page(server: &MockServer, page: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(page))
        .respond_with(html(body))
        .mount(server)
        .await;
}

fn files_with_prefix(dir: &Path, prefix: &str) -> Vec<std::path::PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map_or(false, |n| n.starts_with(prefix))
            })
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn test_page_bound_limits_fetches() {
    let server = MockServer::start().await;
    let links: String = (1..=9)
        .map(|i| format!(r#"<a href="/p{}">p{}</a> "#, i, i))
        .collect();
    mount_page(&server, "/", &links).await;
    for i in 1..=9 {
        mount_page(&server, &format!("/p{}", i), "listing page").await;
    }

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir.path().join("out"), "http://127.0.0.1:9/extract");
    let orchestrator =
        Orchestrator::start(&config, Arc::new(ScriptedExtractor::default()), "hash").unwrap();

    let report = orchestrator
        .submit(JobRequest::new([format!("{}/", server.uri())]).with_bounds(2, 3))
        .await
        .unwrap()
        .wait()
        .await;
    orchestrator.shutdown().await;

    let crawl = report.crawl.unwrap();
    assert_eq!(report.state, JobState::Done);
    assert_eq!(crawl.attempted, 3);
    assert_eq!(crawl.succeeded, 3);
}

#[tokio::test]
async fn test_depth_bound_stops_link_following() {
    let server = MockServer::start().await;
    mount_page(&server, "/", r#"<a href="/d1">next</a>"#).await;
    mount_page(&server, "/d1", r#"<a href="/d2">next</a>"#).await;
    Mock::given(method("GET"))
        .and(path("/d2"))
        .respond_with(html("too deep"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir.path().join("out"), "http://127.0.0.1:9/extract");
    let orchestrator =
        Orchestrator::start(&config, Arc::new(ScriptedExtractor::default()), "hash").unwrap();

    let report = orchestrator
        .submit(JobRequest::new([format!("{}/", server.uri())]).with_bounds(1, 10))
        .await
        .unwrap()
        .wait()
        .await;
    orchestrator.shutdown().await;

    assert_eq!(report.state, JobState::Done);
    assert_eq!(report.crawl.unwrap().attempted, 2);
}

#[tokio::test]
async fn test_link_cycle_fetches_each_page_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html(r#"<a href="/b">b</a> <a href="/c">c</a>"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html(r#"<a href="/a">back to a</a>"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/c"))
        .respond_with(html("leaf"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir.path().join("out"), "http://127.0.0.1:9/extract");
    let orchestrator =
        Orchestrator::start(&config, Arc::new(ScriptedExtractor::default()), "hash").unwrap();

    // Depth 2 lets /b offer /a again; the page budget leaves room for it
    let report = orchestrator
        .submit(JobRequest::new([format!("{}/a", server.uri())]).with_bounds(2, 5))
        .await
        .unwrap()
        .wait()
        .await;
    orchestrator.shutdown().await;

    assert_eq!(report.state, JobState::Done);
    assert_eq!(report.crawl.unwrap().attempted, 3);
}

#[tokio::test]
async fn test_redirect_to_sibling_fetches_it_once() {
    let server = MockServer::start().await;
    mount_page(&server, "/", r#"<a href="/b">b</a> <a href="/c">c</a>"#).await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html("Casa b"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/c"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/b"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir.path().join("out"), "http://127.0.0.1:9/extract");
    let extractor = ScriptedExtractor::default().with("/b", &[("price", "90000"), ("address", "2 Elm St")]);
    let orchestrator = Orchestrator::start(&config, Arc::new(extractor), "hash").unwrap();

    let report = orchestrator
        .submit(JobRequest::new([format!("{}/", server.uri())]).with_bounds(2, 5))
        .await
        .unwrap()
        .wait()
        .await;
    orchestrator.shutdown().await;

    let crawl = report.crawl.unwrap();
    assert_eq!(report.state, JobState::Done);
    assert_eq!(crawl.attempted, 3);
    assert_eq!(crawl.succeeded, 2);
    assert_eq!(crawl.skipped, 1);
    assert_eq!(crawl.listings, 1);
}

#[tokio::test]
async fn test_all_seeds_missing_fails_job() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir.path().join("out"), "http://127.0.0.1:9/extract");
    let orchestrator =
        Orchestrator::start(&config, Arc::new(ScriptedExtractor::default()), "hash").unwrap();

    let report = orchestrator
        .submit(JobRequest::new([
            format!("{}/gone-1", server.uri()),
            format!("{}/gone-2", server.uri()),
        ]))
        .await
        .unwrap()
        .wait()
        .await;
    orchestrator.shutdown().await;

    assert_eq!(report.state, JobState::Failed);
    assert_eq!(report.failure, Some(FailureReason::NoPagesFetched));
    let crawl = report.crawl.as_ref().unwrap();
    assert_eq!(crawl.succeeded, 0);
    assert_eq!(crawl.failed, 2);
    assert!(!report.visited(JobState::Cleaning));
    assert!(report.artifacts.report.is_none());
    assert!(report.summary().contains("0 of 2 pages crawled successfully"));
}

#[tokio::test]
async fn test_extraction_unavailable_for_every_page_fails_job() {
    let server = MockServer::start().await;
    mount_page(&server, "/", r#"<a href="/casa/1">1</a>"#).await;
    mount_page(&server, "/casa/1", "Casa en venta").await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir.path().join("out"), "http://127.0.0.1:9/extract");
    let orchestrator = Orchestrator::start(&config, Arc::new(UnavailableExtractor), "hash").unwrap();

    let report = orchestrator
        .submit(JobRequest::new([format!("{}/", server.uri())]))
        .await
        .unwrap()
        .wait()
        .await;
    orchestrator.shutdown().await;

    assert_eq!(report.state, JobState::Failed);
    assert_eq!(report.failure, Some(FailureReason::ExtractionUnavailable));
    assert_eq!(report.crawl.unwrap().succeeded, 2);
}

#[tokio::test]
async fn test_cancel_during_crawl_never_cleans() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html("slow listing page").set_delay(Duration::from_millis(800)))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    let config = create_test_config(&out, "http://127.0.0.1:9/extract");
    let extractor = ScriptedExtractor::default().with("/", &[("price", "100000"), ("address", "1 Main St")]);
    let orchestrator = Orchestrator::start(&config, Arc::new(extractor), "hash").unwrap();

    let handle = orchestrator
        .submit(JobRequest::new([format!("{}/", server.uri())]))
        .await
        .unwrap();
    let job_id = handle.job_id();
    let watcher = handle.clone();

    for _ in 0..200 {
        if orchestrator.status(job_id).unwrap().state == JobState::Crawling {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(orchestrator.status(job_id).unwrap().state, JobState::Crawling);
    assert!(orchestrator.cancel(job_id).unwrap());

    assert_eq!(handle.wait().await.state, JobState::Cancelled);
    orchestrator.shutdown().await;

    let report = watcher.current();
    assert_eq!(
        report.history,
        vec![JobState::Submitted, JobState::Crawling, JobState::Cancelled]
    );
    assert!(report.crawl.is_none());
    assert!(report.clean.is_none());
    assert!(files_with_prefix(&out, "validated_listings_").is_empty());
    assert!(files_with_prefix(&out, "report_").is_empty());
}

#[tokio::test]
async fn test_unwritable_output_aborts_stage() {
    let server = MockServer::start().await;
    mount_page(&server, "/", "Casa en venta").await;

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    let config = create_test_config(&out, "http://127.0.0.1:9/extract");
    let orchestrator =
        Orchestrator::start(&config, Arc::new(ScriptedExtractor::default()), "hash").unwrap();

    // Replace the output directory with a plain file
    std::fs::remove_dir_all(&out).unwrap();
    std::fs::write(&out, "not a directory").unwrap();

    let report = orchestrator
        .submit(JobRequest::new([format!("{}/", server.uri())]))
        .await
        .unwrap()
        .wait()
        .await;
    orchestrator.shutdown().await;

    assert_eq!(report.state, JobState::Failed);
    assert_eq!(
        report.failure,
        Some(FailureReason::StageAborted {
            stage: Stage::Crawl
        })
    );
    assert!(report.last_error.is_some());
}

#[tokio::test]
async fn test_full_run_with_http_extraction() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        r#"<a href="/casa/1">Casa 1</a> <a href="/casa/2">Casa 2</a> <a href="https://other.test/x">x</a>"#,
    )
    .await;
    mount_page(&server, "/casa/1", "Casa uno: $300,000 USD, 3 recamaras").await;
    mount_page(&server, "/casa/2", "Casa dos: 150,000 USD, 2 recamaras").await;

    for (page, listings) in [
        (
            "/casa/1",
            serde_json::json!([{
                "price": "$300,000",
                "currency": "USD",
                "address": "12 Oak Street, Springfield",
                "bedrooms": "3",
                "url": "/casa/1"
            }]),
        ),
        (
            "/casa/2",
            serde_json::json!({"listings": [
                {"price": "150000 USD", "address": "4 Elm Road", "bedrooms": 2, "url": "/casa/2"},
                {"address": "9 Pine Lane", "url": "/casa/3"}
            ]}),
        ),
    ] {
        Mock::given(method("POST"))
            .and(path("/extract"))
            .and(body_partial_json(
                serde_json::json!({"source_url": format!("{}{}", base, page)}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(listings))
            .mount(&server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path("/extract"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    let db_path = dir.path().join("jobs.db");
    let mut config = create_test_config(&out, &format!("{}/extract", base));
    config.output.database_path = Some(db_path.display().to_string());

    let extractor = HttpExtractionService::new(
        Url::parse(&format!("{}/extract", base)).unwrap(),
        None,
        Duration::from_secs(5),
    )
    .unwrap();
    let orchestrator = Orchestrator::start(&config, Arc::new(extractor), "hash").unwrap();

    let report = orchestrator
        .submit(JobRequest::new([format!("{}/", base)]))
        .await
        .unwrap()
        .wait()
        .await;
    orchestrator.shutdown().await;

    assert_eq!(report.state, JobState::Done, "{:?}", report.last_error);
    let crawl = report.crawl.as_ref().unwrap();
    assert_eq!(crawl.attempted, 3);
    assert_eq!(crawl.listings, 3);
    let clean = report.clean.as_ref().unwrap();
    assert_eq!(clean.retained, 3);
    assert_eq!(clean.dropped, 0);

    // Report ordered by ascending price, the listing without a price last
    let markdown = std::fs::read_to_string(report.artifacts.report.as_ref().unwrap()).unwrap();
    let cheap = markdown.find("4 Elm Road").unwrap();
    let dear = markdown.find("12 Oak Street").unwrap();
    let unpriced = markdown.find("## 3. 9 Pine Lane").unwrap();
    assert!(cheap < dear && dear < unpriced);
    assert!(markdown.contains("| Price | 150,000 USD |"));

    let validated: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(report.artifacts.validated_listings.as_ref().unwrap()).unwrap(),
    )
    .unwrap();
    assert_eq!(validated.as_array().unwrap().len(), 3);
    assert!(report.artifacts.raw_listings.as_ref().unwrap().exists());

    let storage = SqliteStorage::new(&db_path).unwrap();
    let record = storage.get_job(report.job_id).unwrap();
    assert_eq!(record.state, JobState::Done);
    assert_eq!(record.pages_succeeded, 3);
    assert_eq!(record.validated_listings, 3);
    assert_eq!(storage.get_transitions(report.job_id).unwrap().len(), 4);
}
