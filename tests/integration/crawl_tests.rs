//! Integration tests for the crawl workers
//!
//! These tests use wiremock to create mock HTTP servers and drive seeds
//! through the spider and scanner workers against a real SQLite store.

use async_trait::async_trait;
use ripple_crawl::config::{Config, LockMode};
use ripple_crawl::crawler::{build_http_client, poll_once, seed, Outcome, Scanner, Spider};
use ripple_crawl::robots::ParsedRobots;
use ripple_crawl::storage::{
    BlobError, BlobRef, BlobStore, FsBlobStore, SqliteStore, StateStore, WorkQueue, SCAN_QUEUE,
    SPIDER_QUEUE,
};
use ripple_crawl::task::{make_fetch_task, Stage};
use ripple_crawl::{DomainState, JobStatus, Task};
use std::sync::{Arc, Barrier};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a configuration suited to fast tests
fn create_test_config() -> Config {
    let mut config = Config::default();
    config.crawler.default_crawl_delay = 0.0;
    config.crawler.request_timeout = 5;
    config.lock.mode = LockMode::Reject;
    config.user_agent.crawler_name = "TestBot".to_string();
    config.queue.busy_requeue_ms = 0;
    config
}

/// One store, one blob directory, and a spider/scanner pair
struct Harness {
    config: Config,
    store: Arc<SqliteStore>,
    spider: Spider<SqliteStore>,
    scanner: Scanner<SqliteStore>,
    _blobs: TempDir,
}

impl Harness {
    fn new(config: Config) -> Self {
        let store = Arc::new(SqliteStore::new_in_memory().expect("in-memory store"));
        let blob_dir = TempDir::new().expect("temp dir");
        let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(blob_dir.path()));
        let client = build_http_client(&config).expect("http client");

        Self {
            spider: Spider::new(Arc::clone(&store), Arc::clone(&blobs), client, &config),
            scanner: Scanner::new(Arc::clone(&store), blobs, &config),
            store,
            config,
            _blobs: blob_dir,
        }
    }

    async fn spider_once(&self) -> Outcome {
        poll_once(&self.spider, self.store.as_ref(), &self.config.queue)
            .await
            .expect("spider poll")
            .expect("spider queue was empty")
    }

    async fn scanner_once(&self) -> Outcome {
        poll_once(&self.scanner, self.store.as_ref(), &self.config.queue)
            .await
            .expect("scanner poll")
            .expect("scan queue was empty")
    }

    fn seed(&self, url: &str) -> Task {
        seed(self.store.as_ref(), url, &self.config.crawler).expect("seed")
    }

    fn job(&self, identifier: &str) -> Task {
        self.store
            .get_job(identifier)
            .expect("job lookup")
            .expect("job state missing")
    }
}

async fn mount_robots(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn mount_page(server: &MockServer, page: &str, status: u16, body: String) {
    Mock::given(method("GET"))
        .and(path(page))
        .respond_with(
            ResponseTemplate::new(status)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

fn index_with_links(count: usize) -> String {
    let links: String = (0..count)
        .map(|i| format!(r#"<a href="/page{}">Page {}</a>"#, i, i))
        .collect();
    format!(
        "<html><head><title>Home</title></head><body><p>Welcome</p>{}</body></html>",
        links
    )
}

/// Blob store whose disk is always full
struct FullDisk;

#[async_trait]
impl BlobStore for FullDisk {
    async fn put(&self, _blob: &BlobRef, _bytes: &[u8], _content_type: &str) -> Result<(), BlobError> {
        Err(BlobError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "no space left on device",
        )))
    }

    async fn get(&self, blob: &BlobRef) -> Result<Vec<u8>, BlobError> {
        Err(BlobError::NotFound {
            bucket: blob.bucket.clone(),
            key: blob.key.clone(),
        })
    }
}

fn error_kind(task: &Task) -> String {
    match &task.last_stage().expect("stage").stage {
        Stage::Error { kind, .. } => kind.clone(),
        other => panic!("expected error stage, got {:?}", other),
    }
}

#[tokio::test]
async fn test_seed_fans_out_to_capped_children() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(&server, "/", 200, index_with_links(8)).await;

    let harness = Harness::new(create_test_config());
    let root = harness.seed(&format!("{}/", server.uri()));

    let fetched = harness.spider_once().await;
    assert!(matches!(fetched, Outcome::Continue(_)));
    assert_eq!(harness.job(&root.identifier).status, JobStatus::SpiderCrawled);
    assert_eq!(harness.store.depth(SPIDER_QUEUE).unwrap(), 0);
    assert_eq!(harness.store.depth(SCAN_QUEUE).unwrap(), 1);

    let scanned = harness.scanner_once().await;
    assert!(matches!(scanned, Outcome::Complete(_)));

    let done = harness.job(&root.identifier);
    assert_eq!(done.status, JobStatus::ScanComplete);
    assert_eq!(done.data.len(), 2);
    assert_eq!(done.data[0].type_name(), "fetch-result");
    assert_eq!(done.data[1].type_name(), "parse-result");

    let Stage::ParseResult(record) = &done.data[1].stage else {
        panic!("expected parse-result");
    };
    assert_eq!(record.title.as_deref(), Some("Home"));
    assert_eq!(record.links.len(), 8);
    assert_eq!(record.children.len(), 5);

    for id in &record.children {
        let child = harness.job(id);
        assert_eq!(child.depth, 2);
        assert_eq!(child.correlation, root.correlation);
        assert_eq!(child.status, JobStatus::Queued);
    }
    assert_eq!(harness.store.depth(SPIDER_QUEUE).unwrap(), 5);
    assert_eq!(harness.store.depth(SCAN_QUEUE).unwrap(), 0);
}

#[tokio::test]
async fn test_robots_disallow_fails_without_fetch() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nDisallow: /x").await;

    Mock::given(method("GET"))
        .and(path("/x"))
        .respond_with(ResponseTemplate::new(200).set_body_string("secret"))
        .expect(0)
        .mount(&server)
        .await;

    let harness = Harness::new(create_test_config());
    let task = harness.seed(&format!("{}/x", server.uri()));

    let outcome = harness.spider_once().await;
    assert!(matches!(outcome, Outcome::Failed(_)));

    let job = harness.job(&task.identifier);
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(error_kind(&job), "policy-denied");
    assert_eq!(harness.store.depth(SPIDER_QUEUE).unwrap(), 0);
    assert_eq!(harness.store.depth(SCAN_QUEUE).unwrap(), 0);

    // the decision is cached for the domain
    let policy = harness.store.get_domain(&task.domain).unwrap().unwrap();
    assert!(!policy.valid);
    assert!(!policy.lock);
}

#[tokio::test]
async fn test_robots_forbidden_denies_everything() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let harness = Harness::new(create_test_config());
    let task = harness.seed(&format!("{}/anything", server.uri()));

    harness.spider_once().await;
    assert_eq!(error_kind(&harness.job(&task.identifier)), "policy-denied");
}

#[tokio::test]
async fn test_over_depth_task_is_limited_without_http() {
    let server = MockServer::start().await;
    let harness = Harness::new(create_test_config());

    let task = make_fetch_task(&format!("{}/deep", server.uri()), 6, None, 128).unwrap();
    harness.store.put_job(&task).unwrap();
    harness.store.publish(SPIDER_QUEUE, &task).unwrap();

    let outcome = harness.spider_once().await;
    assert!(matches!(outcome, Outcome::Limited(_)));

    let job = harness.job(&task.identifier);
    assert_eq!(job.status, JobStatus::Limited);
    assert_eq!(job.last_stage().unwrap().type_name(), "depth-limited");

    let requests = server.received_requests().await.unwrap();
    assert!(requests.is_empty());
    assert!(harness.store.get_domain(&task.domain).unwrap().is_none());
}

#[tokio::test]
async fn test_robots_fetched_once_per_domain() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /"))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/a", 200, index_with_links(0)).await;
    mount_page(&server, "/b", 200, index_with_links(0)).await;

    let harness = Harness::new(create_test_config());
    harness.seed(&format!("{}/a", server.uri()));
    harness.seed(&format!("{}/b", server.uri()));

    assert!(matches!(harness.spider_once().await, Outcome::Continue(_)));
    assert!(matches!(harness.spider_once().await, Outcome::Continue(_)));
    assert_eq!(harness.store.depth(SCAN_QUEUE).unwrap(), 2);

    let task = make_fetch_task(&format!("{}/a", server.uri()), 1, None, 128).unwrap();
    let policy = harness.store.get_domain(&task.domain).unwrap().unwrap();
    assert_eq!(policy.depth, 3);
}

#[tokio::test]
async fn test_replayed_fetch_is_idempotent() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(&server, "/", 200, index_with_links(2)).await;

    let harness = Harness::new(create_test_config());
    let task = harness.seed(&format!("{}/", server.uri()));

    // simulate a lost ack: the same message body is processed twice
    let first = harness.spider.handle(task.clone()).await.unwrap();
    let after_first = harness.job(&task.identifier);
    let second = harness.spider.handle(task.clone()).await.unwrap();
    let after_second = harness.job(&task.identifier);

    assert!(matches!(first, Outcome::Continue(_)));
    assert!(matches!(second, Outcome::Continue(_)));
    assert_eq!(after_first.status, after_second.status);
    assert_eq!(after_second.data.len(), 1);
    assert_eq!(
        after_first.fetch_result().unwrap().local,
        after_second.fetch_result().unwrap().local
    );
    assert_eq!(harness.store.count_fingerprints().unwrap(), 1);
}

#[tokio::test]
async fn test_http_error_marks_failed_and_releases_lock() {
    let server = MockServer::start().await;
    mount_robots(&server, "").await;
    mount_page(&server, "/missing", 404, "gone".to_string()).await;

    let harness = Harness::new(create_test_config());
    let task = harness.seed(&format!("{}/missing", server.uri()));

    assert!(matches!(harness.spider_once().await, Outcome::Failed(_)));

    let job = harness.job(&task.identifier);
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(error_kind(&job), "fetch-failed");
    assert_eq!(harness.store.count_fingerprints().unwrap(), 1);
    assert_eq!(harness.store.depth(SCAN_QUEUE).unwrap(), 0);

    let policy = harness.store.get_domain(&task.domain).unwrap().unwrap();
    assert!(!policy.lock);
}

#[tokio::test]
async fn test_server_error_is_not_claimed() {
    let server = MockServer::start().await;
    mount_robots(&server, "").await;
    mount_page(&server, "/flaky", 503, "busy".to_string()).await;

    let harness = Harness::new(create_test_config());
    let task = harness.seed(&format!("{}/flaky", server.uri()));

    assert!(matches!(harness.spider_once().await, Outcome::Failed(_)));
    assert_eq!(harness.job(&task.identifier).status, JobStatus::Failed);
    assert_eq!(harness.store.count_fingerprints().unwrap(), 0);
}

#[tokio::test]
async fn test_busy_domain_requeues_task() {
    let server = MockServer::start().await;
    mount_page(&server, "/page", 200, index_with_links(0)).await;

    let harness = Harness::new(create_test_config());
    let task = harness.seed(&format!("{}/page", server.uri()));

    let policy = DomainState::new(
        &task.domain,
        ParsedRobots::allow_all(),
        true,
        0.0,
        Duration::from_secs(3600),
    );
    harness.store.store_domain_policy(&policy).unwrap();
    assert!(harness
        .store
        .try_lock_domain(&task.domain, "another-worker", Duration::from_secs(60))
        .unwrap());

    assert!(matches!(harness.spider_once().await, Outcome::Busy));
    assert_eq!(harness.job(&task.identifier).status, JobStatus::Queued);
    assert_eq!(harness.store.depth(SPIDER_QUEUE).unwrap(), 1);
    assert!(server.received_requests().await.unwrap().is_empty());

    // once the holder lets go, the requeued task goes through
    assert!(harness
        .store
        .unlock_domain(&task.domain, "another-worker")
        .unwrap());

    assert!(matches!(harness.spider_once().await, Outcome::Continue(_)));
    assert_eq!(harness.store.depth(SPIDER_QUEUE).unwrap(), 0);
    assert_eq!(harness.store.depth(SCAN_QUEUE).unwrap(), 1);
}

#[tokio::test]
async fn test_crawl_stops_one_past_max_depth() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(&server, "/", 200, index_with_links(3)).await;

    let mut config = create_test_config();
    config.crawler.max_depth = 1;
    let harness = Harness::new(config);
    harness.seed(&format!("{}/", server.uri()));

    harness.spider_once().await;
    harness.scanner_once().await;
    assert_eq!(harness.store.depth(SPIDER_QUEUE).unwrap(), 3);

    for _ in 0..3 {
        let Outcome::Limited(child) = harness.spider_once().await else {
            panic!("expected children to be depth limited");
        };
        assert_eq!(child.depth, 2);
    }
    assert_eq!(harness.store.depth(SPIDER_QUEUE).unwrap(), 0);
    assert_eq!(harness.store.depth(SCAN_QUEUE).unwrap(), 0);
}

#[tokio::test]
async fn test_blob_failure_leaves_url_unclaimed() {
    let server = MockServer::start().await;
    mount_robots(&server, "").await;
    mount_page(&server, "/page", 200, index_with_links(0)).await;

    let harness = Harness::new(create_test_config());
    let task = harness.seed(&format!("{}/page", server.uri()));

    let client = build_http_client(&harness.config).unwrap();
    let broken = Spider::new(
        Arc::clone(&harness.store),
        Arc::new(FullDisk),
        client,
        &harness.config,
    );
    let Outcome::Failed(failed) = broken.handle(task.clone()).await.unwrap() else {
        panic!("expected failed outcome");
    };
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(harness.store.count_fingerprints().unwrap(), 0);
    assert!(!harness.store.get_domain(&task.domain).unwrap().unwrap().lock);

    // another task for the same URL in the session is not a duplicate
    let retry = task.child(&task.url, 1, 128).unwrap();
    let outcome = harness.spider.handle(retry).await.unwrap();
    assert!(matches!(outcome, Outcome::Continue(_)));
    assert_eq!(harness.store.count_fingerprints().unwrap(), 1);
}

#[tokio::test]
async fn test_links_resolve_against_redirect_target() {
    let server = MockServer::start().await;
    mount_robots(&server, "").await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/b/"))
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/b/",
        200,
        r#"<html><body><a href="c">c</a></body></html>"#.to_string(),
    )
    .await;

    let harness = Harness::new(create_test_config());
    let root = harness.seed(&format!("{}/a", server.uri()));

    assert!(matches!(harness.spider_once().await, Outcome::Continue(_)));
    let fetched = harness.job(&root.identifier);
    let record = fetched.fetch_result().unwrap();
    assert_eq!(record.code, 200);
    assert_eq!(
        record.location.as_deref(),
        Some(format!("{}/b/", server.uri()).as_str())
    );

    assert!(matches!(harness.scanner_once().await, Outcome::Complete(_)));
    let root_job = harness.job(&root.identifier);
    let Stage::ParseResult(parsed) = &root_job.last_stage().unwrap().stage
    else {
        panic!("expected parse-result");
    };
    assert_eq!(parsed.children.len(), 1);
    assert_eq!(
        harness.job(&parsed.children[0]).url,
        format!("{}/b/c", server.uri())
    );
}

#[tokio::test]
async fn test_oversized_body_fails_unclaimed() {
    let server = MockServer::start().await;
    mount_robots(&server, "").await;
    mount_page(&server, "/huge", 200, index_with_links(50)).await;

    let mut config = create_test_config();
    config.crawler.max_body_bytes = 256;
    let harness = Harness::new(config);
    let task = harness.seed(&format!("{}/huge", server.uri()));

    assert!(matches!(harness.spider_once().await, Outcome::Failed(_)));
    let job = harness.job(&task.identifier);
    assert_eq!(error_kind(&job), "fetch-failed");
    assert_eq!(harness.store.count_fingerprints().unwrap(), 0);
    assert_eq!(harness.store.depth(SCAN_QUEUE).unwrap(), 0);
    assert!(!harness.store.get_domain(&task.domain).unwrap().unwrap().lock);
}

#[tokio::test]
async fn test_unusable_robots_crawl_delay_falls_back_to_default() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nCrawl-delay: 1e400\nAllow: /").await;
    mount_page(&server, "/", 200, index_with_links(0)).await;

    let harness = Harness::new(create_test_config());
    let task = harness.seed(&format!("{}/", server.uri()));

    assert!(matches!(harness.spider_once().await, Outcome::Continue(_)));
    let policy = harness.store.get_domain(&task.domain).unwrap().unwrap();
    assert_eq!(policy.crawl_delay, 0.0);
    assert!(!policy.lock);
}

#[tokio::test]
async fn test_robots_crawl_delay_is_capped() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nCrawl-delay: 86400").await;
    mount_page(&server, "/", 200, index_with_links(0)).await;

    let mut config = create_test_config();
    config.crawler.max_crawl_delay = 0.1;
    let harness = Harness::new(config);
    let task = harness.seed(&format!("{}/", server.uri()));

    // finishes after the capped delay instead of a day
    let outcome = tokio::time::timeout(Duration::from_secs(10), harness.spider_once())
        .await
        .expect("spider held the lock for the uncapped delay");
    assert!(matches!(outcome, Outcome::Continue(_)));

    let policy = harness.store.get_domain(&task.domain).unwrap().unwrap();
    assert_eq!(policy.crawl_delay, 0.1);
    assert_eq!(policy.depth, 2);
}

#[test]
fn test_lock_race_has_single_winner() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("race.db");

    let setup = SqliteStore::new(&db_path).unwrap();
    let policy = DomainState::new(
        "race.example",
        ParsedRobots::allow_all(),
        true,
        0.0,
        Duration::from_secs(3600),
    );
    setup.store_domain_policy(&policy).unwrap();

    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|i| {
            let barrier = Arc::clone(&barrier);
            let db_path = db_path.clone();
            std::thread::spawn(move || {
                // each worker process has its own connection
                let store = SqliteStore::new(&db_path).unwrap();
                barrier.wait();
                store
                    .try_lock_domain("race.example", &format!("worker-{}", i), Duration::from_secs(60))
                    .unwrap()
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);

    let state = setup.get_domain("race.example").unwrap().unwrap();
    assert!(state.lock);
    assert!(state.holder.unwrap().starts_with("worker-"));
}

#[test]
fn test_unacked_message_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("queue.db");

    let task = make_fetch_task("http://example.com/", 1, None, 128).unwrap();
    {
        let store = SqliteStore::new(&db_path).unwrap();
        store.publish(SPIDER_QUEUE, &task).unwrap();
        let _lost = store
            .receive(SPIDER_QUEUE, Duration::from_millis(0))
            .unwrap()
            .unwrap();
        // worker dies without acking
    }

    std::thread::sleep(Duration::from_millis(5));
    let store = SqliteStore::new(&db_path).unwrap();
    let redelivered = store
        .receive(SPIDER_QUEUE, Duration::from_secs(60))
        .unwrap()
        .unwrap();
    assert_eq!(redelivered.task().unwrap().identifier, task.identifier);
    assert_eq!(redelivered.deliveries, 2);
}
