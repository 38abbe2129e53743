//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end.

use novel_spider::config::Config;
use novel_spider::crawler::{Attempt, Coordinator, PageFetcher, StopReason};
use novel_spider::state::SessionState;
use novel_spider::storage::{SearchQuery, Storage};
use novel_spider::SpiderError;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration with negligible delays
fn create_test_config(base_url: &str, dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.spider.base_url = base_url.to_string();
    config.spider.timeout_ms = 300;
    config.spider.max_pages = 5;
    config.session.cookie_file = dir.path().join("cookies.txt").display().to_string();
    config.session.default_cookie = "sid=init".to_string();
    config.retry.max_attempts = 3;
    config.retry.initial_delay_ms = 1;
    config.retry.block_cooldown_ms = 1;
    config.pacing.base_delay_ms = 0;
    config.pacing.per_page_delay_ms = 0;
    config.pacing.jitter_ms = 0;
    config.output.database_path = dir.path().join("novels.db").display().to_string();
    config
}

fn create_coordinator(base_url: &str, dir: &TempDir) -> Coordinator {
    Coordinator::new(create_test_config(base_url, dir), "test-hash")
        .expect("Failed to create coordinator")
}

/// One well-formed listing entry
fn entry(id: u32, title: &str) -> String {
    format!(
        r#"<li>
            <a href="/book/{id}.html"><img src="/cover/{id}.jpg"></a>
            <h2>{title}</h2>
            <span>玄幻 / 连载</span>
            <i class="fa fa-user-circle-o">&nbsp;作者{id}</i>
            <em class="orange">12万字</em>
            <em class="blue">3天前</em>
            <p class="indent">{title}的简介</p>
        </li>"#
    )
}

fn listing(entries: &[String]) -> String {
    let mut html = String::from(r#"<html><body><ul class="flex">"#);
    for e in entries {
        html.push_str(e);
    }
    html.push_str("</ul></body></html>");
    html
}

async fn mount_page(server: &MockServer, page: u32, body: String) {
    Mock::given(method("GET"))
        .and(path(format!("/html/{}.html", page)))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_crawl_persists_entries_and_skips_broken_ones() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let broken = r#"<li><h2>无链接</h2><em class="blue">刚刚</em><p class="indent">x</p></li>"#;
    mount_page(
        &mock_server,
        1,
        listing(&[
            entry(101, "第一本"),
            broken.to_string(),
            entry(102, "第二本"),
            entry(103, "第三本"),
        ]),
    )
    .await;
    // Page 2 is not mounted: wiremock answers 404 with an empty body

    let coordinator = create_coordinator(&mock_server.uri(), &dir);
    let summary = coordinator.crawl(0, 5).await.unwrap();

    assert_eq!(summary.records_saved, 3);
    assert_eq!(summary.items_skipped, 1);
    assert_eq!(summary.pages_fetched, 2);
    assert_eq!(summary.stop, StopReason::EmptyPage(2));

    let storage = coordinator.storage();
    let storage = storage.lock().unwrap();
    assert_eq!(storage.count_novels().unwrap(), 3);

    let novel = storage.get_novel(102).unwrap().unwrap();
    assert_eq!(novel.title, "第二本");
    assert_eq!(novel.author, "作者102");
    assert_eq!(novel.word_count, 120_000);
    assert_eq!(
        novel.source_url,
        format!("{}/book/102.html", mock_server.uri())
    );

    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.totals.records_saved, 3);
    assert_eq!(run.config_hash, "test-hash");
}

#[tokio::test]
async fn test_timed_out_page_does_not_abort_run() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/html/1.html"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing(&[entry(1, "慢")]))
                .set_delay(Duration::from_millis(1500)),
        )
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, 2, listing(&[entry(2, "快"), entry(3, "更快")])).await;

    let coordinator = create_coordinator(&mock_server.uri(), &dir);
    let summary = coordinator.crawl(0, 3).await.unwrap();

    assert_eq!(summary.pages_failed, 1);
    assert_eq!(summary.records_saved, 2);
    assert_eq!(summary.stop, StopReason::EmptyPage(3));

    let storage = coordinator.storage();
    let storage = storage.lock().unwrap();
    assert!(storage.get_novel(1).unwrap().is_none());
    assert!(storage.get_novel(2).unwrap().is_some());
}

#[tokio::test]
async fn test_unreachable_site_stops_after_error_limit() {
    let dir = TempDir::new().unwrap();

    // Nothing listens on this port once the listener is dropped
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let coordinator = create_coordinator(&base_url, &dir);
    let summary = coordinator.crawl(0, 20).await.unwrap();

    // The counter must exceed 10, so the 11th failed page ends the run
    assert_eq!(summary.pages_failed, 11);
    assert_eq!(summary.pages_fetched, 0);
    assert_eq!(summary.stop, StopReason::TooManyErrors(11));
    assert!(!coordinator.is_running());
}

#[tokio::test]
async fn test_session_challenge_rotates_cookie() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/html/1.html"))
        .and(header("cookie", "sid=init"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "sid=fresh; Path=/; HttpOnly")
                .set_body_string("<html><body>checking your browser</body></html>"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/html/1.html"))
        .and(header("cookie", "sid=fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&[entry(7, "会话")])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri(), &dir);
    let cookie_file = config.session.cookie_file.clone();
    let coordinator = Coordinator::new(config, "test-hash").unwrap();

    let summary = coordinator.crawl(0, 1).await.unwrap();

    // The challenge is not a failure
    assert_eq!(summary.pages_failed, 0);
    assert_eq!(summary.records_saved, 1);
    assert_eq!(std::fs::read_to_string(&cookie_file).unwrap(), "sid=fresh");

    // A restarted fetcher resumes with the rotated cookie
    let restarted = PageFetcher::from_config(&create_test_config(&mock_server.uri(), &dir)).unwrap();
    assert_eq!(restarted.current_cookie(), "sid=fresh");
}

#[tokio::test]
async fn test_endless_session_challenges_fail_the_page() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/html/1.html"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "sid=again")
                .set_body_string(listing(&[entry(1, "永远")])),
        )
        .mount(&mock_server)
        .await;

    let coordinator = create_coordinator(&mock_server.uri(), &dir);
    let summary = coordinator.crawl(0, 1).await.unwrap();

    assert_eq!(summary.pages_failed, 1);
    assert_eq!(summary.records_saved, 0);
}

#[tokio::test]
async fn test_recrawl_updates_in_place() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(&mock_server, 1, listing(&[entry(1, "甲"), entry(2, "乙")])).await;

    let coordinator = create_coordinator(&mock_server.uri(), &dir);
    coordinator.crawl(0, 1).await.unwrap();

    let first_created = {
        let storage = coordinator.storage();
        let storage = storage.lock().unwrap();
        storage.get_novel(1).unwrap().unwrap().created_at
    };

    let summary = coordinator.crawl(0, 1).await.unwrap();
    assert_eq!(summary.records_saved, 2);

    let storage = coordinator.storage();
    let storage = storage.lock().unwrap();
    assert_eq!(storage.count_novels().unwrap(), 2);
    assert_eq!(storage.get_novel(1).unwrap().unwrap().created_at, first_created);

    let page = storage
        .search_novels(&SearchQuery {
            title: Some("乙".to_string()),
            ..SearchQuery::default()
        })
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, 2);
}

#[tokio::test]
async fn test_only_one_run_at_a_time() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/html/1.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&[entry(1, "唯一")])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let coordinator = create_coordinator(&mock_server.uri(), &dir);

    let first = coordinator.start(0, 1).expect("first start is accepted");
    assert!(coordinator.start(0, 1).is_none());
    assert!(coordinator.clone().start_scheduled().is_none());

    let summary = first.await.unwrap();
    assert_eq!(summary.records_saved, 1);
    assert!(!coordinator.is_running());
}

#[tokio::test]
async fn test_error_status_body_is_still_parsed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/html/1.html"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir);
    let fetcher =
        PageFetcher::new(&config.spider, config.retry.clone(), SessionState::new("a=1")).unwrap();

    let body = fetcher.fetch_page(1).await.unwrap();
    assert_eq!(body, "busy");
}

/// Serves a raw TCP listener that reads each request and hangs up without
/// answering, except for `served_path`, which gets a 200 with `body`
async fn spawn_hangup_server(served_path: Option<&'static str>, body: String) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let mut buf = [0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap_or(0);
            let request = String::from_utf8_lossy(&buf[..n]);
            let requested = request.split_whitespace().nth(1).unwrap_or_default();

            if served_path == Some(requested) {
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
            drop(socket);
        }
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_connection_closed_without_headers_is_a_block() {
    let base_url = spawn_hangup_server(None, String::new()).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&base_url, &dir);
    let fetcher =
        PageFetcher::new(&config.spider, config.retry.clone(), SessionState::new("a=1")).unwrap();

    let outcome = fetcher.attempt(&fetcher.page_url(1)).await;
    assert!(matches!(outcome, Attempt::Blocked(_)), "got {:?}", outcome);
}

#[tokio::test]
async fn test_successful_page_resets_error_counter() {
    // Pages 1-6 fail, page 7 succeeds, then pages 8-18 fail
    let base_url = spawn_hangup_server(Some("/html/7.html"), listing(&[entry(70, "中途")])).await;
    let dir = TempDir::new().unwrap();

    let coordinator = create_coordinator(&base_url, &dir);
    let summary = coordinator.crawl(0, 30).await.unwrap();

    assert_eq!(summary.pages_fetched, 1);
    assert_eq!(summary.records_saved, 1);
    assert_eq!(summary.pages_failed, 17);
    assert_eq!(summary.stop, StopReason::TooManyErrors(11));
    assert!(!coordinator.is_running());

    let storage = coordinator.storage();
    let storage = storage.lock().unwrap();
    assert!(storage.get_novel(70).unwrap().is_some());
}

#[tokio::test]
async fn test_retry_backoff_doubles() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&base_url, &dir);
    config.retry.initial_delay_ms = 200;
    config.retry.block_cooldown_ms = 5_000;
    let fetcher =
        PageFetcher::new(&config.spider, config.retry.clone(), SessionState::new("a=1")).unwrap();

    let started = Instant::now();
    let result = fetcher.fetch_page(1).await;
    let elapsed = started.elapsed();

    // Three attempts sleep 200ms then 400ms, and not after the last one
    assert!(
        matches!(result, Err(SpiderError::RetriesExhausted { attempts: 3, .. })),
        "got {:?}",
        result
    );
    assert!(elapsed >= Duration::from_millis(600), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(2_500), "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_block_uses_fixed_cooldown() {
    let base_url = spawn_hangup_server(None, String::new()).await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&base_url, &dir);
    config.retry.initial_delay_ms = 5_000;
    config.retry.block_cooldown_ms = 150;
    let fetcher =
        PageFetcher::new(&config.spider, config.retry.clone(), SessionState::new("a=1")).unwrap();

    let started = Instant::now();
    let result = fetcher.fetch_page(1).await;
    let elapsed = started.elapsed();

    // Two cooldowns of 150ms; the 5s backoff is never used
    assert!(
        matches!(result, Err(SpiderError::RetriesExhausted { attempts: 3, .. })),
        "got {:?}",
        result
    );
    assert!(elapsed >= Duration::from_millis(300), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(2_500), "elapsed {:?}", elapsed);
}
