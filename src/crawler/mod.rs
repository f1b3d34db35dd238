//! Crawler / fetcher (SPEC_FULL §4.G): the single-page fetch path and the
//! scope-bounded BFS crawl path.
//!
//! Algorithm grounded on `original_source/src/knowledge/pipeline/crawler.py`
//! (`acquire_single_page`, `acquire_crawl`, `run_crawler`); BFS/link
//! extraction idiom on `scrapers::configurable::html_crawl` (frontier as a
//! `VecDeque`, `scraper::Selector` link extraction); the optional headless
//! render fallback on `scrapers::browser`, gated behind the same `browser`
//! feature.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use scraper::{Html, Selector};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::crawl_state::{CrawlStateStore, SAVE_EVERY_N_PAGES};
use crate::models::{CrawlState, DiscoveryMethod, SourceEntry, UrlStatus};
use crate::robots::RobotsPolicy;
use crate::store::Store;
use crate::url_utils::{self, ScopeFilter};

#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    #[error(transparent)]
    CrawlState(#[from] crate::crawl_state::CrawlStateError),
}

/// Result of acquiring content from a source, single-page or multi-page.
#[derive(Debug, Clone)]
pub struct AcquisitionResult {
    pub source_url: String,
    pub success: bool,
    pub content_hash: Option<String>,
    pub content_path: Option<String>,
    pub pages_acquired: u32,
    pub error: Option<String>,
    /// Whether at least one page in this acquisition fell back to headless
    /// rendering (spec.md §4.G: `metadata.rendered = true`).
    pub rendered: bool,
}

impl AcquisitionResult {
    fn failure(source_url: String, error: impl Into<String>) -> Self {
        Self {
            source_url,
            success: false,
            content_hash: None,
            content_path: None,
            pages_acquired: 0,
            error: Some(error.into()),
            rendered: false,
        }
    }
}

/// Well-known SPA container markers (framework root elements, data
/// attributes) that signal client-side rendering even when the static HTML
/// happens to carry more than 100 characters of boilerplate text.
const SPA_MARKERS: [&str; 6] = [
    "id=\"root\"",
    "id=\"app\"",
    "data-reactroot",
    "data-reactid",
    "ng-app",
    "data-v-app",
];

fn looks_like_spa_shell(html: &str) -> bool {
    SPA_MARKERS.iter().any(|marker| html.contains(marker))
}

/// Trigger condition for the headless-render fallback (spec.md §4.G):
/// fewer than 100 characters of extracted text, or an SPA container marker
/// in the raw HTML.
fn needs_render_fallback(html: &str, text: &str) -> bool {
    text.chars().count() < 100 || looks_like_spa_shell(html)
}

/// Runs the headless-render fallback when the `browser` feature is
/// compiled in; a no-op returning `None` otherwise, so the trigger check
/// above is safe to evaluate unconditionally.
async fn try_render_fallback(_url: &str) -> Option<String> {
    #[cfg(feature = "browser")]
    {
        render::render_page(_url).await
    }
    #[cfg(not(feature = "browser"))]
    {
        None
    }
}

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extract visible text from an HTML document, concatenating text nodes
/// with whitespace.
fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let body_selector = Selector::parse("body").unwrap_or_else(|_| Selector::parse("*").unwrap());
    let mut text = String::new();
    for element in document.select(&body_selector) {
        for chunk in element.text() {
            let trimmed = chunk.trim();
            if !trimmed.is_empty() {
                text.push_str(trimmed);
                text.push(' ');
            }
        }
    }
    text.trim().to_string()
}

/// Extract `href` targets from an HTML document, resolved against `base`.
fn extract_links(html: &str, base: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .filter(|href| {
            !href.is_empty()
                && !href.starts_with('#')
                && !href.starts_with("javascript:")
                && !href.starts_with("mailto:")
        })
        .filter_map(|href| base.join(href).ok())
        .collect()
}

/// Acquire content from a single-page source (`source.crawl_scope ==
/// Page`): politeness delay, conditional GET, text extraction, checksum,
/// persist.
pub async fn acquire_single_page(
    client: &Client,
    store: &Arc<dyn Store>,
    source: &SourceEntry,
    delay: Duration,
) -> AcquisitionResult {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    match acquire_single_page_inner(client, store, source).await {
        Ok(result) => result,
        Err(e) => AcquisitionResult::failure(source.url.clone(), e.to_string()),
    }
}

async fn acquire_single_page_inner(
    client: &Client,
    store: &Arc<dyn Store>,
    source: &SourceEntry,
) -> Result<AcquisitionResult, CrawlerError> {
    let response = client.get(&source.url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Ok(AcquisitionResult::failure(
            source.url.clone(),
            format!("unexpected status {status}"),
        ));
    }
    let body = response.text().await?;
    let mut text = extract_text(&body);
    let mut rendered = false;
    if needs_render_fallback(&body, &text) {
        if let Some(rendered_html) = try_render_fallback(&source.url).await {
            let candidate = extract_text(&rendered_html);
            if candidate.chars().count() > text.chars().count() {
                text = candidate;
                rendered = true;
            }
        }
    }
    let hash = content_hash(&text);
    let content_path = format!("content/{}/{}.md", &hash[..2], &hash[2..10]);
    store.put(&content_path, text.as_bytes()).await?;

    Ok(AcquisitionResult {
        source_url: source.url.clone(),
        success: true,
        content_hash: Some(hash),
        content_path: Some(content_path),
        pages_acquired: 1,
        error: None,
        rendered,
    })
}

/// Acquire content from a multi-page source: resumes or starts a
/// `CrawlState`, then runs the BFS loop in spec.md §4.G step-by-step.
pub async fn acquire_crawl(
    client: &Client,
    store: &Arc<dyn Store>,
    crawl_states: &CrawlStateStore,
    source: &SourceEntry,
    scope: &ScopeFilter,
    robots: &RobotsPolicy,
    delay: Duration,
    max_backoff: Duration,
) -> Result<AcquisitionResult, CrawlerError> {
    let seed = Url::parse(&source.url)?;
    let mut state = match crawl_states.load(&source.url).await? {
        Some(existing) => existing,
        None => CrawlState::new(source.url.clone(), source.url.clone()),
    };

    let max_pages = source.crawl_max_pages;
    let mut pages_this_run = 0u32;
    let mut pages_since_save = 0u64;
    let mut any_page_rendered = false;

    while !state.is_frontier_empty() && pages_this_run < max_pages {
        let Some(record) = state.pop_next() else {
            break;
        };

        let candidate_url = match Url::parse(&record.url) {
            Ok(u) => u,
            Err(_) => {
                state.record_visit(record, UrlStatus::Failed);
                continue;
            }
        };

        let canonical = url_utils::canonicalize(&record.url).unwrap_or(record.url.clone());

        if !robots.allows(&canonical) {
            state.record_visit(record, UrlStatus::Skipped);
            continue;
        }

        let wait = robots
            .crawl_delay(max_backoff)
            .filter(|d| *d > delay)
            .unwrap_or(delay);
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        let fetch_result = client.get(&canonical).send().await;
        let page = match fetch_result {
            Ok(resp) if resp.status().is_success() => resp.text().await.ok(),
            _ => None,
        };

        let Some(body) = page else {
            state.record_visit(record, UrlStatus::Failed);
            continue;
        };

        let mut text = extract_text(&body);
        if needs_render_fallback(&body, &text) {
            if let Some(rendered_html) = try_render_fallback(canonical.as_str()).await {
                let candidate = extract_text(&rendered_html);
                if candidate.chars().count() > text.chars().count() {
                    text = candidate;
                    any_page_rendered = true;
                }
            }
        }
        let hash = content_hash(&text);
        let content_path = format!("content/{}/{}.md", &hash[..2], &hash[2..10]);
        store.put(&content_path, text.as_bytes()).await?;

        for link in extract_links(&body, &candidate_url) {
            if !scope.in_scope(&seed, &link) {
                continue;
            }
            state.enqueue(
                link.to_string(),
                record.depth + 1,
                DiscoveryMethod::LinkExtraction,
                Some(canonical.clone()),
            );
        }

        state.record_visit(record, UrlStatus::Visited);
        pages_this_run += 1;
        pages_since_save += 1;

        if CrawlStateStore::save_is_due(pages_since_save) {
            crawl_states.save(&mut state).await?;
            pages_since_save = 0;
            debug!(source = %source.url, pages_this_run, "checkpointed crawl state");
        }
    }

    if state.is_frontier_empty() {
        state.mark_completed();
        info!(source = %source.url, pages = pages_this_run, "crawl completed");
    } else {
        state.mark_paused();
        info!(source = %source.url, pages = pages_this_run, "crawl paused, frontier non-empty");
    }
    crawl_states.save(&mut state).await?;

    Ok(AcquisitionResult {
        source_url: source.url.clone(),
        success: true,
        content_hash: None,
        content_path: None,
        pages_acquired: pages_this_run,
        error: None,
        rendered: any_page_rendered,
    })
}

#[cfg(feature = "browser")]
pub mod render {
    //! JS-rendering fallback for SPA content, gated behind the `browser`
    //! feature (grounded on `scrapers::browser::BrowserFetcher`).

    use chromiumoxide::{Browser, BrowserConfig};
    use futures::StreamExt;
    use tracing::warn;

    /// Render `url` in a headless browser and return the resulting HTML.
    /// Used when a plain HTTP GET yields content with no extractable text
    /// (a strong signal of client-side rendering).
    pub async fn render_page(url: &str) -> Option<String> {
        let config = BrowserConfig::builder().build().ok()?;
        let (mut browser, mut handler) = Browser::launch(config).await.ok()?;
        let handle = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let page = match browser.new_page(url).await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "headless render failed");
                handle.abort();
                return None;
            }
        };
        let html = page.content().await.ok();
        let _ = browser.close().await;
        handle.abort();
        html
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_text_strips_tags() {
        let html = "<html><body><h1>Title</h1><p>Hello <b>world</b></p></body></html>";
        let text = extract_text(html);
        assert!(text.contains("Title"));
        assert!(text.contains("Hello"));
        assert!(text.contains("world"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn extract_links_resolves_relative_hrefs() {
        let html = r#"<html><body><a href="/page1">one</a><a href="https://other.org/x">two</a></body></html>"#;
        let base = Url::parse("https://example.org/dir/").unwrap();
        let links = extract_links(html, &base);
        assert!(links.iter().any(|u| u.as_str() == "https://example.org/page1"));
        assert!(links.iter().any(|u| u.as_str() == "https://other.org/x"));
    }

    #[test]
    fn extract_links_skips_non_navigational_hrefs() {
        let html = r#"<html><body><a href="#top">top</a><a href="mailto:a@b.com">mail</a><a href="javascript:void(0)">js</a></body></html>"#;
        let base = Url::parse("https://example.org/").unwrap();
        assert!(extract_links(html, &base).is_empty());
    }

    #[test]
    fn content_hash_is_stable_sha256_hex() {
        let h1 = content_hash("hello");
        let h2 = content_hash("hello");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn render_fallback_triggers_on_short_text() {
        let html = "<html><body>hi</body></html>";
        assert!(needs_render_fallback(html, "hi"));
    }

    #[test]
    fn render_fallback_triggers_on_spa_shell_even_with_long_text() {
        let long_text = "x".repeat(200);
        let html = format!("<html><body><div id=\"root\"></div></body></html>{long_text}");
        assert!(needs_render_fallback(&html, &long_text));
    }

    #[test]
    fn render_fallback_does_not_trigger_on_substantive_static_page() {
        let long_text = "word ".repeat(40);
        let html = format!("<html><body>{long_text}</body></html>");
        assert!(!needs_render_fallback(&html, &long_text));
    }
}
