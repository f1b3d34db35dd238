//! Change-detection monitor (SPEC_FULL §4.E): a four-tier cascade — a
//! conditional GET, then ETag comparison, then Last-Modified comparison,
//! then content-hash comparison — stopping at the first conclusive result.
//!
//! Control flow directly grounded on
//! `original_source/src/knowledge/pipeline/monitor.py` (`run_monitor`,
//! `get_sources_pending_initial`, `get_sources_due_for_check`,
//! `_update_source_after_check`); that file resolves spec.md §9's Open
//! Question about `check_failures` vs. jitter ordering: the reset to zero
//! happens in the same update step, strictly before
//! `calculate_next_check_with_jitter` runs.

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::models::{CheckResult, CheckStatus, DetectionMethod, SourceEntry};
use crate::scheduler::{calculate_backoff_interval, calculate_next_check_with_jitter, Politeness};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Aggregate result of a monitor pass, mirroring `monitor.py`'s
/// `MonitorResult` dataclass (counts plus categorized source lists, useful
/// for `check`-mode reporting).
#[derive(Debug, Default)]
pub struct MonitorResult {
    pub sources_checked: u32,
    pub initial_needed: Vec<SourceEntry>,
    pub updates_needed: Vec<(SourceEntry, CheckResult)>,
    pub unchanged: Vec<SourceEntry>,
    pub errors: Vec<(SourceEntry, String)>,
}

impl MonitorResult {
    pub fn total_needing_acquisition(&self) -> usize {
        self.initial_needed.len() + self.updates_needed.len()
    }
}

/// Sources that have never been acquired.
pub fn sources_pending_initial(sources: &[SourceEntry]) -> Vec<SourceEntry> {
    sources
        .iter()
        .filter(|s| s.last_content_hash.is_none())
        .cloned()
        .collect()
}

/// Sources already acquired once, whose `next_check_after` has passed (or
/// was never set).
pub fn sources_due_for_check(sources: &[SourceEntry]) -> Vec<SourceEntry> {
    let now = Utc::now();
    sources
        .iter()
        .filter(|s| {
            s.last_content_hash.is_some()
                && s.next_check_after.map(|t| t <= now).unwrap_or(true)
        })
        .cloned()
        .collect()
}

/// Runs the tiered cascade against one already-acquired source.
pub async fn check_source(client: &Client, source: &SourceEntry) -> CheckResult {
    match check_source_inner(client, source).await {
        Ok(result) => result,
        Err(e) => CheckResult::failed(source.url.clone(), e.to_string()),
    }
}

async fn check_source_inner(
    client: &Client,
    source: &SourceEntry,
) -> Result<CheckResult, MonitorError> {
    // Tier 1: conditional GET.
    let mut headers = HeaderMap::new();
    if let Some(etag) = &source.last_etag {
        if let Ok(v) = HeaderValue::from_str(etag) {
            headers.insert(IF_NONE_MATCH, v);
        }
    }
    if let Some(last_modified) = &source.last_modified_header {
        if let Ok(v) = HeaderValue::from_str(last_modified) {
            headers.insert(IF_MODIFIED_SINCE, v);
        }
    }

    if !headers.is_empty() {
        let response = client.get(&source.url).headers(headers).send().await?;
        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(CheckResult::unchanged(
                source.url.clone(),
                DetectionMethod::ConditionalGet,
            ));
        }
        if response.status().is_server_error() {
            return Ok(CheckResult::failed(
                source.url.clone(),
                format!("server error {}", response.status()),
            ));
        }
        if response.status().is_client_error() {
            return Ok(CheckResult::failed(
                source.url.clone(),
                format!("client error {}", response.status()),
            ));
        }
    }

    // Tier 2 + 3: HEAD for ETag / Last-Modified comparison.
    let head = client.head(&source.url).send().await?;
    if head.status().is_server_error() {
        return Ok(CheckResult::failed(
            source.url.clone(),
            format!("server error {}", head.status()),
        ));
    }
    if head.status().is_client_error() {
        return Ok(CheckResult::failed(
            source.url.clone(),
            format!("client error {}", head.status()),
        ));
    }

    if let Some(new_etag) = head.headers().get(ETAG).and_then(|v| v.to_str().ok()) {
        if Some(new_etag) != source.last_etag.as_deref() {
            let mut result =
                CheckResult::changed(source.url.clone(), DetectionMethod::Etag);
            result.new_etag = Some(new_etag.to_string());
            return Ok(result);
        }
    }

    if let (Some(new_lm), Some(old_lm)) = (
        head.headers().get(LAST_MODIFIED).and_then(|v| v.to_str().ok()),
        source.last_modified_header.as_deref(),
    ) {
        if is_strictly_newer(new_lm, old_lm) {
            let mut result =
                CheckResult::changed(source.url.clone(), DetectionMethod::LastModified);
            result.new_last_modified = Some(new_lm.to_string());
            return Ok(result);
        }
    }

    // Tier 4: fetch body, compare content hash.
    let body = client.get(&source.url).send().await?.bytes().await?;
    let mut hasher = Sha256::new();
    hasher.update(&body);
    let new_hash = hex::encode(hasher.finalize());

    if Some(new_hash.as_str()) == source.last_content_hash.as_deref() {
        Ok(CheckResult::unchanged(
            source.url.clone(),
            DetectionMethod::ContentHash,
        ))
    } else {
        let mut result = CheckResult::changed(source.url.clone(), DetectionMethod::ContentHash);
        result.new_content_hash = Some(new_hash);
        Ok(result)
    }
}

fn is_strictly_newer(candidate: &str, baseline: &str) -> bool {
    match (
        chrono::DateTime::parse_from_rfc2822(candidate),
        chrono::DateTime::parse_from_rfc2822(baseline),
    ) {
        (Ok(c), Ok(b)) => c > b,
        _ => candidate != baseline,
    }
}

/// Apply a check's outcome to a source's metadata: `check_failures` resets
/// to zero *before* jitter is computed on success; on error it's
/// incremented and the next check is scheduled via backoff instead.
pub fn update_source_after_check(
    source: &mut SourceEntry,
    check_result: &CheckResult,
    politeness: &Politeness,
) {
    source.last_checked = Some(Utc::now());

    if check_result.status == CheckStatus::Failed {
        source.check_failures += 1;
        source.next_check_after =
            Some(Utc::now() + calculate_backoff_interval(source.check_failures, politeness));
        return;
    }

    source.check_failures = 0;
    source.next_check_after = Some(calculate_next_check_with_jitter(source, politeness));

    if let Some(etag) = &check_result.new_etag {
        source.last_etag = Some(etag.clone());
    }
    if let Some(last_modified) = &check_result.new_last_modified {
        source.last_modified_header = Some(last_modified.clone());
    }
    if let Some(hash) = &check_result.new_content_hash {
        source.last_content_hash = Some(hash.clone());
    }
}
