//! Resumable BFS crawl checkpoint for one multi-page source.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a discovered URL was found, mirrors the teacher's crawl-repository
/// discovery-method column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    Seed,
    LinkExtraction,
    Sitemap,
}

impl DiscoveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seed => "seed",
            Self::LinkExtraction => "link_extraction",
            Self::Sitemap => "sitemap",
        }
    }
}

/// Per-URL status within a crawl's frontier/visited bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlStatus {
    Pending,
    Visited,
    Skipped,
    Failed,
    OutOfScope,
}

impl UrlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Visited => "visited",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::OutOfScope => "out_of_scope",
        }
    }
}

/// Overall lifecycle of a crawl (spec.md §8: a crawl reaching `max_pages`
/// with a non-empty frontier remaining pauses with `state = paused` rather
/// than finishing, distinct from both an in-progress run and a completed
/// one whose frontier drained).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlLifecycle {
    InProgress,
    Paused,
    Completed,
    Aborted,
}

impl CrawlLifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }
}

/// A single frontier/visited record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlUrlRecord {
    pub url: String,
    pub status: UrlStatus,
    pub depth: u32,
    pub discovered_via: DiscoveryMethod,
    pub discovered_from: Option<String>,
}

/// Resumable checkpoint for one source's multi-page crawl, persisted as a
/// single JSON document under `crawl-state/<hash12>.json` (spec.md §4.D).
///
/// Invariants: `frontier` holds only URLs with status `Pending`; a URL
/// appears at most once across `frontier` and `visited`; `pages_acquired`
/// only increments when a page is both fetched and stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlState {
    pub source_url: String,
    pub lifecycle: CrawlLifecycle,
    pub frontier: VecDeque<CrawlUrlRecord>,
    pub visited: Vec<CrawlUrlRecord>,
    #[serde(default)]
    pub seen: HashSet<String>,
    pub pages_acquired: u64,
    pub pages_skipped: u64,
    pub pages_failed: u64,
    pub pages_out_of_scope: u64,
    pub started_at: DateTime<Utc>,
    pub last_saved_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CrawlState {
    /// Start a fresh crawl with a single seed URL in the frontier.
    pub fn new(source_url: String, seed_url: String) -> Self {
        let now = Utc::now();
        let mut seen = HashSet::new();
        seen.insert(seed_url.clone());
        let mut frontier = VecDeque::new();
        frontier.push_back(CrawlUrlRecord {
            url: seed_url,
            status: UrlStatus::Pending,
            depth: 0,
            discovered_via: DiscoveryMethod::Seed,
            discovered_from: None,
        });
        Self {
            source_url,
            lifecycle: CrawlLifecycle::InProgress,
            frontier,
            visited: Vec::new(),
            seen,
            pages_acquired: 0,
            pages_skipped: 0,
            pages_failed: 0,
            pages_out_of_scope: 0,
            started_at: now,
            last_saved_at: now,
            completed_at: None,
        }
    }

    /// Enqueue a newly discovered URL if it hasn't been seen before in this
    /// crawl. Returns true if it was added.
    pub fn enqueue(
        &mut self,
        url: String,
        depth: u32,
        discovered_via: DiscoveryMethod,
        discovered_from: Option<String>,
    ) -> bool {
        if self.seen.contains(&url) {
            return false;
        }
        self.seen.insert(url.clone());
        self.frontier.push_back(CrawlUrlRecord {
            url,
            status: UrlStatus::Pending,
            depth,
            discovered_via,
            discovered_from,
        });
        true
    }

    /// Pop the next pending URL to visit, breadth-first.
    pub fn pop_next(&mut self) -> Option<CrawlUrlRecord> {
        self.frontier.pop_front()
    }

    /// Record the outcome of visiting a URL popped via [`Self::pop_next`].
    pub fn record_visit(&mut self, mut record: CrawlUrlRecord, status: UrlStatus) {
        record.status = status;
        match status {
            UrlStatus::Visited => self.pages_acquired += 1,
            UrlStatus::Skipped => self.pages_skipped += 1,
            UrlStatus::Failed => self.pages_failed += 1,
            UrlStatus::OutOfScope => self.pages_out_of_scope += 1,
            UrlStatus::Pending => {}
        }
        self.visited.push(record);
    }

    pub fn is_frontier_empty(&self) -> bool {
        self.frontier.is_empty()
    }

    pub fn total_pages_seen(&self) -> u64 {
        self.pages_acquired + self.pages_skipped + self.pages_failed + self.pages_out_of_scope
    }

    pub fn mark_completed(&mut self) {
        self.lifecycle = CrawlLifecycle::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// A run stopped (hit its per-run page cap, or was interrupted) with
    /// URLs still queued. The frontier and `seen` set are left untouched so
    /// the next run resumes exactly where this one left off.
    pub fn mark_paused(&mut self) {
        self.lifecycle = CrawlLifecycle::Paused;
    }

    pub fn mark_aborted(&mut self) {
        self.lifecycle = CrawlLifecycle::Aborted;
    }

    pub fn touch_saved(&mut self) {
        self.last_saved_at = Utc::now();
    }
}
