//! Source registry entry: identity, acquisition metadata, schedule, and
//! crawl scope for one registered content source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// How a source was classified by whoever curated the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Primary,
    Derived,
    Reference,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Derived => "derived",
            Self::Reference => "reference",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "primary" => Some(Self::Primary),
            "derived" => Some(Self::Derived),
            "reference" => Some(Self::Reference),
            _ => None,
        }
    }
}

/// Lifecycle status of a registered source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Active,
    Deprecated,
    PendingReview,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deprecated => "deprecated",
            Self::PendingReview => "pending_review",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "deprecated" => Some(Self::Deprecated),
            "pending_review" => Some(Self::PendingReview),
            _ => None,
        }
    }
}

/// How often a source is expected to change; drives the default check interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateFrequency {
    Frequent,
    Daily,
    Weekly,
    Monthly,
    Unknown,
}

impl UpdateFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Frequent => "frequent",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Unknown => "unknown",
        }
    }
}

impl Default for UpdateFrequency {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Declared crawl boundary for multi-page sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrawlScope {
    Page,
    PathPrefix,
    Host,
    Custom,
}

impl CrawlScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::PathPrefix => "path-prefix",
            Self::Host => "host",
            Self::Custom => "custom",
        }
    }
}

impl Default for CrawlScope {
    fn default() -> Self {
        Self::Page
    }
}

/// A registered web source, keyed by its canonical URL.
///
/// Invariants (spec.md §3): URL is canonicalized before storage and
/// comparison; `last_content_hash = None` means "pending initial
/// acquisition"; `check_failures` resets to zero on any successful check;
/// `next_check_after` only advances after a completed check or acquisition;
/// `status = Active` is a precondition for scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    // Identity
    pub url: String,
    pub name: String,
    pub source_type: SourceType,
    pub status: SourceStatus,

    // Acquisition metadata
    pub last_content_hash: Option<String>,
    pub last_etag: Option<String>,
    pub last_modified_header: Option<String>,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_verified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub update_frequency: UpdateFrequency,

    // Scheduling
    pub next_check_after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub check_failures: u32,

    // Crawl scope
    #[serde(default)]
    pub crawl_scope: CrawlScope,
    #[serde(default = "default_max_pages")]
    pub crawl_max_pages: u32,
    #[serde(default = "default_max_depth")]
    pub crawl_max_depth: u32,
    #[serde(default)]
    pub total_pages_acquired: u64,
    pub last_crawl_completed: Option<DateTime<Utc>>,

    // Provenance
    #[serde(default = "default_credibility")]
    pub credibility_score: f64,
    #[serde(default)]
    pub is_official: bool,
    pub discovered_from: Option<String>,
    pub parent_source_url: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_max_pages() -> u32 {
    100
}

fn default_max_depth() -> u32 {
    5
}

fn default_credibility() -> f64 {
    0.5
}

impl SourceEntry {
    /// Create a freshly registered source pending initial acquisition.
    pub fn new(url: String, name: String, source_type: SourceType) -> Self {
        Self {
            url,
            name,
            source_type,
            status: SourceStatus::Active,
            last_content_hash: None,
            last_etag: None,
            last_modified_header: None,
            last_checked: None,
            last_verified: None,
            update_frequency: UpdateFrequency::Unknown,
            next_check_after: None,
            check_failures: 0,
            crawl_scope: CrawlScope::Page,
            crawl_max_pages: default_max_pages(),
            crawl_max_depth: default_max_depth(),
            total_pages_acquired: 0,
            last_crawl_completed: None,
            credibility_score: default_credibility(),
            is_official: false,
            discovered_from: None,
            parent_source_url: None,
            topics: Vec::new(),
            notes: None,
        }
    }

    /// True if this source has never been successfully acquired.
    pub fn is_pending_initial(&self) -> bool {
        self.last_content_hash.is_none()
    }

    /// True if this source is eligible for multi-page crawling rather than
    /// a single-page fetch.
    pub fn is_crawlable(&self) -> bool {
        !matches!(self.crawl_scope, CrawlScope::Page)
    }

    /// A stable 12-hex-char identifier for this source, used as its
    /// filename under the registry and crawl-state stores. Derived from the
    /// SHA-256 of the canonical URL (must already be canonicalized).
    pub fn hash_id(&self) -> String {
        hash12(&self.url)
    }
}

/// First 12 hex characters of the SHA-256 of `s`, used for the
/// hash-sharded filenames the teacher's storage layer uses for content.
pub fn hash12(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_source_is_pending_initial() {
        let s = SourceEntry::new(
            "https://example.org/a".to_string(),
            "Example".to_string(),
            SourceType::Primary,
        );
        assert!(s.is_pending_initial());
        assert_eq!(s.check_failures, 0);
        assert_eq!(s.status, SourceStatus::Active);
    }

    #[test]
    fn hash_id_is_stable() {
        let s = SourceEntry::new(
            "https://example.org/a".to_string(),
            "Example".to_string(),
            SourceType::Primary,
        );
        let id1 = s.hash_id();
        let id2 = s.hash_id();
        assert_eq!(id1, id2);
        assert_eq!(id1.len(), 12);
    }

    #[test]
    fn serde_roundtrip() {
        let s = SourceEntry::new(
            "https://example.org/a".to_string(),
            "Example".to_string(),
            SourceType::Reference,
        );
        let json = serde_json::to_string(&s).unwrap();
        let back: SourceEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.url, s.url);
        assert_eq!(back.source_type, s.source_type);
        assert_eq!(back.crawl_scope, s.crawl_scope);
    }
}
