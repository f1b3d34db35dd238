//! Checksum-keyed manifest of parsed artifacts.
//!
//! Data shapes only; the operational manifest store (load/save, batch mode)
//! lives in the top-level `manifest` module.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current on-disk manifest schema version. A manifest file with a
/// different version is an `InvariantViolation` (spec.md §7), not silently
/// migrated.
pub const MANIFEST_VERSION: u32 = 1;

/// Outcome of parsing the artifact's bytes — a pure parse-status, entirely
/// independent of how far extraction has progressed (spec.md §3: extraction
/// progress is tracked via the `extraction_complete`/`extraction_skipped`
/// metadata markers, never via `status`, so a failed extraction attempt
/// never removes an entry from the retry-eligible set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestStatus {
    Completed,
    Empty,
    Error,
}

impl ManifestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Empty => "empty",
            Self::Error => "error",
        }
    }
}

/// One manifest row, keyed by its content checksum. Extraction-lifecycle
/// markers (`extraction_complete`, `extraction_skipped`,
/// `extraction_skipped_reason`, `extraction_rate_limited_at`,
/// `extraction_last_batch_run`) live entirely in `metadata`; `status` only
/// ever records the parse outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub checksum: String,
    pub source_url: String,
    pub content_path: String,
    pub content_type: Option<String>,
    pub status: ManifestStatus,
    pub acquired_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}

impl ManifestEntry {
    pub fn new(
        checksum: String,
        source_url: String,
        content_path: String,
        status: ManifestStatus,
    ) -> Self {
        Self {
            checksum,
            source_url,
            content_path,
            content_type: None,
            status,
            acquired_at: Utc::now(),
            metadata: Value::Null,
        }
    }

    /// Convenience constructor for the common case: a non-empty artifact
    /// parsed without error.
    pub fn new_completed(checksum: String, source_url: String, content_path: String) -> Self {
        Self::new(checksum, source_url, content_path, ManifestStatus::Completed)
    }

    fn metadata_flag(&self, key: &str) -> bool {
        self.metadata
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Whether extraction has already reached one of its two mutually
    /// exclusive terminal markers for this entry (spec.md §3 invariant b).
    pub fn extraction_settled(&self) -> bool {
        self.metadata_flag("extraction_complete") || self.metadata_flag("extraction_skipped")
    }
}

/// The manifest document itself: `{version, entries}` (spec.md §4.C),
/// serialized as a single `manifest.json` through the store adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub entries: HashMap<String, ManifestEntry>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: HashMap::new(),
        }
    }
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, checksum: &str) -> Option<&ManifestEntry> {
        self.entries.get(checksum)
    }

    pub fn insert(&mut self, entry: ManifestEntry) {
        self.entries.insert(entry.checksum.clone(), entry);
    }

    /// Entries eligible for the extraction driver to pick up: a completed
    /// parse whose extraction hasn't already reached a terminal marker.
    /// Gating on `metadata` rather than `status` keeps an entry that failed
    /// extraction (or was rate-limited) eligible again on the next run —
    /// `status` never moves once a parse has completed.
    pub fn pending_extraction(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries
            .values()
            .filter(|e| e.status == ManifestStatus::Completed && !e.extraction_settled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_manifest_has_current_version() {
        let m = Manifest::new();
        assert_eq!(m.version, MANIFEST_VERSION);
        assert!(m.entries.is_empty());
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let mut m = Manifest::new();
        let entry = ManifestEntry::new_completed(
            "abc123".to_string(),
            "https://example.org".to_string(),
            "content/ab/abc123".to_string(),
        );
        m.insert(entry);
        assert!(m.get("abc123").is_some());
        assert_eq!(m.pending_extraction().count(), 1);
    }

    #[test]
    fn empty_and_error_status_are_never_pending_extraction() {
        let mut m = Manifest::new();
        m.insert(ManifestEntry::new(
            "empty1".to_string(),
            "https://example.org/a".to_string(),
            "content/em/empty1".to_string(),
            ManifestStatus::Empty,
        ));
        m.insert(ManifestEntry::new(
            "err1".to_string(),
            "https://example.org/b".to_string(),
            "content/er/err1".to_string(),
            ManifestStatus::Error,
        ));
        assert_eq!(m.pending_extraction().count(), 0);
    }

    #[test]
    fn a_failed_extraction_attempt_remains_pending_for_retry() {
        let mut entry = ManifestEntry::new_completed(
            "abc123".to_string(),
            "https://example.org".to_string(),
            "content/ab/abc123".to_string(),
        );
        // A failed extraction attempt records nothing in metadata (no
        // terminal marker is set) and never touches `status` — the entry
        // must still show up as pending on the next run.
        assert_eq!(entry.status, ManifestStatus::Completed);
        assert!(!entry.extraction_settled());

        let mut m = Manifest::new();
        m.insert(entry.clone());
        assert_eq!(m.pending_extraction().count(), 1);

        entry.metadata["extraction_rate_limited_at"] =
            serde_json::Value::String("2024-01-01T00:00:00Z".to_string());
        m.insert(entry);
        assert_eq!(
            m.pending_extraction().count(),
            1,
            "rate-limit marker alone does not settle extraction"
        );
    }

    #[test]
    fn extraction_complete_marker_settles_the_entry() {
        let mut entry = ManifestEntry::new_completed(
            "abc123".to_string(),
            "https://example.org".to_string(),
            "content/ab/abc123".to_string(),
        );
        entry.metadata["extraction_complete"] = serde_json::Value::Bool(true);

        let mut m = Manifest::new();
        m.insert(entry);
        assert_eq!(m.pending_extraction().count(), 0);
    }
}
