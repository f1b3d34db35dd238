//! Outcome of a single change-detection check against a registered source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which tier of the detection cascade produced a conclusive result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    ConditionalGet,
    Etag,
    LastModified,
    ContentHash,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConditionalGet => "conditional_get",
            Self::Etag => "etag",
            Self::LastModified => "last_modified",
            Self::ContentHash => "content_hash",
        }
    }
}

/// The conclusion of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Unchanged,
    Changed,
    Failed,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Changed => "changed",
            Self::Failed => "failed",
        }
    }
}

/// Result of running the detection cascade (spec.md §4.E) against one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub source_url: String,
    pub status: CheckStatus,
    pub method: Option<DetectionMethod>,
    pub new_etag: Option<String>,
    pub new_last_modified: Option<String>,
    pub new_content_hash: Option<String>,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl CheckResult {
    pub fn unchanged(source_url: String, method: DetectionMethod) -> Self {
        Self {
            source_url,
            status: CheckStatus::Unchanged,
            method: Some(method),
            new_etag: None,
            new_last_modified: None,
            new_content_hash: None,
            error: None,
            checked_at: Utc::now(),
        }
    }

    pub fn changed(source_url: String, method: DetectionMethod) -> Self {
        Self {
            source_url,
            status: CheckStatus::Changed,
            method: Some(method),
            new_etag: None,
            new_last_modified: None,
            new_content_hash: None,
            error: None,
            checked_at: Utc::now(),
        }
    }

    pub fn failed(source_url: String, error: impl Into<String>) -> Self {
        Self {
            source_url,
            status: CheckStatus::Failed,
            method: None,
            new_etag: None,
            new_last_modified: None,
            new_content_hash: None,
            error: Some(error.into()),
            checked_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_carries_error_and_no_method() {
        let r = CheckResult::failed("https://example.org".to_string(), "timeout");
        assert_eq!(r.status, CheckStatus::Failed);
        assert!(r.method.is_none());
        assert_eq!(r.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn changed_carries_method() {
        let r = CheckResult::changed("https://example.org".to_string(), DetectionMethod::Etag);
        assert_eq!(r.status, CheckStatus::Changed);
        assert_eq!(r.method, Some(DetectionMethod::Etag));
    }
}
