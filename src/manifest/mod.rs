//! Operational manifest store (SPEC_FULL §4.C): a single `manifest.json`
//! read through the durable store adapter, with a batch mode that defers
//! writes until an explicit flush.
//!
//! Grounded on `original_source/src/parsing/storage.py`'s `ParseStorage`
//! (`manifest()`, `record_entry`, single-file load/save) and on
//! `original_source/src/cli/commands/extraction_batch.py::extract_batch`'s
//! `begin_batch`/`flush_all` bracketing of a whole batch run.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;

use crate::models::manifest::MANIFEST_VERSION;
use crate::models::{Manifest, ManifestEntry};
use crate::store::{Store, StoreError};

const MANIFEST_PATH: &str = "manifest.json";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("manifest version mismatch: on-disk {found}, expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

pub type ManifestResult<T> = Result<T, ManifestError>;

/// Manifest store with optional batch mode: while a batch is open, `record`
/// updates the in-memory manifest but does not write to the backing store
/// until `flush` is called, matching `extract_batch`'s "one commit per
/// batch run" shape.
pub struct ManifestStore {
    store: Arc<dyn Store>,
    manifest: Mutex<Manifest>,
    batching: Mutex<bool>,
}

impl ManifestStore {
    pub async fn load(store: Arc<dyn Store>) -> ManifestResult<Self> {
        let manifest = match store.get(MANIFEST_PATH).await? {
            Some(bytes) => {
                let m: Manifest = serde_json::from_slice(&bytes)
                    .map_err(|e| ManifestError::InvariantViolation(e.to_string()))?;
                if m.version != MANIFEST_VERSION {
                    return Err(ManifestError::VersionMismatch {
                        found: m.version,
                        expected: MANIFEST_VERSION,
                    });
                }
                m
            }
            None => Manifest::new(),
        };
        Ok(Self {
            store,
            manifest: Mutex::new(manifest),
            batching: Mutex::new(false),
        })
    }

    pub async fn get(&self, checksum: &str) -> Option<ManifestEntry> {
        self.manifest.lock().await.get(checksum).cloned()
    }

    pub async fn pending_extraction(&self) -> Vec<ManifestEntry> {
        self.manifest
            .lock()
            .await
            .pending_extraction()
            .cloned()
            .collect()
    }

    /// Record an entry. Writes through immediately unless a batch is open.
    pub async fn record_entry(&self, entry: ManifestEntry) -> ManifestResult<()> {
        self.manifest.lock().await.insert(entry);
        if !*self.batching.lock().await {
            self.save().await?;
        }
        Ok(())
    }

    /// Defer subsequent `record_entry` writes until `flush`/`flush_all`.
    pub async fn begin_batch(&self) {
        *self.batching.lock().await = true;
    }

    /// Write the current manifest state and leave batch mode.
    pub async fn flush_all(&self) -> ManifestResult<()> {
        self.save().await?;
        *self.batching.lock().await = false;
        Ok(())
    }

    /// Write the current manifest state without leaving batch mode
    /// (used to save partial progress before an early exit, e.g. on a rate
    /// limit, per `extract_batch`'s mid-loop `flush_all` call).
    pub async fn flush(&self) -> ManifestResult<()> {
        self.save().await
    }

    async fn save(&self) -> ManifestResult<()> {
        let manifest = self.manifest.lock().await;
        let bytes = serde_json::to_vec_pretty(&*manifest)
            .map_err(|e| ManifestError::InvariantViolation(e.to_string()))?;
        self.store.put(MANIFEST_PATH, &bytes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalStore;
    use tempfile::tempdir;

    fn entry(checksum: &str) -> ManifestEntry {
        ManifestEntry::new_completed(
            checksum.to_string(),
            "https://example.org".to_string(),
            format!("content/{checksum}"),
        )
    }

    #[tokio::test]
    async fn load_with_no_manifest_starts_empty() {
        let dir = tempdir().unwrap();
        let store = Arc::new(LocalStore::new(dir.path()));
        let manifest = ManifestStore::load(store).await.unwrap();
        assert!(manifest.get("abc").await.is_none());
    }

    #[tokio::test]
    async fn record_entry_writes_through_outside_batch() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn Store> = Arc::new(LocalStore::new(dir.path()));
        let manifest = ManifestStore::load(store.clone()).await.unwrap();
        manifest.record_entry(entry("abc")).await.unwrap();

        let reloaded = ManifestStore::load(store).await.unwrap();
        assert!(reloaded.get("abc").await.is_some());
    }

    #[tokio::test]
    async fn batch_mode_defers_until_flush() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn Store> = Arc::new(LocalStore::new(dir.path()));
        let manifest = ManifestStore::load(store.clone()).await.unwrap();

        manifest.begin_batch().await;
        manifest.record_entry(entry("abc")).await.unwrap();
        manifest.record_entry(entry("def")).await.unwrap();

        assert!(store.get("manifest.json").await.unwrap().is_none());

        manifest.flush_all().await.unwrap();
        assert!(store.get("manifest.json").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn pending_extraction_filters_by_status() {
        let dir = tempdir().unwrap();
        let store = Arc::new(LocalStore::new(dir.path()));
        let manifest = ManifestStore::load(store).await.unwrap();

        let mut settled = entry("abc");
        settled.metadata["extraction_complete"] = serde_json::Value::Bool(true);
        manifest.record_entry(settled).await.unwrap();
        manifest.record_entry(entry("def")).await.unwrap();

        let pending = manifest.pending_extraction().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].checksum, "def");
    }

    #[tokio::test]
    async fn version_mismatch_is_fatal() {
        let dir = tempdir().unwrap();
        let store = Arc::new(LocalStore::new(dir.path()));
        store
            .put("manifest.json", br#"{"version":99,"entries":{}}"#)
            .await
            .unwrap();
        let result = ManifestStore::load(store).await;
        assert!(matches!(result, Err(ManifestError::VersionMismatch { .. })));
    }
}
