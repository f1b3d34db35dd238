//! Source registry (SPEC_FULL §4.B): one JSON file per source under
//! `sources/<hash12>.json`, plus an `index.json` listing known URLs, written
//! through the durable store adapter.
//!
//! CRUD shape grounded on `repository::source::SourceRepository`
//! (`get`/`get_all`/`save`/`delete`/`exists`), re-pointed from SQLite rows at
//! the store adapter; URL canonicalization at every boundary per spec.md §4.B.

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;

use crate::models::{hash12, SourceEntry, SourceStatus};
use crate::store::{Store, StoreError};
use crate::url_utils;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid url {0}: {1}")]
    InvalidUrl(String, url::ParseError),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

const SOURCES_PREFIX: &str = "sources";
const INDEX_PATH: &str = "sources/index.json";

pub struct SourceRegistry {
    store: Arc<dyn Store>,
}

impl SourceRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn path_for(hash: &str) -> String {
        format!("{SOURCES_PREFIX}/{hash}.json")
    }

    /// Look up a source by its (possibly uncanonicalized) URL.
    pub async fn get(&self, url: &str) -> RegistryResult<Option<SourceEntry>> {
        let canonical = url_utils::canonicalize(url).map_err(|e| {
            RegistryError::InvalidUrl(url.to_string(), e)
        })?;
        let hash = hash12(&canonical);
        let path = Self::path_for(&hash);
        match self.store.get(&path).await? {
            Some(bytes) => {
                let entry: SourceEntry = serde_json::from_slice(&bytes)
                    .map_err(|e| RegistryError::InvariantViolation(e.to_string()))?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /// Insert or update a source entry. The entry's `url` is canonicalized
    /// in place before it's written.
    pub async fn put(&self, mut entry: SourceEntry) -> RegistryResult<SourceEntry> {
        entry.url = url_utils::canonicalize(&entry.url)
            .map_err(|e| RegistryError::InvalidUrl(entry.url.clone(), e))?;
        let hash = entry.hash_id();
        let path = Self::path_for(&hash);
        let bytes = serde_json::to_vec_pretty(&entry)
            .map_err(|e| RegistryError::InvariantViolation(e.to_string()))?;
        self.store.put(&path, &bytes).await?;
        self.update_index(&hash, true).await?;
        Ok(entry)
    }

    /// Soft-deletes a source: flips `status` to `Deprecated` and writes it
    /// back rather than removing the record (spec.md §4.B: "soft delete via
    /// `status = deprecated`"; §3's ownership invariant: a `SourceEntry` is
    /// never deleted, only its `status` flips). A no-op if the source is
    /// already gone.
    pub async fn delete(&self, url: &str) -> RegistryResult<()> {
        if let Some(mut entry) = self.get(url).await? {
            entry.status = SourceStatus::Deprecated;
            self.put(entry).await?;
        }
        Ok(())
    }

    pub async fn exists(&self, url: &str) -> RegistryResult<bool> {
        Ok(self.get(url).await?.is_some())
    }

    /// Load every registered source. Uses the index when present, falling
    /// back to a directory listing so a hand-edited store without an index
    /// still works.
    pub async fn list(&self) -> RegistryResult<Vec<SourceEntry>> {
        let hashes = self.load_index().await?;
        let mut out = Vec::with_capacity(hashes.len());
        for hash in hashes {
            if let Some(bytes) = self.store.get(&Self::path_for(&hash)).await? {
                let entry: SourceEntry = serde_json::from_slice(&bytes)
                    .map_err(|e| RegistryError::InvariantViolation(e.to_string()))?;
                out.push(entry);
            }
        }
        Ok(out)
    }

    async fn load_index(&self) -> RegistryResult<BTreeSet<String>> {
        match self.store.get(INDEX_PATH).await? {
            Some(bytes) => {
                let set: BTreeSet<String> = serde_json::from_slice(&bytes)
                    .map_err(|e| RegistryError::InvariantViolation(e.to_string()))?;
                Ok(set)
            }
            None => {
                let paths = self.store.list(SOURCES_PREFIX).await?;
                Ok(paths
                    .into_iter()
                    .filter_map(|p| {
                        p.rsplit('/')
                            .next()
                            .and_then(|f| f.strip_suffix(".json"))
                            .filter(|name| *name != "index")
                            .map(|s| s.to_string())
                    })
                    .collect())
            }
        }
    }

    async fn update_index(&self, hash: &str, present: bool) -> RegistryResult<()> {
        let mut set = self.load_index().await?;
        if present {
            set.insert(hash.to_string());
        } else {
            set.remove(hash);
        }
        let bytes = serde_json::to_vec_pretty(&set)
            .map_err(|e| RegistryError::InvariantViolation(e.to_string()))?;
        self.store.put(INDEX_PATH, &bytes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;
    use crate::store::LocalStore;
    use tempfile::tempdir;

    fn registry(dir: &std::path::Path) -> SourceRegistry {
        SourceRegistry::new(Arc::new(LocalStore::new(dir)))
    }

    #[tokio::test]
    async fn put_then_get_canonicalizes_url() {
        let dir = tempdir().unwrap();
        let reg = registry(dir.path());
        let entry = SourceEntry::new(
            "HTTPS://Example.org:443/a".to_string(),
            "Example".to_string(),
            SourceType::Primary,
        );
        reg.put(entry).await.unwrap();

        let fetched = reg.get("https://example.org/a").await.unwrap();
        assert!(fetched.is_some());
        assert_eq!(fetched.unwrap().url, "https://example.org/a");
    }

    #[tokio::test]
    async fn list_reflects_index() {
        let dir = tempdir().unwrap();
        let reg = registry(dir.path());
        reg.put(SourceEntry::new(
            "https://a.example.org".to_string(),
            "A".to_string(),
            SourceType::Primary,
        ))
        .await
        .unwrap();
        reg.put(SourceEntry::new(
            "https://b.example.org".to_string(),
            "B".to_string(),
            SourceType::Reference,
        ))
        .await
        .unwrap();

        let all = reg.list().await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn delete_soft_deletes_by_flipping_status_to_deprecated() {
        let dir = tempdir().unwrap();
        let reg = registry(dir.path());
        reg.put(SourceEntry::new(
            "https://example.org".to_string(),
            "Example".to_string(),
            SourceType::Primary,
        ))
        .await
        .unwrap();
        reg.delete("https://example.org").await.unwrap();

        let entry = reg
            .get("https://example.org")
            .await
            .unwrap()
            .expect("soft-deleted entry still exists in the registry");
        assert_eq!(entry.status, crate::models::SourceStatus::Deprecated);
        assert_eq!(reg.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_of_unknown_url_is_a_no_op() {
        let dir = tempdir().unwrap();
        let reg = registry(dir.path());
        reg.delete("https://example.org/missing").await.unwrap();
        assert_eq!(reg.list().await.unwrap().len(), 0);
    }
}
