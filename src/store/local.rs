//! Local filesystem backend: atomic write-then-rename, generalized from
//! `storage.rs::save_version_content`'s hash-sharded document paths to
//! arbitrary relative paths under a configured root.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use super::{PutFile, Store, StoreError, StoreResult};

pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    fn write_atomic(dest: &Path, content: &[u8]) -> StoreResult<()> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_name = format!(
            ".{}.{}.tmp",
            dest.file_name().and_then(|n| n.to_str()).unwrap_or("store"),
            Uuid::new_v4()
        );
        let tmp_path = dest.with_file_name(tmp_name);
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, dest)?;
        Ok(())
    }
}

#[async_trait]
impl Store for LocalStore {
    async fn get(&self, path: &str) -> StoreResult<Option<Vec<u8>>> {
        let full = self.resolve(path);
        match std::fs::read(&full) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn put(&self, path: &str, content: &[u8]) -> StoreResult<()> {
        let full = self.resolve(path);
        Self::write_atomic(&full, content)
    }

    async fn put_batch(&self, files: Vec<PutFile>, _message: &str) -> StoreResult<()> {
        for file in files {
            self.put(&file.path, &file.content).await?;
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        let full = self.resolve(path);
        match std::fs::remove_file(&full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let dir = self.resolve(prefix);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let rel = entry
                    .path()
                    .strip_prefix(&self.root)
                    .unwrap_or(&entry.path())
                    .to_string_lossy()
                    .replace('\\', "/");
                out.push(rel);
            }
        }
        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        store.put("sources/abc123.json", b"{}").await.unwrap();
        let read = store.get("sources/abc123.json").await.unwrap();
        assert_eq!(read, Some(b"{}".to_vec()));
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        assert_eq!(store.get("nope.json").await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_overwrites_atomically() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        store.put("x.json", b"first").await.unwrap();
        store.put("x.json", b"second").await.unwrap();
        assert_eq!(store.get("x.json").await.unwrap(), Some(b"second".to_vec()));
        // no leftover temp files
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        store.delete("never-existed.json").await.unwrap();
        store.put("x.json", b"data").await.unwrap();
        store.delete("x.json").await.unwrap();
        assert_eq!(store.get("x.json").await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_returns_sorted_relative_paths() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        store.put("sources/b.json", b"{}").await.unwrap();
        store.put("sources/a.json", b"{}").await.unwrap();
        let listed = store.list("sources").await.unwrap();
        assert_eq!(listed, vec!["sources/a.json", "sources/b.json"]);
    }

    #[tokio::test]
    async fn put_batch_writes_all_files() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        store
            .put_batch(
                vec![
                    PutFile::new("a.json", b"1".to_vec()),
                    PutFile::new("b.json", b"2".to_vec()),
                ],
                "batch write",
            )
            .await
            .unwrap();
        assert_eq!(store.get("a.json").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get("b.json").await.unwrap(), Some(b"2".to_vec()));
    }
}
