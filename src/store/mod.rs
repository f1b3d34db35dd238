//! Durable store adapter (SPEC_FULL §4.A): a `put`/`get`/`put_batch`
//! contract over either a local filesystem root or a GitHub repository
//! treated as a filesystem, so the rest of the crate never has to know
//! which backend it is talking to.

mod local;
mod remote;

pub use local::LocalStore;
pub use remote::{RemoteConfig, RemoteStore};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("conflict updating {path}: {reason}")]
    Conflict { path: String, reason: String },

    #[error("object not found: {0}")]
    NotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One file to write in a batch commit.
pub struct PutFile {
    pub path: String,
    pub content: Vec<u8>,
}

impl PutFile {
    pub fn new(path: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            content,
        }
    }
}

/// Durable storage backend. Paths are always relative, forward-slash
/// separated, and rooted at whatever base the backend was configured with.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read the raw bytes at `path`, or `Ok(None)` if it doesn't exist.
    async fn get(&self, path: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Write `content` at `path`, creating or overwriting it.
    async fn put(&self, path: &str, content: &[u8]) -> StoreResult<()>;

    /// Write many files as a single logical unit of work. Backends that
    /// support atomic multi-file commits (the remote/GitHub backend) do so
    /// in one transaction; the local backend just iterates.
    async fn put_batch(&self, files: Vec<PutFile>, message: &str) -> StoreResult<()>;

    /// Remove the object at `path`. A no-op if it doesn't exist.
    async fn delete(&self, path: &str) -> StoreResult<()>;

    /// True if an object exists at `path`.
    async fn exists(&self, path: &str) -> StoreResult<bool> {
        Ok(self.get(path).await?.is_some())
    }

    /// List relative paths of all objects under `prefix` (non-recursive
    /// callers should pass a directory-shaped prefix ending in `/`).
    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>>;
}
