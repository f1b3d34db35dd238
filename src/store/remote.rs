//! Remote backend: a GitHub repository treated as a filesystem, using
//! `octocrab`'s Git Data API (blobs/trees/commits/refs).
//!
//! The commit algorithm below is a direct re-expression of
//! `original_source/src/integrations/github/files.py::commit_files_batch`:
//! read the branch ref, read its tree, create one blob per file, one tree,
//! one commit, then PATCH the ref with up to 3 attempts, recreating the
//! commit on top of the latest parent when the PATCH rejects a non-fast-
//! forward update.

use async_trait::async_trait;
use base64::Engine;
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{PutFile, Store, StoreError, StoreResult};

const MAX_RETRIES: u32 = 3;

pub struct RemoteConfig {
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

pub struct RemoteStore {
    client: Octocrab,
    config: RemoteConfig,
}

impl RemoteStore {
    pub fn new(client: Octocrab, config: RemoteConfig) -> Self {
        Self { client, config }
    }

    fn base_route(&self) -> String {
        format!("/repos/{}/{}", self.config.owner, self.config.repo)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, route: &str) -> StoreResult<T> {
        self.client
            .get(route, None::<&()>)
            .await
            .map_err(|e| StoreError::Http(e.to_string()))
    }

    async fn post_json<B: Serialize + ?Sized, T: for<'de> Deserialize<'de>>(
        &self,
        route: &str,
        body: &B,
    ) -> StoreResult<T> {
        self.client
            .post(route, Some(body))
            .await
            .map_err(|e| StoreError::Http(e.to_string()))
    }

    async fn patch_json<B: Serialize + ?Sized, T: for<'de> Deserialize<'de>>(
        &self,
        route: &str,
        body: &B,
    ) -> Result<T, octocrab::Error> {
        self.client.patch(route, Some(body)).await
    }

    async fn current_ref_sha(&self) -> StoreResult<String> {
        let route = format!(
            "{}/git/refs/heads/{}",
            self.base_route(),
            self.config.branch
        );
        let ref_data: RefResponse = self.get_json(&route).await?;
        Ok(ref_data.object.sha)
    }

    async fn base_tree_sha(&self, commit_sha: &str) -> StoreResult<String> {
        let route = format!("{}/git/commits/{}", self.base_route(), commit_sha);
        let commit: CommitObjectResponse = self.get_json(&route).await?;
        Ok(commit.tree.sha)
    }

    async fn create_blob(&self, content: &[u8]) -> StoreResult<String> {
        let route = format!("{}/git/blobs", self.base_route());
        let encoded = base64::engine::general_purpose::STANDARD.encode(content);
        let body = CreateBlobRequest {
            content: encoded,
            encoding: "base64".to_string(),
        };
        let blob: ShaResponse = self.post_json(&route, &body).await?;
        Ok(blob.sha)
    }

    async fn create_tree(&self, base_tree: &str, entries: Vec<TreeEntry>) -> StoreResult<String> {
        let route = format!("{}/git/trees", self.base_route());
        let body = CreateTreeRequest {
            base_tree: base_tree.to_string(),
            tree: entries,
        };
        let tree: ShaResponse = self.post_json(&route, &body).await?;
        Ok(tree.sha)
    }

    async fn create_commit(
        &self,
        message: &str,
        tree_sha: &str,
        parent_sha: &str,
    ) -> StoreResult<String> {
        let route = format!("{}/git/commits", self.base_route());
        let body = CreateCommitRequest {
            message: message.to_string(),
            tree: tree_sha.to_string(),
            parents: vec![parent_sha.to_string()],
        };
        let commit: ShaResponse = self.post_json(&route, &body).await?;
        Ok(commit.sha)
    }

    async fn update_ref(&self, sha: &str, force: bool) -> Result<(), octocrab::Error> {
        let route = format!(
            "{}/git/refs/heads/{}",
            self.base_route(),
            self.config.branch
        );
        let body = UpdateRefRequest {
            sha: sha.to_string(),
            force,
        };
        let _: serde_json::Value = self.patch_json(&route, &body).await?;
        Ok(())
    }

    fn normalize_path(path: &str) -> String {
        path.trim_start_matches('/').to_string()
    }
}

#[async_trait]
impl Store for RemoteStore {
    async fn get(&self, path: &str) -> StoreResult<Option<Vec<u8>>> {
        let route = format!(
            "{}/contents/{}?ref={}",
            self.base_route(),
            Self::normalize_path(path),
            self.config.branch
        );
        match self.get_json::<ContentResponse>(&route).await {
            Ok(content) => {
                let cleaned: String = content.content.chars().filter(|c| !c.is_whitespace()).collect();
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(cleaned)
                    .map_err(|e| StoreError::Http(e.to_string()))?;
                Ok(Some(bytes))
            }
            Err(StoreError::Http(msg)) if msg.contains("404") => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn put(&self, path: &str, content: &[u8]) -> StoreResult<()> {
        self.put_batch(
            vec![PutFile::new(path, content.to_vec())],
            &format!("update {path}"),
        )
        .await
    }

    async fn put_batch(&self, files: Vec<PutFile>, message: &str) -> StoreResult<()> {
        if files.is_empty() {
            return Ok(());
        }

        let current_commit_sha = self.current_ref_sha().await?;
        let base_tree_sha = self.base_tree_sha(&current_commit_sha).await?;

        let mut tree_entries = Vec::with_capacity(files.len());
        for file in &files {
            let blob_sha = self.create_blob(&file.content).await?;
            tree_entries.push(TreeEntry {
                path: Self::normalize_path(&file.path),
                mode: "100644".to_string(),
                entry_type: "blob".to_string(),
                sha: blob_sha,
            });
        }

        let new_tree_sha = self.create_tree(&base_tree_sha, tree_entries).await?;
        let mut new_commit_sha = self
            .create_commit(message, &new_tree_sha, &current_commit_sha)
            .await?;

        let mut last_err = None;
        for attempt in 0..MAX_RETRIES {
            match self.update_ref(&new_commit_sha, attempt > 0).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    let msg = e.to_string();
                    if msg.to_lowercase().contains("not a fast forward") && attempt + 1 < MAX_RETRIES
                    {
                        warn!(attempt, "ref update rejected, rebasing commit and retrying");
                        let latest_sha = self.current_ref_sha().await?;
                        new_commit_sha = self
                            .create_commit(message, &new_tree_sha, &latest_sha)
                            .await?;
                        last_err = Some(msg);
                        continue;
                    }
                    return Err(StoreError::Conflict {
                        path: files
                            .iter()
                            .map(|f| f.path.as_str())
                            .collect::<Vec<_>>()
                            .join(", "),
                        reason: msg,
                    });
                }
            }
        }

        Err(StoreError::Conflict {
            path: files
                .iter()
                .map(|f| f.path.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            reason: last_err.unwrap_or_else(|| "exhausted retries".to_string()),
        })
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        let route = format!(
            "{}/contents/{}",
            self.base_route(),
            Self::normalize_path(path)
        );
        let existing: Option<ContentResponse> = match self.get_json(&route).await {
            Ok(c) => Some(c),
            Err(StoreError::Http(msg)) if msg.contains("404") => None,
            Err(e) => return Err(e),
        };
        let Some(existing) = existing else {
            return Ok(());
        };
        let body = DeleteFileRequest {
            message: format!("delete {path}"),
            sha: existing.sha,
            branch: self.config.branch.clone(),
        };
        self.client
            .delete(&route, Some(&body))
            .await
            .map_err(|e| StoreError::Http(e.to_string()))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let route = format!(
            "{}/contents/{}?ref={}",
            self.base_route(),
            Self::normalize_path(prefix),
            self.config.branch
        );
        let entries: Vec<ContentEntry> = match self.get_json(&route).await {
            Ok(e) => e,
            Err(StoreError::Http(msg)) if msg.contains("404") => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        Ok(entries
            .into_iter()
            .filter(|e| e.entry_type == "file")
            .map(|e| e.path)
            .collect())
    }
}

#[derive(Deserialize)]
struct RefResponse {
    object: RefObject,
}

#[derive(Deserialize)]
struct RefObject {
    sha: String,
}

#[derive(Deserialize)]
struct CommitObjectResponse {
    tree: ShaResponse,
}

#[derive(Deserialize)]
struct ShaResponse {
    sha: String,
}

#[derive(Serialize)]
struct CreateBlobRequest {
    content: String,
    encoding: String,
}

#[derive(Serialize)]
struct TreeEntry {
    path: String,
    mode: String,
    #[serde(rename = "type")]
    entry_type: String,
    sha: String,
}

#[derive(Serialize)]
struct CreateTreeRequest {
    base_tree: String,
    tree: Vec<TreeEntry>,
}

#[derive(Serialize)]
struct CreateCommitRequest {
    message: String,
    tree: String,
    parents: Vec<String>,
}

#[derive(Serialize)]
struct UpdateRefRequest {
    sha: String,
    force: bool,
}

#[derive(Serialize)]
struct DeleteFileRequest {
    message: String,
    sha: String,
    branch: String,
}

#[derive(Deserialize)]
struct ContentResponse {
    content: String,
    sha: String,
}

#[derive(Deserialize)]
struct ContentEntry {
    path: String,
    #[serde(rename = "type")]
    entry_type: String,
}
