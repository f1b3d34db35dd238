//! Crawl-state store (SPEC_FULL §4.D): one JSON document per source under
//! `crawl-state/<hash12>.json`, persisting the frontier/visited bookkeeping
//! a multi-page crawl needs to resume after interruption.
//!
//! Field/counter set translated from `repository::crawl::CrawlRepository`'s
//! SQLite columns (`crawl_urls.status`, `discovery_method`, `depth`, plus
//! the per-crawl visited/skipped/failed/discovered counts it implies) into
//! one document per source, since nothing here needs a cross-source query.
//! Save cadence (every 10 pages) and the guaranteed final save are grounded
//! on `original_source/src/knowledge/pipeline/crawler.py::acquire_crawl`.

use std::sync::Arc;

use thiserror::Error;

use crate::models::{hash12, CrawlState};
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum CrawlStateError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

pub type CrawlStateResult<T> = Result<T, CrawlStateError>;

/// Save a checkpoint every N visited pages, independent of lifecycle end.
pub const SAVE_EVERY_N_PAGES: u64 = 10;

fn path_for(source_url: &str) -> String {
    format!("crawl-state/{}.json", hash12(source_url))
}

pub struct CrawlStateStore {
    store: Arc<dyn Store>,
}

impl CrawlStateStore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn load(&self, source_url: &str) -> CrawlStateResult<Option<CrawlState>> {
        match self.store.get(&path_for(source_url)).await? {
            Some(bytes) => {
                let state: CrawlState = serde_json::from_slice(&bytes)
                    .map_err(|e| CrawlStateError::InvariantViolation(e.to_string()))?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    pub async fn save(&self, state: &mut CrawlState) -> CrawlStateResult<()> {
        state.touch_saved();
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| CrawlStateError::InvariantViolation(e.to_string()))?;
        self.store.put(&path_for(&state.source_url), &bytes).await?;
        Ok(())
    }

    pub async fn delete(&self, source_url: &str) -> CrawlStateResult<()> {
        self.store.delete(&path_for(source_url)).await?;
        Ok(())
    }

    /// True if `pages_visited_since_save` has crossed the checkpoint
    /// threshold and a save is due. The caller passes the count of pages
    /// visited since the last successful save.
    pub fn save_is_due(pages_visited_since_save: u64) -> bool {
        pages_visited_since_save > 0 && pages_visited_since_save % SAVE_EVERY_N_PAGES == 0
    }
}
