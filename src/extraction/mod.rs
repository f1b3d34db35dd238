//! Extraction queue driver (SPEC_FULL §4.I): walks the manifest, assesses
//! each pending artifact's substance, runs a fixed pipeline of entity
//! extractors over the substantive ones, and records results — batching all
//! manifest writes into a single flush per run.
//!
//! Grounded on `original_source/src/cli/commands/extraction_batch.py`'s
//! `extract_batch` loop (assess → extract-in-sequence → mark-complete, with
//! `begin_batch`/`flush_all` bracketing the whole run and a rate-limit branch
//! that flushes partial progress and exits 42) and on
//! `original_source/src/knowledge/extraction.py`'s four-extractor shape
//! (people, organizations, concepts, associations, the last fed hints from
//! the first three). spec.md §9's redesign note replaces the original's
//! runtime-typed callables with the `Extractor` trait and `ExtractorResult`
//! sum type below; exception-based rate-limit control flow becomes the
//! `RateLimited` variant the driver matches on explicitly.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use crate::manifest::{ManifestError, ManifestStore};
use crate::models::{
    EntityAssociation, ExtractedAssociations, ExtractedConcepts, ExtractedOrganizations,
    ExtractedPeople, ManifestEntry,
};
use crate::store::{Store, StoreError};

/// Process exit code the binary surfaces when a run is paused by a rate
/// limit with partial progress already durable (spec.md §4.I).
pub const EXIT_RATE_LIMITED: i32 = 42;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The closed set of entity kinds an `Extractor` can be asked to produce
/// (spec.md §9's "closed enumeration" redesign note).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionKind {
    People,
    Organizations,
    Concepts,
    Associations,
}

/// Outcome of a substance assessment.
#[derive(Debug, Clone)]
pub struct AssessmentResult {
    pub is_substantive: bool,
    pub reason: String,
    pub confidence: f64,
}

/// Outcome of `Extractor::assess`: a sum type over "assessed", "rate
/// limited", and "failed", mirroring `ExtractorResult` below but without an
/// entity-list payload.
#[derive(Debug)]
pub enum AssessOutcome {
    Assessed(AssessmentResult),
    RateLimited { retry_after: Option<chrono::Duration> },
    Failed(String),
}

/// One extracted entity list, typed by kind, produced by `Extractor::extract`.
#[derive(Debug, Clone)]
pub enum EntityList {
    People(Vec<String>),
    Organizations(Vec<String>),
    Concepts(Vec<String>),
    Associations(Vec<EntityAssociation>),
}

/// Sum-typed extractor outcome (spec.md §9 redesign note: replaces the
/// original's exception-based rate-limit control flow with an explicit
/// variant the driver matches on).
#[derive(Debug)]
pub enum ExtractorResult {
    Ok(EntityList),
    RateLimited { retry_after: Option<chrono::Duration> },
    Failed(String),
}

/// Extracted entities from earlier stages in the same document's pipeline,
/// passed to the association extractor as hints (the original's
/// `process_document_associations` hint-gathering).
#[derive(Debug, Default, Clone)]
pub struct ExtractionHints {
    pub people: Vec<String>,
    pub organizations: Vec<String>,
    pub concepts: Vec<String>,
}

/// Capability interface for substance assessment and entity extraction over
/// document text, keyed by content checksum. Implementations are opaque to
/// the driver (spec.md §9): they may call an LLM, a local model, or a rule
/// engine — the driver only ever sees `AssessOutcome` / `ExtractorResult`.
#[async_trait::async_trait]
pub trait Extractor: Send + Sync {
    async fn assess(&self, checksum: &str, text: &str) -> AssessOutcome;

    async fn extract(
        &self,
        checksum: &str,
        text: &str,
        kind: ExtractionKind,
        hints: &ExtractionHints,
    ) -> ExtractorResult;
}

/// Aggregate outcome of one driver run.
#[derive(Debug, Default)]
pub struct ExtractionRunResult {
    pub processed: u32,
    pub skipped: u32,
    pub rate_limited: bool,
    pub errors: Vec<(String, String)>,
}

fn knowledge_path(kind: ExtractionKind, checksum: &str) -> String {
    let prefix = match kind {
        ExtractionKind::People => "people",
        ExtractionKind::Organizations => "organizations",
        ExtractionKind::Concepts => "concepts",
        ExtractionKind::Associations => "associations",
    };
    format!("knowledge/{prefix}/{checksum}.json")
}

/// Processes up to `batch_size` pending manifest entries: assesses each,
/// runs the people/organizations/concepts/associations extractors over
/// substantive ones in that order, and records manifest metadata. A single
/// `flush_all` commits the whole batch; on a rate limit the batch is flushed
/// immediately and the function returns with `rate_limited = true` so the
/// caller can exit 42 with partial progress already durable.
pub async fn run_extraction_batch(
    manifest: &ManifestStore,
    content_store: &Arc<dyn Store>,
    extractor: &dyn Extractor,
    batch_size: usize,
) -> Result<ExtractionRunResult, ExtractionError> {
    let pending: Vec<ManifestEntry> = manifest
        .pending_extraction()
        .await
        .into_iter()
        .take(batch_size)
        .collect();

    if pending.is_empty() {
        info!("no pending documents found for extraction");
        return Ok(ExtractionRunResult::default());
    }

    info!(count = pending.len(), "found pending documents");
    manifest.begin_batch().await;

    let mut result = ExtractionRunResult::default();

    for (i, entry) in pending.into_iter().enumerate() {
        info!(index = i + 1, checksum = %entry.checksum, "processing document");

        match process_one(manifest, content_store, extractor, entry).await? {
            EntryOutcome::Processed => result.processed += 1,
            EntryOutcome::Skipped => result.skipped += 1,
            EntryOutcome::Failed(checksum, reason) => result.errors.push((checksum, reason)),
            EntryOutcome::RateLimited => {
                warn!("rate limit encountered, flushing partial progress");
                manifest.flush().await?;
                result.rate_limited = true;
                return Ok(result);
            }
        }
    }

    manifest.flush_all().await?;
    info!(
        processed = result.processed,
        skipped = result.skipped,
        "batch extraction complete"
    );
    Ok(result)
}

enum EntryOutcome {
    Processed,
    Skipped,
    Failed(String, String),
    RateLimited,
}

async fn process_one(
    manifest: &ManifestStore,
    content_store: &Arc<dyn Store>,
    extractor: &dyn Extractor,
    mut entry: ManifestEntry,
) -> Result<EntryOutcome, ExtractionError> {
    let text = match content_store.get(&entry.content_path).await? {
        Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        None => {
            let reason = "content artifact missing from store".to_string();
            mark_extraction_error(&mut entry, &reason);
            let checksum = entry.checksum.clone();
            manifest.record_entry(entry).await?;
            return Ok(EntryOutcome::Failed(checksum, reason));
        }
    };

    let assessment = match extractor.assess(&entry.checksum, &text).await {
        AssessOutcome::Assessed(a) => a,
        AssessOutcome::RateLimited { .. } => {
            mark_rate_limited(&mut entry);
            manifest.record_entry(entry).await?;
            return Ok(EntryOutcome::RateLimited);
        }
        AssessOutcome::Failed(reason) => {
            mark_extraction_error(&mut entry, &reason);
            let checksum = entry.checksum.clone();
            manifest.record_entry(entry).await?;
            return Ok(EntryOutcome::Failed(checksum, reason));
        }
    };

    if !assessment.is_substantive {
        entry.metadata["extraction_skipped"] = serde_json::Value::Bool(true);
        entry.metadata["extraction_skipped_reason"] = serde_json::Value::String(assessment.reason);
        manifest.record_entry(entry).await?;
        return Ok(EntryOutcome::Skipped);
    }

    let checksum = entry.checksum.clone();
    let mut hints = ExtractionHints::default();

    for kind in [
        ExtractionKind::People,
        ExtractionKind::Organizations,
        ExtractionKind::Concepts,
        ExtractionKind::Associations,
    ] {
        match extractor.extract(&checksum, &text, kind, &hints).await {
            ExtractorResult::Ok(list) => {
                persist_entity_list(content_store, &checksum, kind, &list).await?;
                match &list {
                    EntityList::People(names) => hints.people = names.clone(),
                    EntityList::Organizations(names) => hints.organizations = names.clone(),
                    EntityList::Concepts(names) => hints.concepts = names.clone(),
                    EntityList::Associations(_) => {}
                }
            }
            ExtractorResult::RateLimited { .. } => {
                mark_rate_limited(&mut entry);
                manifest.record_entry(entry).await?;
                return Ok(EntryOutcome::RateLimited);
            }
            ExtractorResult::Failed(reason) => {
                mark_extraction_error(&mut entry, &reason);
                manifest.record_entry(entry).await?;
                return Ok(EntryOutcome::Failed(checksum, reason));
            }
        }
    }

    entry.metadata["extraction_complete"] = serde_json::Value::Bool(true);
    manifest.record_entry(entry).await?;
    Ok(EntryOutcome::Processed)
}

fn mark_rate_limited(entry: &mut ManifestEntry) {
    entry.metadata["extraction_rate_limited_at"] =
        serde_json::Value::String(Utc::now().to_rfc3339());
}

/// Records a failed extraction attempt purely in `metadata`, leaving
/// `status` and the terminal `extraction_complete`/`extraction_skipped`
/// markers untouched so the entry stays eligible for `pending_extraction`
/// on a later run (spec.md §8 scenario 6: resumability after failure).
fn mark_extraction_error(entry: &mut ManifestEntry, reason: &str) {
    entry.metadata["extraction_last_error"] = serde_json::Value::String(reason.to_string());
    entry.metadata["extraction_last_batch_run"] =
        serde_json::Value::String(Utc::now().to_rfc3339());
}

async fn persist_entity_list(
    store: &Arc<dyn Store>,
    checksum: &str,
    kind: ExtractionKind,
    list: &EntityList,
) -> Result<(), ExtractionError> {
    let path = knowledge_path(kind, checksum);
    let bytes = match list {
        EntityList::People(people) => serde_json::to_vec_pretty(&ExtractedPeople {
            source_checksum: checksum.to_string(),
            people: people.clone(),
            extracted_at: Utc::now(),
            metadata: serde_json::Value::Null,
        }),
        EntityList::Organizations(orgs) => serde_json::to_vec_pretty(&ExtractedOrganizations {
            source_checksum: checksum.to_string(),
            organizations: orgs.clone(),
            extracted_at: Utc::now(),
            metadata: serde_json::Value::Null,
        }),
        EntityList::Concepts(concepts) => serde_json::to_vec_pretty(&ExtractedConcepts {
            source_checksum: checksum.to_string(),
            concepts: concepts.clone(),
            extracted_at: Utc::now(),
            metadata: serde_json::Value::Null,
        }),
        EntityList::Associations(assocs) => serde_json::to_vec_pretty(&ExtractedAssociations {
            source_checksum: checksum.to_string(),
            associations: assocs.clone(),
            extracted_at: Utc::now(),
            metadata: serde_json::Value::Null,
        }),
    }
    .expect("entity list types always serialize");

    store.put(&path, &bytes).await?;
    Ok(())
}
