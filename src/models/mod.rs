//! Core data model for the content-acquisition pipeline.
//!
//! These types are the typed records the rest of the crate passes around;
//! JSON (de)serialization happens once at the store boundary (SPEC_FULL §9's
//! re-architecture note on opaque, runtime-typed payloads).

mod check_result;
mod crawl_state;
mod knowledge;
mod manifest;
mod source;

pub use check_result::{CheckResult, CheckStatus, DetectionMethod};
pub use crawl_state::{CrawlLifecycle, CrawlState, DiscoveryMethod, UrlStatus};
pub use knowledge::{
    EntityAssociation, ExtractedAssociations, ExtractedConcepts, ExtractedOrganizations,
    ExtractedPeople,
};
pub use manifest::{Manifest, ManifestEntry, ManifestStatus, MANIFEST_VERSION};
pub use source::{hash12, CrawlScope, SourceEntry, SourceStatus, SourceType, UpdateFrequency};
