//! `gapsort-engine`: care-gap sheet consolidation and PDF matching.
//!
//! Pure engine crate: receives pre-loaded sheets and PDF bytes, returns
//! consolidated tables, match results, and archive plans. Text extraction
//! and archive encoding come in through the [`TextExtractor`] and
//! [`ArchiveWriter`] traits. No CLI or file-format dependencies.

pub mod catalog;
pub mod config;
pub mod consolidate;
pub mod error;
pub mod identity;
pub mod job;
pub mod matcher;
pub mod model;
pub mod normalize;
pub mod package;
mod pool;
pub mod store;

pub use catalog::CareGapCatalog;
pub use config::EngineConfig;
pub use consolidate::{consolidate, Consolidation};
pub use error::EngineError;
pub use identity::{IdentityCandidate, IdentityExtractor, TextExtractor};
pub use job::{
    append_sheets, sort_documents, AppendOptions, AppendOutput, AppendSource, JobFailure,
    JobPhase, SortJob, SortOutput, SortRequest,
};
pub use matcher::match_identity;
pub use model::{
    AuditEntry, AuditReason, CanonicalField, CanonicalRecord, FieldMapping, MasterTable,
    MatchOutcome, MatchPass, MatchResult, PdfDocument, RawRecord, RawTable, UnmatchedReason,
};
pub use normalize::{normalize, normalize_parallel};
pub use package::{plan_layout, ArchiveWriter, PackagePlan, ReportEntry};
pub use store::{MappingStore, MemoryStore};
