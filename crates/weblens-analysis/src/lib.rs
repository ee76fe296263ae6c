//! Dimension analyzers and the analysis orchestrator.
//!
//! Analyzers are pure functions over the fetched page: no network I/O, no
//! shared mutable state beyond the process-wide detection counters. The
//! orchestrator runs the fetch, the fingerprinter and every enabled analyzer,
//! assembles an [`weblens_types::AnalysisResult`] and persists it. A failing
//! optional analyzer degrades to an empty dimension map; a failing fetch
//! fails the whole analysis.

pub mod accessibility;
pub mod orchestrator;
pub mod performance;
pub mod report;
pub mod security;
pub mod seo;
pub mod technology;

pub use orchestrator::{
    AnalysisEngine, AnalysisError, AnalysisOptions, AnalysisRequest, BatchAnalysisRequest,
    BatchAnalysisResult, BatchProgress, BatchStatus, FailedUrl,
};
pub use report::{AnalyzerMetadata, Rating};
