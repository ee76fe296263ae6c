//! Insight rule engine and job manager.
//!
//! Rules are pluggable units implementing [`Rule`]; the [`RuleRegistry`]
//! executes them over a workspace's recent data, deduplicates the outcome by
//! (workspace, type, title) and hands back a priority-sorted list. The
//! [`InsightJobManager`] wraps generation in background jobs with progress,
//! cancellation and TTL-based cleanup.

mod jobs;
mod registry;
pub mod rules;
mod score;

pub use jobs::{InsightJob, InsightJobManager, JobStatus};
pub use registry::{AnalysisData, InsightService, RegistryError, Rule, RuleRegistry};
pub use score::{calculate_effort_score, calculate_impact_score, Complexity};
