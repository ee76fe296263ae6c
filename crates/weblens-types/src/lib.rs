//! Shared domain types for the Weblens analytics backend.
//!
//! Every entity in the system is owned by exactly one [`Workspace`]. The
//! analysis dimensions (`technologies`, `performance_metrics`, ...) are kept
//! as free-form JSON maps so they round-trip through the wire format without
//! loss; analyzers populate them with their own structured payloads.

pub mod entities;
pub mod event;
pub mod insight;
pub mod metrics;

pub use entities::{AnalysisResult, DimensionMap, Session, Workspace};
pub use event::{Event, EventType, EventValidationError, validate_event, MAX_EVENT_BATCH};
pub use insight::{Insight, InsightPriority, InsightStatus, InsightType};
pub use metrics::DailyMetrics;
