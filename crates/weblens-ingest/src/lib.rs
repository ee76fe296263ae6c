//! Event and session ingestion.
//!
//! Validates and deduplicates incoming event batches, creates sessions on
//! first sight, persists events in bulk and maintains the denormalized
//! session counters. Admission is controlled by a per-workspace token
//! bucket; above the budget the whole batch is rejected before storage.

mod rate_limit;
mod service;

pub use rate_limit::WorkspaceRateLimiter;
pub use service::{EventIngestService, IncomingEvent, IngestError, TrackEventsRequest, TrackOutcome};
