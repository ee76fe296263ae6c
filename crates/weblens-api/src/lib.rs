//! HTTP API service for the Weblens analytics backend.
//!
//! Exposes the analysis, ingestion, metrics and insight engines behind an
//! axum router under `/api/v1`, plus health/readiness/liveness probes at
//! the root. Errors leave the service as the enveloped
//! `{"error": {code, message, details, timestamp}}` shape with codes from
//! the enumerated taxonomy.

pub mod config;
pub mod dto;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod routes;
pub mod state;

pub use config::AppConfig;
pub use errors::{ApiError, ApiResult};
pub use routes::build_router;
pub use state::AppState;
