//! Repository interfaces and adapters.
//!
//! Every service in the workspace talks to storage through the async traits
//! in [`repository`]; the in-memory adapters in [`memory`] back the default
//! server wiring and the test suites. A durable backend plugs in by
//! implementing the same traits.

mod error;
pub mod memory;
pub mod repository;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryStore;
pub use repository::{
    AnalysisRepository, DailyMetricsRepository, EventFilter, EventRepository, InsightFilter,
    InsightRepository, SessionFilter, SessionRepository, WorkspaceRepository,
};
