//! HTTP fetch layer.
//!
//! Fetches a target URL with controlled headers, a per-request deadline and
//! a body size cap, and records wall-clock timings for the downstream
//! performance analyzer. Non-2xx statuses are returned to the caller as part
//! of the page, not as errors; only transport-level failures are errors.

mod fetcher;

pub use fetcher::{FetchError, FetchedPage, Fetcher, FetcherConfig, FetchTimings};
