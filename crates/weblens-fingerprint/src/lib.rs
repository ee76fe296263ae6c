//! Technology fingerprinting.
//!
//! Classifies a page into a set of technologies from its HTTP response
//! headers and HTML body. The [`Fingerprint`] trait is the seam for plugging
//! in an external fingerprint database; [`PatternFingerprint`] is the
//! built-in ruleset covering the common CMS/framework/server signatures.

mod metrics;
mod ruleset;

pub use metrics::{DetectionMetrics, DetectionMetricsSnapshot};
pub use ruleset::PatternFingerprint;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Information about one detected technology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechInfo {
    pub categories: Vec<String>,
    /// Detection confidence, 0-100
    pub confidence: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpe: Option<String>,
}

/// A fingerprint source: given response headers and body, return the
/// detected technologies keyed by name.
pub trait Fingerprint: Send + Sync {
    fn matches(&self, headers: &HashMap<String, String>, body: &str) -> HashMap<String, TechInfo>;
}
