//! Technology analyzer.
//!
//! Thin wrapper over the fingerprinter: groups detections by category,
//! counts them, and feeds the process-wide detection counters.

use crate::report::{to_dimension_map, AnalyzerMetadata};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use weblens_fetch::FetchedPage;
use weblens_fingerprint::{DetectionMetrics, Fingerprint, TechInfo};
use weblens_types::DimensionMap;

#[derive(Debug, Clone, Serialize)]
pub struct TechnologyReport {
    /// Detected technologies keyed by name
    pub detected: HashMap<String, TechInfo>,
    /// Category name to the technologies in it
    pub categories: HashMap<String, Vec<String>>,
    pub total_technologies: usize,
    pub unique_categories: usize,
    pub metadata: AnalyzerMetadata,
}

#[derive(Clone)]
pub struct TechnologyAnalyzer {
    fingerprint: Arc<dyn Fingerprint>,
    metrics: Arc<DetectionMetrics>,
}

impl TechnologyAnalyzer {
    pub fn new(fingerprint: Arc<dyn Fingerprint>, metrics: Arc<DetectionMetrics>) -> Self {
        Self {
            fingerprint,
            metrics,
        }
    }

    pub fn analyze(&self, page: &FetchedPage, user_agent: &str) -> TechnologyReport {
        let started = Instant::now();
        let detected = self.fingerprint.matches(&page.headers, &page.body);

        let mut categories: HashMap<String, Vec<String>> = HashMap::new();
        for (name, info) in &detected {
            for category in &info.categories {
                categories
                    .entry(category.clone())
                    .or_default()
                    .push(name.clone());
            }
        }
        for techs in categories.values_mut() {
            techs.sort();
        }

        self.metrics.record(detected.len(), started.elapsed());

        TechnologyReport {
            total_technologies: detected.len(),
            unique_categories: categories.len(),
            detected,
            categories,
            metadata: AnalyzerMetadata::since(started, &page.url, user_agent),
        }
    }

    pub fn dimension_map(
        &self,
        page: &FetchedPage,
        user_agent: &str,
    ) -> Result<DimensionMap, serde_json::Error> {
        to_dimension_map(&self.analyze(page, user_agent))
    }
}
