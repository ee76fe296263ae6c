//! Analysis orchestrator.
//!
//! Single-URL analysis runs fetch → fingerprint → enabled analyzers →
//! persist. The batch variant drains a shared work queue with a bounded
//! worker pool; result order is not guaranteed to match input order.

use crate::accessibility::AccessibilityAnalyzer;
use crate::performance::PerformanceAnalyzer;
use crate::security::SecurityAnalyzer;
use crate::seo::SeoAnalyzer;
use crate::technology::TechnologyAnalyzer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use url::Url;
use uuid::Uuid;
use weblens_fetch::{FetchError, Fetcher};
use weblens_storage::{AnalysisRepository, StorageError};
use weblens_types::{AnalysisResult, DimensionMap};

/// Upper bound on batch workers regardless of batch size.
pub const MAX_CONCURRENCY: usize = 10;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid url: {url}")]
    InvalidUrl { url: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("analysis cancelled")]
    Cancelled,
}

/// Per-request analyzer toggles. Everything is on by default; the
/// technology dimension always runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOptions {
    #[serde(default = "default_true")]
    pub include_performance: bool,
    #[serde(default = "default_true")]
    pub include_seo: bool,
    #[serde(default = "default_true")]
    pub include_accessibility: bool,
    #[serde(default = "default_true")]
    pub include_security: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            include_performance: true,
            include_seo: true,
            include_accessibility: true,
            include_security: true,
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub url: String,
    pub workspace_id: Uuid,
    pub session_id: Option<Uuid>,
    pub options: AnalysisOptions,
}

#[derive(Debug, Clone)]
pub struct BatchAnalysisRequest {
    pub urls: Vec<String>,
    pub workspace_id: Uuid,
    pub options: AnalysisOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Completed,
    Partial,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedUrl {
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct BatchAnalysisResult {
    pub batch_id: Uuid,
    pub status: BatchStatus,
    pub results: Vec<AnalysisResult>,
    pub failed_urls: Vec<FailedUrl>,
    pub progress: BatchProgress,
}

/// Runs the full analysis pipeline and persists the outcome.
#[derive(Clone)]
pub struct AnalysisEngine {
    fetcher: Fetcher,
    technology: TechnologyAnalyzer,
    analyses: Arc<dyn AnalysisRepository>,
    default_user_agent: String,
    max_concurrency: usize,
}

impl AnalysisEngine {
    pub fn new(
        fetcher: Fetcher,
        technology: TechnologyAnalyzer,
        analyses: Arc<dyn AnalysisRepository>,
        default_user_agent: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            technology,
            analyses,
            default_user_agent: default_user_agent.into(),
            max_concurrency: MAX_CONCURRENCY,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Analyze a single URL. A failing optional analyzer leaves its
    /// dimension map empty; a failing fetch fails the analysis and nothing
    /// is persisted.
    #[instrument(skip(self, request, cancel), fields(url = %request.url, workspace_id = %request.workspace_id))]
    pub async fn analyze(
        &self,
        request: AnalysisRequest,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, AnalysisError> {
        let parsed = Url::parse(&request.url).map_err(|_| AnalysisError::InvalidUrl {
            url: request.url.clone(),
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(AnalysisError::InvalidUrl {
                url: request.url.clone(),
            });
        }

        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }

        let user_agent = request
            .options
            .user_agent
            .clone()
            .unwrap_or_else(|| self.default_user_agent.clone());

        let page = tokio::select! {
            _ = cancel.cancelled() => return Err(AnalysisError::Cancelled),
            fetched = self.fetcher.fetch(&request.url, Some(&user_agent), None) => fetched?,
        };

        let mut result = AnalysisResult::new(request.workspace_id, &request.url);
        result.session_id = request.session_id;

        result.technologies =
            dimension_or_empty("technology", self.technology.dimension_map(&page, &user_agent));
        if request.options.include_performance {
            result.performance_metrics = dimension_or_empty(
                "performance",
                PerformanceAnalyzer::dimension_map(&page, &user_agent),
            );
        }
        if request.options.include_seo {
            result.seo_metrics =
                dimension_or_empty("seo", SeoAnalyzer::dimension_map(&page, &user_agent));
        }
        if request.options.include_accessibility {
            result.accessibility_metrics = dimension_or_empty(
                "accessibility",
                AccessibilityAnalyzer::dimension_map(&page, &user_agent),
            );
        }
        if request.options.include_security {
            result.security_metrics = dimension_or_empty(
                "security",
                SecurityAnalyzer::dimension_map(&page, &user_agent),
            );
        }

        // Cancellation between fetch and persist: nothing partial hits
        // storage.
        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }

        let stored = self.analyses.create(result).await?;
        info!(analysis_id = %stored.id, status = page.status, "analysis persisted");
        Ok(stored)
    }

    /// Analyze a batch of URLs through a bounded worker pool.
    ///
    /// Returns every already-persisted result even when cancelled midway.
    #[instrument(skip(self, request, cancel), fields(urls = request.urls.len(), workspace_id = %request.workspace_id))]
    pub async fn analyze_batch(
        &self,
        request: BatchAnalysisRequest,
        cancel: &CancellationToken,
    ) -> BatchAnalysisResult {
        let batch_id = Uuid::new_v4();
        let total = request.urls.len();
        if total == 0 {
            return BatchAnalysisResult {
                batch_id,
                status: BatchStatus::Completed,
                results: Vec::new(),
                failed_urls: Vec::new(),
                progress: BatchProgress {
                    completed: 0,
                    total: 0,
                },
            };
        }

        let workers = total.min(self.max_concurrency);
        let (work_tx, work_rx) = mpsc::channel::<String>(total);
        for url in &request.urls {
            // Capacity equals the batch size, so these sends never block.
            let _ = work_tx.send(url.clone()).await;
        }
        drop(work_tx);
        let work_rx = Arc::new(Mutex::new(work_rx));

        let (result_tx, mut result_rx) =
            mpsc::channel::<(String, Result<AnalysisResult, AnalysisError>)>(total);

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let engine = self.clone();
            let work_rx = work_rx.clone();
            let result_tx = result_tx.clone();
            let cancel = cancel.clone();
            let workspace_id = request.workspace_id;
            let options = request.options.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    let url = {
                        let mut queue = work_rx.lock().await;
                        tokio::select! {
                            _ = cancel.cancelled() => None,
                            url = queue.recv() => url,
                        }
                    };
                    let Some(url) = url else { break };

                    let outcome = engine
                        .analyze(
                            AnalysisRequest {
                                url: url.clone(),
                                workspace_id,
                                session_id: None,
                                options: options.clone(),
                            },
                            &cancel,
                        )
                        .await;
                    let _ = result_tx.send((url, outcome)).await;

                    if cancel.is_cancelled() {
                        break;
                    }
                }
            }));
        }
        drop(result_tx);

        let mut results = Vec::new();
        let mut failed_urls = Vec::new();
        while let Some((url, outcome)) = result_rx.recv().await {
            match outcome {
                Ok(result) => results.push(result),
                // Cancelled work is neither a success nor a failed URL.
                Err(AnalysisError::Cancelled) => {}
                Err(error) => {
                    warn!(url = %url, error = %error, "batch url failed");
                    failed_urls.push(FailedUrl {
                        url,
                        error: error.to_string(),
                    });
                }
            }
        }
        for handle in handles {
            let _ = handle.await;
        }

        let processed = results.len() + failed_urls.len();
        let status = if cancel.is_cancelled() && processed < total {
            BatchStatus::Cancelled
        } else if failed_urls.is_empty() {
            BatchStatus::Completed
        } else if results.is_empty() {
            BatchStatus::Failed
        } else {
            BatchStatus::Partial
        };

        info!(
            batch_id = %batch_id,
            ?status,
            succeeded = results.len(),
            failed = failed_urls.len(),
            "batch analysis finished"
        );

        BatchAnalysisResult {
            batch_id,
            status,
            results,
            failed_urls,
            progress: BatchProgress {
                completed: processed,
                total,
            },
        }
    }
}

fn dimension_or_empty(
    analyzer: &str,
    outcome: Result<DimensionMap, serde_json::Error>,
) -> DimensionMap {
    match outcome {
        Ok(map) => map,
        Err(error) => {
            warn!(analyzer = analyzer, error = %error, "analyzer failed; dimension left empty");
            DimensionMap::new()
        }
    }
}
