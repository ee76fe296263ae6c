use crate::registry::InsightService;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use weblens_types::Insight;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

/// One insight-generation job. Lives only in memory; finished jobs are
/// garbage-collected by [`InsightJobManager::cleanup`].
#[derive(Debug, Clone, Serialize)]
pub struct InsightJob {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub status: JobStatus,
    /// 0-100
    pub progress: u8,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub results: Vec<Insight>,
}

/// Dispatches insight generation to background tasks and tracks them in a
/// concurrent job table.
#[derive(Clone)]
pub struct InsightJobManager {
    jobs: Arc<DashMap<Uuid, InsightJob>>,
    service: InsightService,
}

impl InsightJobManager {
    pub fn new(service: InsightService) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            service,
        }
    }

    /// Create a job and dispatch it immediately. The returned snapshot is
    /// the job in its queued state.
    #[instrument(skip(self, cancel), fields(workspace_id = %workspace_id))]
    pub fn start(&self, workspace_id: Uuid, cancel: CancellationToken) -> InsightJob {
        let job = InsightJob {
            id: Uuid::new_v4(),
            workspace_id,
            status: JobStatus::Queued,
            progress: 0,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
            results: Vec::new(),
        };
        let job_id = job.id;
        self.jobs.insert(job_id, job.clone());

        let jobs = self.jobs.clone();
        let service = self.service.clone();
        tokio::spawn(async move {
            update(&jobs, job_id, |job| {
                job.status = JobStatus::Running;
                job.progress = 10;
            });

            let outcome = tokio::select! {
                _ = cancel.cancelled() => Err("cancelled".to_string()),
                generated = service.generate(workspace_id, &cancel) => {
                    generated.map_err(|e| e.to_string())
                }
            };

            match outcome {
                Ok(results) => {
                    info!(%job_id, insights = results.len(), "insight job completed");
                    update(&jobs, job_id, |job| {
                        job.status = JobStatus::Completed;
                        job.progress = 100;
                        job.completed_at = Some(Utc::now());
                        job.results = results;
                    });
                }
                Err(error) => {
                    warn!(%job_id, %error, "insight job failed");
                    update(&jobs, job_id, |job| {
                        job.status = JobStatus::Failed;
                        job.progress = 100;
                        job.completed_at = Some(Utc::now());
                        job.error = Some(error);
                    });
                }
            }
        });

        job
    }

    pub fn get(&self, job_id: Uuid) -> Option<InsightJob> {
        self.jobs.get(&job_id).map(|entry| entry.value().clone())
    }

    pub fn list_by_workspace(&self, workspace_id: Uuid) -> Vec<InsightJob> {
        let mut jobs: Vec<InsightJob> = self
            .jobs
            .iter()
            .filter(|entry| entry.value().workspace_id == workspace_id)
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        jobs
    }

    /// Drop completed and failed jobs whose completion is older than the
    /// threshold. Returns the number removed.
    pub fn cleanup(&self, older_than: Duration) -> usize {
        let cutoff = Utc::now() - older_than;
        let before = self.jobs.len();
        self.jobs.retain(|_, job| {
            !matches!(job.status, JobStatus::Completed | JobStatus::Failed)
                || job.completed_at.map_or(true, |done| done > cutoff)
        });
        before - self.jobs.len()
    }
}

fn update(jobs: &DashMap<Uuid, InsightJob>, job_id: Uuid, apply: impl FnOnce(&mut InsightJob)) {
    if let Some(mut entry) = jobs.get_mut(&job_id) {
        apply(entry.value_mut());
    }
}
