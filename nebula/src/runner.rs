use crate::{
    metrics,
    models::{Job, Status},
    storage::{Claim, JobStore},
    webhook::{self, DeliveryOutcome, Notifier},
    Config, ConflictPolicy, JobId, UtcDateTime,
};
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error("Job {0} not found")]
    NotFound(JobId),

    #[error("Job {0} is already running")]
    AlreadyRunning(JobId),

    /// The job left `running` while it was being worked on (e.g. a conflicting
    /// run request failed it). Nothing more is written for this run.
    #[error("Job {id} was moved to {status} while running")]
    Superseded { id: JobId, status: Status },

    #[error("Job store error: {0:?}")]
    Store(#[from] anyhow::Error),
}

impl RunError {
    fn label(&self) -> &'static str {
        match self {
            RunError::NotFound(_) => "not_found",
            RunError::AlreadyRunning(_) => "already_running",
            RunError::Superseded { .. } => "superseded",
            RunError::Store(_) => "store_error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub job_id: JobId,
    pub status: Status,
    pub started_at: UtcDateTime,
    pub completed_at: UtcDateTime,
    pub delivery: DeliveryOutcome,
}

/// Drives one job from its current state to `completed` or `failed`.
pub struct JobRunner {
    store: Arc<dyn JobStore>,
    notifier: Arc<dyn Notifier>,
    config: Arc<Config>,
}

impl JobRunner {
    pub fn new(store: Arc<dyn JobStore>, notifier: Arc<dyn Notifier>, config: Arc<Config>) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    /// Runs the job once: claim it, simulate the work, mark it completed and
    /// notify the webhook. Errors before completion mark the job `failed`
    /// (see [`ConflictPolicy`] for runs on a job that is already running).
    #[tracing::instrument(skip(self), fields(job_id = %id))]
    pub async fn run(&self, id: JobId) -> Result<RunReport, RunError> {
        let started_at = chrono::Utc::now();

        match self.execute(id, started_at).await {
            Ok(report) => {
                metrics::COUNTER
                    .job_runs
                    .with_label_values(&["completed"])
                    .inc();
                Ok(report)
            }
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "Job failed");
                metrics::COUNTER
                    .job_runs
                    .with_label_values(&[e.label()])
                    .inc();

                if self.should_mark_failed(&e) {
                    self.mark_failed(id, &e).await;
                }
                Err(e)
            }
        }
    }

    async fn execute(&self, id: JobId, started_at: UtcDateTime) -> Result<RunReport, RunError> {
        let job = match self.store.claim(id).await? {
            Claim::Claimed(job) => job,
            Claim::AlreadyRunning => return Err(RunError::AlreadyRunning(id)),
            Claim::NotFound => return Err(RunError::NotFound(id)),
        };

        tracing::info!(job_id = %id, task_name = %job.task_name, "Started");

        tokio::time::sleep(self.config.work_duration(job.duration)).await;

        if !self
            .store
            .transition(id, Status::Running, Status::Completed)
            .await?
        {
            return Err(self.superseded(id).await?);
        }
        let completed_at = chrono::Utc::now();
        tracing::info!(job_id = %id, "Completed");

        let job = Job {
            status: Status::Completed,
            ..job
        };
        let delivery = webhook::notify_completion(self.notifier.as_ref(), &job).await;

        Ok(RunReport {
            job_id: id,
            status: Status::Completed,
            started_at,
            completed_at,
            delivery,
        })
    }

    async fn superseded(&self, id: JobId) -> Result<RunError, RunError> {
        match self.store.get(id).await? {
            Some(job) => Ok(RunError::Superseded {
                id,
                status: job.status,
            }),
            None => Ok(RunError::NotFound(id)),
        }
    }

    fn should_mark_failed(&self, e: &RunError) -> bool {
        match e {
            RunError::NotFound(_) | RunError::Superseded { .. } => false,
            RunError::AlreadyRunning(_) => self.config.conflict_policy == ConflictPolicy::FailJob,
            RunError::Store(_) => true,
        }
    }

    async fn mark_failed(&self, id: JobId, cause: &RunError) {
        let written = match cause {
            // The run holding the claim may have completed since this request was refused.
            RunError::AlreadyRunning(_) => {
                self.store
                    .transition(id, Status::Running, Status::Failed)
                    .await
            }
            _ => self.store.set_status(id, Status::Failed).await,
        };

        // If this write fails too the job stays `running` until the reaper (if enabled) fails it.
        match written {
            Ok(true) => {}
            Ok(false) => tracing::warn!(job_id = %id, "Job was no longer running, not marked failed"),
            Err(e) => tracing::error!(
                job_id = %id,
                error = ?e,
                "Could not mark job failed, it may remain running"
            ),
        }
    }
}
