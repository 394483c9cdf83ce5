use crate::{
    metrics,
    models::{Job, NewJob},
    runner::{JobRunner, RunError, RunReport},
    storage::JobStore,
    webhook::{Notifier, WebhookNotifier},
    Config, JobId,
};
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(thiserror::Error, Debug)]
pub enum SubmitError {
    #[error("Invalid JSON payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("Job store error: {0:?}")]
    Store(#[from] anyhow::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum AckError {
    #[error(transparent)]
    Run(#[from] RunError),

    #[error("Run task did not finish: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Acknowledgement of a run request. The run proceeds whether or not this is kept.
#[derive(Debug)]
pub struct Ack {
    pub job_id: JobId,
    handle: JoinHandle<Result<RunReport, RunError>>,
}

impl Ack {
    /// Waits for the detached run to finish.
    pub async fn finished(self) -> Result<RunReport, AckError> {
        Ok(self.handle.await??)
    }
}

/// Boundary used by HTTP handlers and the delay queue to create and run jobs.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn JobStore>,
    runner: Arc<JobRunner>,
    config: Arc<Config>,
}

impl Dispatcher {
    /// Dispatcher notifying the webhook URL from `config` over HTTP.
    pub fn new(config: Config, store: Box<dyn JobStore>) -> anyhow::Result<Self> {
        let notifier = WebhookNotifier::new(config.webhook_url.clone(), config.webhook_timeout)?;

        Ok(Self::with_notifier(config, store.into(), Arc::new(notifier)))
    }

    pub fn with_notifier(
        config: Config,
        store: Arc<dyn JobStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let config = Arc::new(config);
        let runner = JobRunner::new(store.clone(), notifier, config.clone());

        Self {
            store,
            runner: Arc::new(runner),
            config,
        }
    }

    pub fn store(&self) -> Arc<dyn JobStore> {
        self.store.clone()
    }

    /// Validates the payload and stores the job as `pending`.
    #[tracing::instrument(skip(self, job), fields(task_name = %job.task_name))]
    pub async fn submit(&self, job: NewJob) -> Result<JobId, SubmitError> {
        if let Err(e) = job.validate_payload() {
            tracing::info!(error = %e, "Rejected job with invalid payload");
            metrics::COUNTER.jobs_rejected.inc();
            return Err(e.into());
        }

        let duration = job.resolved_duration(self.config.default_duration_ms);
        let id = self.store.insert(&job, duration).await?;

        metrics::COUNTER.jobs_submitted.inc();
        tracing::info!(job_id = %id, priority = %job.priority, duration, "Job created");

        Ok(id)
    }

    /// Starts the job on its own task and returns at once.
    /// Failures are only visible through the job's status and the logs.
    pub fn trigger(&self, id: JobId) -> Ack {
        let runner = self.runner.clone();
        let handle = tokio::spawn(async move { runner.run(id).await });

        tracing::debug!(job_id = %id, "Execution started");
        Ack { job_id: id, handle }
    }

    /// Runs the job on the caller's task and returns the result.
    pub async fn run(&self, id: JobId) -> Result<RunReport, RunError> {
        self.runner.run(id).await
    }

    /// All jobs, newest first.
    pub async fn list(&self) -> anyhow::Result<Vec<Job>> {
        self.store.list().await
    }

    pub async fn get(&self, id: JobId) -> anyhow::Result<Option<Job>> {
        self.store.get(id).await
    }
}
