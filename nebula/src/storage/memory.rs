use super::{Claim, JobStore};
use crate::{
    models::{Job, NewJob, Status},
    JobId, UtcDateTime,
};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// In-process store, lost when the process ends.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    last_id: i64,
    jobs: BTreeMap<JobId, Job>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl JobStore for MemoryStore {
    async fn insert(&self, job: &NewJob, duration_ms: u64) -> anyhow::Result<JobId> {
        let mut inner = self.inner.write().await;
        inner.last_id += 1;

        let id = JobId(inner.last_id);
        let now = chrono::Utc::now();
        inner.jobs.insert(
            id,
            Job {
                id,
                task_name: job.task_name.clone(),
                payload: job.payload.clone(),
                priority: job.priority,
                status: Status::Pending,
                duration: duration_ms,
                created_at: now,
                updated_at: now,
            },
        );

        Ok(id)
    }

    async fn get(&self, id: JobId) -> anyhow::Result<Option<Job>> {
        Ok(self.inner.read().await.jobs.get(&id).cloned())
    }

    async fn list(&self) -> anyhow::Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self.inner.read().await.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(jobs)
    }

    async fn set_status(&self, id: JobId, status: Status) -> anyhow::Result<bool> {
        match self.inner.write().await.jobs.get_mut(&id) {
            Some(job) => {
                job.status = status;
                job.updated_at = chrono::Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn claim(&self, id: JobId) -> anyhow::Result<Claim> {
        let mut inner = self.inner.write().await;
        let claim = match inner.jobs.get_mut(&id) {
            None => Claim::NotFound,
            Some(job) if job.status == Status::Running => Claim::AlreadyRunning,
            Some(job) => {
                job.status = Status::Running;
                job.updated_at = chrono::Utc::now();
                Claim::Claimed(job.clone())
            }
        };

        Ok(claim)
    }

    async fn transition(&self, id: JobId, from: Status, to: Status) -> anyhow::Result<bool> {
        match self.inner.write().await.jobs.get_mut(&id) {
            Some(job) if job.status == from => {
                job.status = to;
                job.updated_at = chrono::Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn running_since(&self, before: UtcDateTime) -> anyhow::Result<Vec<JobId>> {
        Ok(self
            .inner
            .read()
            .await
            .jobs
            .values()
            .filter(|job| job.status == Status::Running && job.updated_at < before)
            .map(|job| job.id)
            .collect())
    }
}
