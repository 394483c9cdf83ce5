use crate::{models::Status, storage::JobStore, JobId};
use std::{sync::Arc, time::Duration};

/// Fails jobs that have been `running` for longer than `stale_after`.
///
/// A run whose final status write was lost leaves its job `running`; the
/// reaper is the only path that moves such a job on. `stale_after` has to be
/// longer than any job's simulated duration, or live runs get failed.
pub struct Reaper {
    store: Arc<dyn JobStore>,
    stale_after: Duration,
}

impl Reaper {
    pub fn new(store: Arc<dyn JobStore>, stale_after: Duration) -> Self {
        Self { store, stale_after }
    }

    pub async fn sweep(&self) -> anyhow::Result<Vec<JobId>> {
        let cutoff = chrono::Utc::now()
            .checked_sub_signed(chrono::Duration::from_std(self.stale_after)?)
            .ok_or_else(|| anyhow::anyhow!("stale threshold {:?} is out of range", self.stale_after))?;
        let mut reaped = Vec::new();

        for id in self.store.running_since(cutoff).await? {
            if self
                .store
                .transition(id, Status::Running, Status::Failed)
                .await?
            {
                tracing::warn!(job_id = %id, "Stale running job marked failed");
                reaped.push(id);
            }
        }

        Ok(reaped)
    }

    /// Sweeps every `every` until the task is aborted.
    pub async fn run(&self, every: Duration) {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = self.sweep().await {
                tracing::error!(error = ?e, "Stale job sweep failed");
            }
        }
    }
}
