//! Client-side holding area for submissions that should happen later.
//!
//! Every entry carries a countdown in seconds. Each [`DelayQueue::tick`]
//! decrements all countdowns by one and forwards the entries that reached zero
//! to the dispatcher. Entries live only in memory: a restart loses them.
use crate::{dispatcher::SubmitError, metrics, models::NewJob, Dispatcher, JobId};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::Mutex;

/// Where expired entries are forwarded.
#[async_trait::async_trait]
pub trait Submit: Sync + Send {
    async fn submit(&self, job: NewJob) -> Result<JobId, SubmitError>;
}

#[async_trait::async_trait]
impl Submit for Dispatcher {
    async fn submit(&self, job: NewJob) -> Result<JobId, SubmitError> {
        Dispatcher::submit(self, job).await
    }
}

#[derive(Debug, Clone)]
pub struct ScheduledEntry {
    /// Seconds until the entry is forwarded.
    pub remaining: u64,
    pub job: NewJob,
}

/// What the queue did with a schedule request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scheduled {
    /// Held; forwarded after `remaining` ticks.
    Held { remaining: u64 },
    /// Zero delay, submitted right away.
    Submitted(JobId),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingEntry {
    pub task_name: String,
    pub remaining: u64,
}

pub struct DelayQueue<S> {
    sink: S,
    entries: Mutex<Vec<ScheduledEntry>>,
}

impl<S: Submit> DelayQueue<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Submits right away when `delay_secs` is zero. Otherwise the payload is
    /// checked now and the entry is held.
    pub async fn schedule(&self, delay_secs: u64, job: NewJob) -> Result<Scheduled, SubmitError> {
        if delay_secs == 0 {
            return Ok(Scheduled::Submitted(self.sink.submit(job).await?));
        }

        if let Err(e) = job.validate_payload() {
            tracing::info!(task_name = %job.task_name, error = %e, "Rejected delayed job with invalid payload");
            metrics::COUNTER.jobs_rejected.inc();
            return Err(e.into());
        }

        tracing::info!(task_name = %job.task_name, delay_secs, "Job scheduled");
        self.entries.lock().await.push(ScheduledEntry {
            remaining: delay_secs,
            job,
        });

        Ok(Scheduled::Held {
            remaining: delay_secs,
        })
    }

    /// Advances every countdown by one second and forwards the entries that expired.
    pub async fn tick(&self) -> Vec<Result<JobId, SubmitError>> {
        let due = {
            let mut entries = self.entries.lock().await;
            for entry in entries.iter_mut() {
                entry.remaining = entry.remaining.saturating_sub(1);
            }

            let (due, held): (Vec<_>, Vec<_>) =
                entries.drain(..).partition(|entry| entry.remaining == 0);
            *entries = held;
            due
        };

        let mut forwarded = Vec::with_capacity(due.len());
        for entry in due {
            let task_name = entry.job.task_name.clone();
            let result = self.sink.submit(entry.job).await;
            match &result {
                Ok(id) => tracing::info!(job_id = %id, %task_name, "Scheduled job submitted"),
                Err(e) => tracing::warn!(%task_name, error = %e, "Scheduled job dropped"),
            }
            forwarded.push(result);
        }

        forwarded
    }

    pub async fn pending(&self) -> Vec<PendingEntry> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|entry| PendingEntry {
                task_name: entry.job.task_name.clone(),
                remaining: entry.remaining,
            })
            .collect()
    }

    /// Ticks forever at `period`; stop it by aborting the task.
    pub async fn run(&self, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            interval.tick().await;
            self.tick().await;
        }
    }
}
