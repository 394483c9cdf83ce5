//! Nebula: a minimal job dispatcher.
//!
//! Jobs are submitted through the [`Dispatcher`], persisted in a
//! [`storage::JobStore`] and executed by the [`runner::JobRunner`], which
//! simulates work, records the status transitions and notifies a webhook on
//! completion. The [`delay_queue::DelayQueue`] holds submissions until their
//! countdown expires.
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr, time::Duration};

pub use anyhow;
pub use dispatcher::{Ack, AckError, Dispatcher, SubmitError};
pub use models::{Job, NewJob, Priority, Status, WebhookEnvelope};
pub use runner::{RunError, RunReport};
pub use serde_json;

pub mod delay_queue;
pub mod dispatcher;
mod metrics;
pub mod models;
pub mod reaper;
pub mod runner;
pub mod storage;
pub mod webhook;

pub type UtcDateTime = chrono::DateTime<chrono::Utc>;

/// Simulated work applied when a job does not specify a duration (or asks for zero).
pub const DEFAULT_DURATION_MS: u64 = 3000;

/// Upper bound for a single webhook request.
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What to do with a job when a run is requested while it is already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// The conflicting request fails with `AlreadyRunning` and drives the job to `failed`.
    #[default]
    FailJob,
    /// The conflicting request fails with `AlreadyRunning`; the job is left alone.
    Ignore,
}

impl FromStr for ConflictPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" | "fail-job" | "fail_job" => Ok(ConflictPolicy::FailJob),
            "ignore" => Ok(ConflictPolicy::Ignore),
            other => Err(anyhow::anyhow!("unknown conflict policy '{}'", other)),
        }
    }
}

#[derive(typed_builder::TypedBuilder, Debug, Clone)]
pub struct Config {
    /// Endpoint notified when a job completes. Delivery is skipped when unset.
    #[builder(default, setter(into))]
    pub webhook_url: Option<String>,

    #[builder(default = DEFAULT_WEBHOOK_TIMEOUT)]
    pub webhook_timeout: Duration,

    #[builder(default = DEFAULT_DURATION_MS)]
    pub default_duration_ms: u64,

    #[builder(default)]
    pub conflict_policy: ConflictPolicy,

    /// Jobs left `running` for longer than this are failed by the [`reaper::Reaper`].
    #[builder(default, setter(into))]
    pub stale_after: Option<Duration>,

    /// Period of the delay queue countdown.
    #[builder(default = Duration::from_secs(1))]
    pub tick_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config::builder().build()
    }
}

impl Config {
    /// Resolves the simulated work interval for a stored duration.
    pub fn work_duration(&self, duration_ms: u64) -> Duration {
        match duration_ms {
            0 => Duration::from_millis(self.default_duration_ms),
            ms => Duration::from_millis(ms),
        }
    }
}

/// Prometheus text exposition of the dispatcher counters.
pub fn metrics_output() -> anyhow::Result<String> {
    metrics::COUNTER.output()
}
