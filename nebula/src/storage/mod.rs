use crate::{
    models::{Job, NewJob, Status},
    JobId, UtcDateTime,
};

#[cfg(feature = "postgres")]
pub mod postgres;

pub mod memory;

#[cfg(feature = "postgres")]
pub use postgres::Postgres;

pub use memory::MemoryStore;


/// Outcome of an atomic attempt to move a job into `running`.
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    /// The job was moved to `running`; carries the updated record.
    Claimed(Job),
    AlreadyRunning,
    NotFound,
}

/// Durable table of job records.
///
/// Every method is an independent read or write; no transaction spans a run.
#[async_trait::async_trait]
pub trait JobStore: Sync + Send {
    /// Inserts a `pending` job with the given simulated duration and returns its id.
    async fn insert(&self, job: &NewJob, duration_ms: u64) -> anyhow::Result<JobId>;

    async fn get(&self, id: JobId) -> anyhow::Result<Option<Job>>;

    /// All jobs, newest first (ties broken by id, highest first).
    async fn list(&self) -> anyhow::Result<Vec<Job>>;

    /// Unconditional status write. Returns `false` when no job has this id.
    async fn set_status(&self, id: JobId, status: Status) -> anyhow::Result<bool>;

    /// Moves the job to `running` unless it is already `running`, as one atomic step.
    async fn claim(&self, id: JobId) -> anyhow::Result<Claim>;

    /// Conditional status write: only applied when the stored status equals `from`.
    async fn transition(&self, id: JobId, from: Status, to: Status) -> anyhow::Result<bool>;

    /// Ids of jobs that are `running` and were last updated before `before`.
    async fn running_since(&self, before: UtcDateTime) -> anyhow::Result<Vec<JobId>>;
}
