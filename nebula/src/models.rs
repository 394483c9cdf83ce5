use crate::{JobId, UtcDateTime};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Running,
    Completed,
    Failed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Running => "running",
            Status::Completed => "completed",
            Status::Failed => "failed",
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Status::Pending),
            "running" => Ok(Status::Running),
            "completed" => Ok(Status::Completed),
            "failed" => Ok(Status::Failed),
            other => Err(anyhow::anyhow!("unknown job status '{}'", other)),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(Priority::Low),
            "Medium" => Ok(Priority::Medium),
            "High" => Ok(Priority::High),
            other => Err(anyhow::anyhow!("unknown job priority '{}'", other)),
        }
    }
}

/// A stored job as exposed by the listing query.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub task_name: String,
    /// JSON text, validated on submission.
    pub payload: String,
    pub priority: Priority,
    pub status: Status,
    /// Simulated work in milliseconds.
    pub duration: u64,
    pub created_at: UtcDateTime,
    pub updated_at: UtcDateTime,
}

impl Job {
    /// Structured form of the payload. An empty payload reads as `{}`.
    pub fn parsed_payload(&self) -> serde_json::Result<serde_json::Value> {
        match self.payload.trim() {
            "" => Ok(serde_json::Value::Object(Default::default())),
            text => serde_json::from_str(text),
        }
    }
}

/// A submission as accepted by the dispatcher.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    pub task_name: String,
    pub payload: String,
    #[serde(default)]
    pub priority: Priority,
    /// Milliseconds of simulated work; absent or zero means the configured default.
    #[serde(default)]
    pub duration: Option<u64>,
}

impl NewJob {
    pub fn new(task_name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            payload: payload.into(),
            priority: Priority::default(),
            duration: None,
        }
    }

    pub fn with_priority(self, priority: Priority) -> Self {
        Self { priority, ..self }
    }

    pub fn with_duration(self, duration_ms: u64) -> Self {
        Self {
            duration: Some(duration_ms),
            ..self
        }
    }

    pub(crate) fn validate_payload(&self) -> serde_json::Result<()> {
        serde_json::from_str::<serde::de::IgnoredAny>(&self.payload).map(|_| ())
    }

    pub(crate) fn resolved_duration(&self, default_ms: u64) -> u64 {
        match self.duration {
            Some(ms) if ms > 0 => ms,
            _ => default_ms,
        }
    }
}

/// Body POSTed to the webhook sink once a job completes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEnvelope {
    pub job_id: JobId,
    pub task_name: String,
    pub priority: Priority,
    pub data: serde_json::Value,
    pub completed_at: UtcDateTime,
}

impl WebhookEnvelope {
    pub fn for_job(job: &Job, completed_at: UtcDateTime) -> serde_json::Result<Self> {
        Ok(Self {
            job_id: job.id,
            task_name: job.task_name.clone(),
            priority: job.priority,
            data: job.parsed_payload()?,
            completed_at,
        })
    }
}
