//! Best-effort, at-most-once completion notifications.
//!
//! A completed job produces one [`WebhookEnvelope`] POSTed to the configured
//! endpoint. Whatever happens on the wire is reported as a [`DeliveryOutcome`],
//! logged and counted; it never changes the job's stored status.
use crate::{metrics, models::Job, WebhookEnvelope};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The endpoint answered, with any status code.
    Delivered { status: u16 },
    /// No answer: connection refused, reset, or the timeout elapsed.
    Unreachable { reason: String },
    /// The request could not be built locally.
    LocalError { reason: String },
    /// No endpoint configured.
    Skipped,
}

impl DeliveryOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered { status } if (200..300).contains(status) => "delivered",
            DeliveryOutcome::Delivered { .. } => "error_response",
            DeliveryOutcome::Unreachable { .. } => "unreachable",
            DeliveryOutcome::LocalError { .. } => "local_error",
            DeliveryOutcome::Skipped => "skipped",
        }
    }
}

/// Webhook sink seam. The HTTP implementation is [`WebhookNotifier`].
#[async_trait::async_trait]
pub trait Notifier: Sync + Send {
    async fn deliver(&self, envelope: &WebhookEnvelope) -> DeliveryOutcome;
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client, url })
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, envelope: &WebhookEnvelope) -> DeliveryOutcome {
        let url = match &self.url {
            Some(url) => url,
            None => return DeliveryOutcome::Skipped,
        };

        match self.client.post(url).json(envelope).send().await {
            Ok(response) => DeliveryOutcome::Delivered {
                status: response.status().as_u16(),
            },
            Err(e) if e.is_builder() => DeliveryOutcome::LocalError {
                reason: e.to_string(),
            },
            Err(e) => DeliveryOutcome::Unreachable {
                reason: e.to_string(),
            },
        }
    }
}

/// Builds the envelope for a completed job, delivers it once and logs the outcome.
pub async fn notify_completion(notifier: &dyn Notifier, job: &Job) -> DeliveryOutcome {
    tracing::info!(job_id = %job.id, "Triggering webhook");

    let outcome = match WebhookEnvelope::for_job(job, chrono::Utc::now()) {
        Ok(envelope) => notifier.deliver(&envelope).await,
        Err(e) => DeliveryOutcome::LocalError {
            reason: format!("payload is not valid JSON: {}", e),
        },
    };

    match &outcome {
        DeliveryOutcome::Delivered { status } if (200..300).contains(status) => {
            tracing::info!(job_id = %job.id, status, "Webhook sent")
        }
        DeliveryOutcome::Delivered { status } => {
            tracing::warn!(job_id = %job.id, status, "Webhook answered with an error status")
        }
        DeliveryOutcome::Unreachable { reason } => {
            tracing::warn!(job_id = %job.id, %reason, "Webhook endpoint unreachable")
        }
        DeliveryOutcome::LocalError { reason } => {
            tracing::error!(job_id = %job.id, %reason, "Webhook request could not be built")
        }
        DeliveryOutcome::Skipped => {
            tracing::debug!(job_id = %job.id, "No webhook configured")
        }
    }

    metrics::COUNTER
        .webhook_deliveries
        .with_label_values(&[outcome.label()])
        .inc();

    outcome
}
