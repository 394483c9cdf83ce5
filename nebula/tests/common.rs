#![allow(dead_code)]

use nebula::{
    storage::MemoryStore,
    webhook::{DeliveryOutcome, Notifier},
    Config, ConflictPolicy, Dispatcher, JobId, Status, WebhookEnvelope,
};
use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};
use tokio::sync::Mutex;

pub struct Delivery {
    pub received_at: nebula::UtcDateTime,
    pub envelope: WebhookEnvelope,
}

/// Webhook sink that records every envelope and answers with a fixed outcome.
pub struct RecordingNotifier {
    pub deliveries: Mutex<Vec<Delivery>>,
    outcome: DeliveryOutcome,
}

impl RecordingNotifier {
    pub fn answering(outcome: DeliveryOutcome) -> Arc<Self> {
        Arc::new(Self {
            deliveries: Mutex::new(Vec::new()),
            outcome,
        })
    }

    pub async fn count_for(&self, id: JobId) -> usize {
        self.deliveries
            .lock()
            .await
            .iter()
            .filter(|d| d.envelope.job_id == id)
            .count()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, envelope: &WebhookEnvelope) -> DeliveryOutcome {
        self.deliveries.lock().await.push(Delivery {
            received_at: chrono::Utc::now(),
            envelope: envelope.clone(),
        });
        self.outcome.clone()
    }
}

pub fn create_dispatcher(
    policy: ConflictPolicy,
    outcome: DeliveryOutcome,
) -> (Dispatcher, Arc<RecordingNotifier>) {
    let notifier = RecordingNotifier::answering(outcome);
    let config = Config::builder().conflict_policy(policy).build();
    let dispatcher =
        Dispatcher::with_notifier(config, Arc::new(MemoryStore::new()), notifier.clone());

    (dispatcher, notifier)
}

/// Polls the listing, the way a client observes a triggered run.
pub async fn wait_for_status(dispatcher: &Dispatcher, id: JobId, expected: Status) {
    let start = SystemTime::now();
    let timeout = Duration::from_secs(10);

    let mut status = None;
    while SystemTime::now().duration_since(start).unwrap() < timeout {
        status = dispatcher
            .list()
            .await
            .expect("list jobs")
            .into_iter()
            .find(|job| job.id == id)
            .map(|job| job.status);
        if status == Some(expected) {
            return;
        }
        sleep_ms(25).await;
    }

    panic!("Job {} expected to be {}, was {:?}", id, expected, status);
}

pub async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await
}
