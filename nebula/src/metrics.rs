use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    pub(crate) static ref COUNTER: Metrics = Metrics::new();
}

pub(crate) struct Metrics {
    pub jobs_submitted: IntCounter,
    pub jobs_rejected: IntCounter,
    pub job_runs: IntCounterVec,
    pub webhook_deliveries: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let submitted = register_int_counter!("nebula_jobs_submitted", "jobs accepted")
            .expect("register nebula_jobs_submitted");
        let rejected = register_int_counter!(
            "nebula_jobs_rejected",
            "submissions rejected for an invalid payload"
        )
        .expect("register nebula_jobs_rejected");
        let runs = register_int_counter_vec!(
            "nebula_job_runs",
            "run attempts by outcome",
            &["outcome"]
        )
        .expect("register nebula_job_runs");
        let deliveries = register_int_counter_vec!(
            "nebula_webhook_deliveries",
            "webhook deliveries by outcome",
            &["outcome"]
        )
        .expect("register nebula_webhook_deliveries");

        Metrics {
            jobs_submitted: submitted,
            jobs_rejected: rejected,
            job_runs: runs,
            webhook_deliveries: deliveries,
        }
    }

    pub fn output(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        encoder.encode(&metric_families, &mut buffer)?;

        Ok(String::from_utf8(buffer)?)
    }
}
