#[macro_use]
extern crate rocket;

use nebula::{
    delay_queue::{DelayQueue, PendingEntry, Scheduled},
    reaper::Reaper,
    storage::{JobStore, MemoryStore, Postgres},
    Config, ConflictPolicy, Dispatcher, Job, JobId, NewJob, SubmitError,
};
use rocket::{
    http::Status,
    serde::json::{json, Json, Value},
    State,
};
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use tracing_subscriber::EnvFilter;

struct AppContext {
    jobs: Dispatcher,
    delayed: Arc<DelayQueue<Dispatcher>>,
}

type ApiResult<T> = Result<T, (Status, Json<Value>)>;

fn internal_error(e: impl std::fmt::Display) -> (Status, Json<Value>) {
    (
        Status::InternalServerError,
        Json(json!({ "error": e.to_string() })),
    )
}

#[derive(Deserialize)]
struct CreateJobRequest {
    #[serde(flatten)]
    job: NewJob,
    /// Seconds to hold the submission in the delay queue.
    #[serde(default)]
    delay: u64,
}

#[post("/jobs", data = "<request>")]
async fn create_job(
    state: &State<AppContext>,
    request: Json<CreateJobRequest>,
) -> ApiResult<(Status, Json<Value>)> {
    let CreateJobRequest { job, delay } = request.into_inner();

    match state.delayed.schedule(delay, job).await {
        Ok(Scheduled::Submitted(id)) => Ok((
            Status::Created,
            Json(json!({ "id": id, "message": "Job created" })),
        )),
        Ok(Scheduled::Held { remaining }) => Ok((
            Status::Accepted,
            Json(json!({ "scheduled": true, "delay": remaining })),
        )),
        Err(SubmitError::InvalidPayload(_)) => Err((
            Status::BadRequest,
            Json(json!({ "error": "Invalid JSON payload" })),
        )),
        Err(e) => Err(internal_error(e)),
    }
}

#[get("/jobs")]
async fn list_jobs(state: &State<AppContext>) -> ApiResult<Json<Vec<Job>>> {
    state.jobs.list().await.map(Json).map_err(internal_error)
}

#[get("/jobs/scheduled")]
async fn scheduled_jobs(state: &State<AppContext>) -> Json<Vec<PendingEntry>> {
    Json(state.delayed.pending().await)
}

#[get("/jobs/<id>", rank = 2)]
async fn get_job(state: &State<AppContext>, id: i64) -> ApiResult<Json<Job>> {
    match state.jobs.get(JobId(id)).await.map_err(internal_error)? {
        Some(job) => Ok(Json(job)),
        None => Err((
            Status::NotFound,
            Json(json!({ "error": "Job not found" })),
        )),
    }
}

#[post("/run-job/<id>")]
fn run_job(state: &State<AppContext>, id: i64) -> Value {
    // fire and forget: the client polls /jobs for the outcome
    let ack = state.jobs.trigger(JobId(id));
    json!({ "message": format!("Job {} execution started", ack.job_id) })
}

#[post("/webhook-test", data = "<event>")]
fn webhook_test(event: Json<Value>) -> Value {
    tracing::info!(event = %event.0, "Webhook received");
    json!({ "received": true })
}

#[get("/metrics")]
fn metrics() -> ApiResult<String> {
    nebula::metrics_output().map_err(internal_error)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("nebula=info,nebula_server=info"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn load_config() -> anyhow::Result<Config> {
    let conflict_policy = match env_var("NEBULA_CONFLICT_POLICY") {
        Some(policy) => policy.parse()?,
        None => ConflictPolicy::default(),
    };
    let stale_after = match env_var("NEBULA_STALE_AFTER_SECS") {
        Some(secs) => Some(Duration::from_secs(secs.parse()?)),
        None => None,
    };

    Ok(Config::builder()
        .webhook_url(env_var("WEBHOOK_URL"))
        .conflict_policy(conflict_policy)
        .stale_after(stale_after)
        .build())
}

async fn create_store() -> anyhow::Result<Box<dyn JobStore>> {
    match env_var("DATABASE_URL") {
        Some(url) => Ok(Box::new(Postgres::new(&url).await?)),
        None => {
            tracing::warn!("DATABASE_URL is not set, jobs are kept in memory");
            Ok(Box::new(MemoryStore::new()))
        }
    }
}

#[launch]
async fn rocket() -> _ {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = load_config().expect("read configuration");
    let store = create_store().await.expect("open job store");
    let jobs = Dispatcher::new(config.clone(), store).expect("create dispatcher");

    let delayed = Arc::new(DelayQueue::new(jobs.clone()));
    tokio::spawn({
        let delayed = delayed.clone();
        let period = config.tick_interval;
        async move { delayed.run(period).await }
    });

    if let Some(stale_after) = config.stale_after {
        let reaper = Reaper::new(jobs.store(), stale_after);
        tokio::spawn(async move { reaper.run(stale_after).await });
    }

    build(AppContext { jobs, delayed })
}

fn build(ctx: AppContext) -> rocket::Rocket<rocket::Build> {
    rocket::build()
        .mount(
            "/",
            routes![
                create_job,
                list_jobs,
                scheduled_jobs,
                get_job,
                run_job,
                webhook_test,
                metrics
            ],
        )
        .manage(ctx)
}
