use common::*;
use nebula::{
    delay_queue::{DelayQueue, Scheduled},
    webhook::DeliveryOutcome,
    AckError, Config, ConflictPolicy, Dispatcher, NewJob, Priority, RunError, Status,
    SubmitError,
};
use std::{sync::Arc, time::Duration};
use tokio::{io::AsyncWriteExt, net::TcpListener};

mod common;

fn ok() -> DeliveryOutcome {
    DeliveryOutcome::Delivered { status: 200 }
}

#[tokio::test]
async fn integration_basic() {
    let (dispatcher, notifier) = create_dispatcher(ConflictPolicy::FailJob, ok());
    let payload = "{\n  \"email\": \"user@example.com\",\n  \"type\": \"report\"\n}";
    let id = dispatcher
        .submit(NewJob::new("Generate Invoice #8841", payload).with_priority(Priority::High))
        .await
        .expect("submit job");

    let started = chrono::Utc::now();
    let _ = dispatcher.trigger(id);

    wait_for_status(&dispatcher, id, Status::Running).await;
    wait_for_status(&dispatcher, id, Status::Completed).await;

    // the webhook follows the completed write
    sleep_ms(100).await;
    let deliveries = notifier.deliveries.lock().await;
    assert_eq!(1, deliveries.len());

    let envelope = &deliveries[0].envelope;
    assert_eq!(id, envelope.job_id);
    assert_eq!("Generate Invoice #8841", envelope.task_name);
    assert_eq!(Priority::High, envelope.priority);
    assert_eq!(
        serde_json::json!({ "email": "user@example.com", "type": "report" }),
        envelope.data
    );
    assert!(envelope.completed_at > started);
    assert!(envelope.completed_at - started >= chrono::Duration::milliseconds(3000));
}

#[tokio::test]
async fn integration_invalid_payload() {
    let (dispatcher, _) = create_dispatcher(ConflictPolicy::FailJob, ok());

    let result = dispatcher.submit(NewJob::new("bad", "{bad")).await;

    assert!(matches!(result, Err(SubmitError::InvalidPayload(_))));
    assert!(dispatcher.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn integration_run_unknown_job() {
    let (dispatcher, notifier) = create_dispatcher(ConflictPolicy::FailJob, ok());
    let existing = dispatcher
        .submit(NewJob::new("existing", "{}"))
        .await
        .unwrap();
    let before = dispatcher.list().await.unwrap();

    let result = dispatcher.run(nebula::JobId(existing.0 + 100)).await;

    assert!(matches!(result, Err(RunError::NotFound(_))));
    assert_eq!(before, dispatcher.list().await.unwrap());
    assert_eq!(0, notifier.deliveries.lock().await.len());
}

#[tokio::test]
async fn integration_double_run() {
    let (dispatcher, notifier) = create_dispatcher(ConflictPolicy::FailJob, ok());
    let id = dispatcher
        .submit(NewJob::new("double", "{}").with_duration(300))
        .await
        .unwrap();

    let first = dispatcher.trigger(id);
    wait_for_status(&dispatcher, id, Status::Running).await;
    let second = dispatcher.trigger(id);

    assert!(matches!(
        second.finished().await,
        Err(AckError::Run(RunError::AlreadyRunning(_)))
    ));
    assert!(first.finished().await.is_err());

    let job = dispatcher.get(id).await.unwrap().unwrap();
    assert_eq!(Status::Failed, job.status);

    // nothing else touches the job afterwards
    sleep_ms(400).await;
    assert_eq!(job, dispatcher.get(id).await.unwrap().unwrap());
    assert_eq!(0, notifier.count_for(id).await);
}

#[tokio::test]
async fn integration_rerun_after_completion() {
    let (dispatcher, notifier) = create_dispatcher(ConflictPolicy::FailJob, ok());
    let id = dispatcher
        .submit(NewJob::new("again", "{}").with_duration(20))
        .await
        .unwrap();

    dispatcher.trigger(id).finished().await.unwrap();
    dispatcher.trigger(id).finished().await.unwrap();

    assert_eq!(
        Status::Completed,
        dispatcher.get(id).await.unwrap().unwrap().status
    );
    assert_eq!(2, notifier.count_for(id).await);
}

#[tokio::test]
async fn integration_webhook_failures_keep_completed() {
    let outcomes = vec![
        DeliveryOutcome::Delivered { status: 500 },
        DeliveryOutcome::Unreachable {
            reason: "operation timed out".to_string(),
        },
        DeliveryOutcome::LocalError {
            reason: "builder error".to_string(),
        },
    ];

    for outcome in outcomes {
        let (dispatcher, _) = create_dispatcher(ConflictPolicy::FailJob, outcome.clone());
        let id = dispatcher
            .submit(NewJob::new("webhook", "{}").with_duration(10))
            .await
            .unwrap();

        let report = dispatcher.trigger(id).finished().await.unwrap();

        assert_eq!(outcome, report.delivery);
        assert_eq!(
            Status::Completed,
            dispatcher.get(id).await.unwrap().unwrap().status
        );
    }
}

#[tokio::test]
async fn integration_http_webhook_error_response() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/webhook-test", listener.local_addr().unwrap());
    let sink = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 4096];
        let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut buf).await;
        socket
            .write_all(b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
    });

    let config = Config::builder()
        .webhook_url(url)
        .webhook_timeout(Duration::from_secs(2))
        .build();
    let dispatcher = Dispatcher::new(config, Box::new(nebula::storage::MemoryStore::new())).unwrap();
    let id = dispatcher
        .submit(NewJob::new("webhook", "{\"a\": 1}").with_duration(10))
        .await
        .unwrap();

    let report = dispatcher.trigger(id).finished().await.unwrap();
    sink.await.unwrap();

    assert_eq!(DeliveryOutcome::Delivered { status: 500 }, report.delivery);
    assert_eq!(
        Status::Completed,
        dispatcher.get(id).await.unwrap().unwrap().status
    );
}

#[tokio::test]
async fn integration_listing_newest_first() {
    let (dispatcher, _) = create_dispatcher(ConflictPolicy::FailJob, ok());
    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(
            dispatcher
                .submit(NewJob::new(format!("job-{}", i), "{}"))
                .await
                .unwrap(),
        );
        sleep_ms(2).await;
    }

    let listed: Vec<_> = dispatcher
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|job| job.id)
        .collect();

    ids.reverse();
    assert_eq!(ids, listed);
}

#[tokio::test]
async fn integration_delayed_submission() {
    let (dispatcher, _) = create_dispatcher(ConflictPolicy::FailJob, ok());
    let queue = Arc::new(DelayQueue::new(dispatcher.clone()));

    let scheduled = queue
        .schedule(3, NewJob::new("delayed", "{}"))
        .await
        .unwrap();
    assert_eq!(Scheduled::Held { remaining: 3 }, scheduled);

    let ticker = tokio::spawn({
        let queue = queue.clone();
        async move { queue.run(Duration::from_millis(50)).await }
    });

    sleep_ms(100).await;
    assert!(dispatcher.list().await.unwrap().is_empty());

    sleep_ms(400).await;
    let jobs = dispatcher.list().await.unwrap();
    assert_eq!(1, jobs.len());
    assert_eq!("delayed", jobs[0].task_name);
    assert_eq!(Status::Pending, jobs[0].status);

    ticker.abort();
}
