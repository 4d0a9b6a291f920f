use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt as _;
use pigeonhole::{
    Archiver, Poller, PollerConfig, Processor, Publisher, Transport, Validator,
    api::{self, AppState, EmailResponse},
    archive::inmemory::InMemoryObjectStore,
    clock::FixedClock,
    email::ArchivedRecord,
    secret::{SecretCache, inmemory::InMemorySecretStore},
    transport::{InMemoryQueue, layers::JsonLayer},
};
use tower::ServiceExt as _;

const TOKEN: &str = "pipeline-token";
// 2025-10-09T09:46:40Z
const NOW_SECS: i64 = 1_760_000_000;

struct Pipeline {
    app: Router,
    queue: InMemoryQueue,
    store: InMemoryObjectStore,
    poller: Poller<InMemoryQueue, InMemoryObjectStore, FixedClock>,
}

async fn pipeline() -> Pipeline {
    let queue = InMemoryQueue::default();
    let store = InMemoryObjectStore::default();

    let secrets = Arc::new(SecretCache::new(InMemorySecretStore::new(TOKEN)));
    secrets.load().await.unwrap();
    let publisher = Publisher::new(Transport::new(queue.clone()).layer(JsonLayer))
        .with_clock(FixedClock::at_secs(NOW_SECS - 5));
    let app = api::router(AppState::new(Validator::new(secrets), publisher));

    let archiver = Archiver::new(store.clone()).with_clock(FixedClock::at_secs(NOW_SECS));
    let poller = Poller::new(queue.clone(), Processor::new(archiver), PollerConfig::default());

    Pipeline {
        app,
        queue,
        store,
        poller,
    }
}

async fn submit(app: &Router, sender: &str, timestream: &str) -> (StatusCode, EmailResponse) {
    let body = serde_json::json!({
        "data": {
            "email_subject": "Invoice 42",
            "email_sender": sender,
            "email_timestream": timestream,
            "email_content": "Please find the invoice attached."
        },
        "token": TOKEN
    });
    let response = app
        .clone()
        .oneshot(
            Request::post("/api/email")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn accepted_email_is_archived_and_removed_from_the_queue() {
    let pipeline = pipeline().await;

    let (status, response) =
        submit(&pipeline.app, "Jane Doe <jane@example.com>", "1693561101").await;
    assert_eq!(status, StatusCode::OK);

    let report = pipeline.poller.poll_once().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.deleted, 1);

    let key = "emails/2023/09/01/1693561101-jane_doe__jane_example_com_.json";
    assert_eq!(pipeline.store.keys().await, vec![key.to_owned()]);

    let object = pipeline.store.get(key).await.unwrap();
    let record: ArchivedRecord = serde_json::from_slice(&object.body).unwrap();
    assert_eq!(record.correlation_id, response.correlation_id);
    assert_eq!(record.email_sender, "Jane Doe <jane@example.com>");
    assert_eq!(record.email_subject, "Invoice 42");
    assert_eq!(record.original_timestamp, Some((NOW_SECS - 5) * 1000));
    assert_eq!(record.processed_at, NOW_SECS * 1000);
    assert_eq!(record.s3_key, key);
    assert_eq!(object.metadata["correlation-id"], response.correlation_id.as_str());

    assert!(pipeline.queue.pending().await.is_empty());
    assert_eq!(pipeline.queue.in_flight_len().await, 0);
}

#[tokio::test]
async fn rejected_requests_never_reach_the_queue() {
    let pipeline = pipeline().await;

    let (status, _) = submit(&pipeline.app, "   ", "1693561101").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = submit(&pipeline.app, "a@b.c", "-7").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let report = pipeline.poller.poll_once().await.unwrap();
    assert_eq!(report.received, 0);
    assert!(pipeline.store.is_empty().await);
}

#[tokio::test]
async fn archive_outage_is_recovered_by_redelivery() {
    let pipeline = pipeline().await;
    submit(&pipeline.app, "ops", "1693561101").await;

    pipeline.store.set_failing(true);
    let report = pipeline.poller.poll_once().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.deleted, 0);
    assert!(pipeline.store.is_empty().await);

    // visibility timeout expires
    pipeline.queue.redeliver().await;
    pipeline.store.set_failing(false);

    let report = pipeline.poller.poll_once().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.deleted, 1);
    assert_eq!(pipeline.store.len().await, 1);
    assert_eq!(pipeline.queue.deleted().await.len(), 1);
}

#[tokio::test]
async fn redelivery_after_lost_delete_overwrites_instead_of_duplicating() {
    let pipeline = pipeline().await;
    submit(&pipeline.app, "ops", "1693561101").await;

    pipeline.queue.set_delete_failing(true).await;
    let report = pipeline.poller.poll_once().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.delete_failures, 1);

    pipeline.queue.redeliver().await;
    pipeline.queue.set_delete_failing(false).await;

    let report = pipeline.poller.poll_once().await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(pipeline.store.put_count(), 2);
    assert_eq!(pipeline.store.len().await, 1);
}

#[tokio::test]
async fn each_accepted_request_is_archived_separately() {
    let pipeline = pipeline().await;

    for (sender, timestream) in [
        ("alice", "1693561101"),
        ("bob", "1693561101"),
        ("alice", "1700000000"),
    ] {
        let (status, _) = submit(&pipeline.app, sender, timestream).await;
        assert_eq!(status, StatusCode::OK);
    }

    let report = pipeline.poller.poll_once().await.unwrap();
    assert_eq!(report.received, 3);
    assert_eq!(report.deleted, 3);
    assert_eq!(
        pipeline.store.keys().await,
        vec![
            "emails/2023/09/01/1693561101-alice.json".to_owned(),
            "emails/2023/09/01/1693561101-bob.json".to_owned(),
            "emails/2023/11/14/1700000000-alice.json".to_owned(),
        ]
    );
}
