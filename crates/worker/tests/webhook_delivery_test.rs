//! Webhook delivery through a running engine against a mock HTTP server
//!
//! Run with: cargo test -p courier-worker --test webhook_delivery_test

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::{sleep, Instant};
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use courier_outbox::{
    InMemoryTaskStore, Payload, PollerEngine, TaskConfig, TaskRecord, TaskStatus, TaskStore,
};
use courier_worker::executors::{generate_signature, WebhookExecutor, SIGNATURE_HEADER};

fn config() -> TaskConfig {
    TaskConfig::new("order_webhook")
        .with_poll_interval(Duration::from_millis(10))
        .with_base_delay(Duration::from_millis(20))
        .with_max_delay(Duration::from_millis(100))
}

fn payload() -> Payload {
    let mut payload = Payload::new();
    payload.insert("order_id".into(), json!(42));
    payload.insert("status".into(), json!("paid"));
    payload
}

async fn wait_for_terminal(store: &InMemoryTaskStore, id: &str) -> TaskRecord {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let record = store.get(id).await.unwrap().unwrap();
        if record.is_terminal() {
            return record;
        }
        assert!(Instant::now() < deadline, "task {id} never finished: {record:?}");
        sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_delivers_signed_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(header_exists(SIGNATURE_HEADER))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "received": true })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryTaskStore::new());
    let executor = WebhookExecutor::new(format!("{}/orders", server.uri()))
        .with_signing_secret("whsec_test");
    let engine = PollerEngine::new(config(), store.clone(), Arc::new(executor)).unwrap();

    let id = engine.submit("order-42", payload()).await.unwrap();
    engine.start();
    let record = wait_for_terminal(&store, &id).await;
    engine.stop().await.unwrap();

    assert_eq!(record.status, TaskStatus::Success);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    let body: Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body["task_id"], json!(id));
    assert_eq!(body["task_type"], json!("order_webhook"));
    assert_eq!(body["payload"], Value::Object(payload()));
    assert_eq!(body["retry_count"], json!(0));

    let signature = request
        .headers
        .get(SIGNATURE_HEADER)
        .unwrap()
        .to_str()
        .unwrap();
    let raw_body = std::str::from_utf8(&request.body).unwrap();
    assert_eq!(signature, generate_signature(raw_body, "whsec_test"));
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryTaskStore::new());
    let engine = PollerEngine::new(
        config().with_max_retry(5),
        store.clone(),
        Arc::new(WebhookExecutor::new(server.uri())),
    )
    .unwrap();

    let id = engine.submit("order-42", payload()).await.unwrap();
    engine.start();
    let record = wait_for_terminal(&store, &id).await;
    engine.stop().await.unwrap();

    assert_eq!(record.status, TaskStatus::Success);
    assert_eq!(record.retry_count, 2);

    // The body reports the attempt number to the receiver
    let requests = server.received_requests().await.unwrap();
    let counts: Vec<Value> = requests
        .iter()
        .map(|r| serde_json::from_slice::<Value>(&r.body).unwrap()["retry_count"].clone())
        .collect();
    assert_eq!(counts, vec![json!(0), json!(1), json!(2)]);
}

#[tokio::test]
async fn test_client_errors_fail_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(422).set_body_string("unknown order"))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryTaskStore::new());
    let engine = PollerEngine::new(
        config(),
        store.clone(),
        Arc::new(WebhookExecutor::new(server.uri())),
    )
    .unwrap();

    let id = engine.submit("order-42", payload()).await.unwrap();
    engine.start();
    let record = wait_for_terminal(&store, &id).await;
    sleep(Duration::from_millis(50)).await;
    engine.stop().await.unwrap();

    assert_eq!(record.status, TaskStatus::Failed);
    assert_eq!(record.retry_count, 1);
    assert!(record.next_retry_time.is_none());
    assert!(record.error_message.unwrap().contains("unknown order"));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_retryable() {
    // Nothing listens on the discard port
    let store = Arc::new(InMemoryTaskStore::new());
    let engine = PollerEngine::new(
        config().with_max_retry(2),
        store.clone(),
        Arc::new(
            WebhookExecutor::new("http://127.0.0.1:9/hook").with_timeout(Duration::from_millis(500)),
        ),
    )
    .unwrap();

    let id = engine.submit("order-42", payload()).await.unwrap();
    engine.start();
    let record = wait_for_terminal(&store, &id).await;
    engine.stop().await.unwrap();

    // Two retryable transport failures exhaust max_retry = 2
    assert_eq!(record.status, TaskStatus::Failed);
    assert_eq!(record.retry_count, 2);
    assert!(record
        .error_message
        .unwrap()
        .starts_with("webhook request failed"));
}
