//! HTTP webhook delivery

use std::time::Duration;

use async_trait::async_trait;
use courier_outbox::{TaskExecutor, TaskRecord, TaskResult};
use reqwest::{Client, StatusCode};
use serde_json::json;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};

/// Header carrying the request signature
pub const SIGNATURE_HEADER: &str = "X-Courier-Signature";

/// POSTs each record as JSON to a fixed URL
///
/// Request body: `{"task_id", "task_type", "payload", "retry_count"}`.
/// 2xx is success (the response body becomes the result data); 408, 429,
/// 5xx and transport errors are retryable; any other status is not.
#[derive(Debug, Clone)]
pub struct WebhookExecutor {
    client: Client,
    url: String,
    signing_secret: Option<String>,
    timeout: Duration,
}

impl WebhookExecutor {
    /// Create an executor posting to `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            signing_secret: None,
            timeout: Duration::from_secs(10),
        }
    }

    /// Sign request bodies with `secret`
    pub fn with_signing_secret(mut self, secret: impl Into<String>) -> Self {
        self.signing_secret = Some(secret.into());
        self
    }

    /// Per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a shared HTTP client
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TaskExecutor for WebhookExecutor {
    async fn execute(&self, record: &TaskRecord) -> TaskResult {
        let body = json!({
            "task_id": record.id,
            "task_type": record.task_type,
            "payload": record.payload,
            "retry_count": record.retry_count,
        });
        let body = match serde_json::to_string(&body) {
            Ok(body) => body,
            Err(e) => return TaskResult::non_retryable(format!("failed to encode body: {e}")),
        };

        let mut request = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .header("Content-Type", "application/json");
        if let Some(secret) = &self.signing_secret {
            request = request.header(SIGNATURE_HEADER, generate_signature(&body, secret));
        }

        let response = match request.body(body).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(task_id = %record.id, url = %self.url, error = %e, "Webhook request failed");
                return TaskResult::retryable(format!("webhook request failed: {e}"));
            }
        };

        let status = response.status();
        let response_body = match response.text().await {
            Ok(text) => text,
            Err(e) => return TaskResult::retryable(format!("failed to read response body: {e}")),
        };

        debug!(task_id = %record.id, status = status.as_u16(), "Webhook responded");
        classify(status, response_body)
    }
}

/// Map an HTTP response onto a task result
fn classify(status: StatusCode, body: String) -> TaskResult {
    if status.is_success() {
        let data = serde_json::from_str(&body).unwrap_or_else(|_| json!({ "raw_response": body }));
        return TaskResult::ok_with(data);
    }

    let message = format!("webhook returned {status}: {body}");
    let retryable = status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS;
    if retryable {
        TaskResult::retryable(message)
    } else {
        TaskResult::non_retryable(message)
    }
}

type HmacSha256 = Hmac<Sha256>;

/// `sha256=<hex>` HMAC-SHA256 of the body keyed with `secret`
pub fn generate_signature(body: &str, secret: &str) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC accepts keys of any length"),
    };
    mac.update(body.as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
