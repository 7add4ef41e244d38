//! Action service client
//!
//! The action collaborator executes side effects exactly once per call.
//! Failures are classified into http / request / unexpected so the
//! action-executor agent can surface a distinct user-safe message per class.
//! Every invocation emits a structured audit log record.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::time::timeout;

/// Invocation failure classes.
#[derive(Error, Debug)]
pub enum InvokeError {
    /// The service answered with a non-success status.
    #[error("action service returned HTTP {0}")]
    Http(u16),

    /// The service could not be reached (connect error or timeout).
    #[error("action service unreachable: {0}")]
    Request(String),

    #[error("unexpected invocation error: {0}")]
    Unexpected(String),
}

/// Boundary to the external action service.
#[async_trait]
pub trait ActionInvoker: Send + Sync {
    async fn invoke(
        &self,
        tool_name: &str,
        args: &Map<String, Value>,
        student_id: Option<&str>,
    ) -> Result<Value, InvokeError>;
}

/// HTTP implementation posting to `{service_url}/call_tool`.
pub struct ActionServiceClient {
    client: reqwest::Client,
    service_url: String,
    request_timeout: Duration,
}

impl ActionServiceClient {
    pub fn new(service_url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            service_url: service_url.into(),
            request_timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[async_trait]
impl ActionInvoker for ActionServiceClient {
    async fn invoke(
        &self,
        tool_name: &str,
        args: &Map<String, Value>,
        student_id: Option<&str>,
    ) -> Result<Value, InvokeError> {
        let start = Instant::now();
        let body = json!({
            "tool_name": tool_name,
            "tool_args": args,
        });

        let mut request = self
            .client
            .post(format!("{}/call_tool", self.service_url))
            .json(&body);
        if let Some(sid) = student_id {
            request = request.header("X-Student-ID", sid);
        }

        let result = timeout(self.request_timeout, request.send()).await;

        let outcome = match &result {
            Ok(Ok(resp)) if resp.status().is_success() => "ok",
            Ok(Ok(_)) => "http_error",
            Ok(Err(_)) => "request_error",
            Err(_) => "timeout",
        };
        let audit = json!({
            "event": "tool_audit",
            "tool": tool_name,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
        });
        tracing::info!(audit = %audit, "action invocation");

        let response = match result {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => return Err(InvokeError::Request(e.to_string())),
            Err(_) => return Err(InvokeError::Request("request timed out".to_string())),
        };

        let status = response.status();
        if !status.is_success() {
            return Err(InvokeError::Http(status.as_u16()));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| InvokeError::Unexpected(format!("invalid response body: {e}")))
    }
}
