//! HTTP transport boundary
//!
//! The adapter speaks to the processor through this trait rather than an
//! HTTP client directly, so tests script responses without a network and
//! production swaps in a real client behind the same surface.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// One request to the processor API
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: HttpMethod,
    /// Path relative to the configured base URL
    pub path: String,
    pub body: Option<Value>,
    /// Key making a retried POST safe to replay
    pub idempotency_key: Option<String>,
    /// Secret presented as the Authorization bearer token
    pub bearer_token: String,
    /// Per-request deadline the transport must enforce
    pub timeout_secs: u64,
}

/// Raw response from the processor API
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: serde_json::json!({ "error": { "message": message } }),
        }
    }
}

/// Transport-level failures, before any HTTP status exists
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("connection failed: {0}")]
    Connection(String),
}

#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// Scriptable transport for tests
///
/// Responses are consumed in FIFO order; every request is recorded so
/// assertions can inspect paths, bodies, and idempotency keys.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<Result<ApiResponse, TransportError>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, response: ApiResponse) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Ok(response));
        }
    }

    pub fn fail(&self, error: TransportError) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Err(error));
        }
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl GatewayTransport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        let scripted = self.responses.lock().ok().and_then(|mut q| q.pop_front());
        match scripted {
            Some(result) => result,
            None => Err(TransportError::Connection(
                "no scripted response left".to_string(),
            )),
        }
    }
}
