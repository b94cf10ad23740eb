//! Scripted transport for deterministic tests of the orchestration layer.
//!
//! Replies are queued per `METHOD path`. The last queued reply for a route is sticky, so a
//! single `with_reply` answers every call. Each call is recorded for later assertions.
//!
//! ```rust,ignore
//! let mock = MockTransport::new()
//!     .with_reply("POST", "explain_forecast", MockReply::status(429, json!({})))
//!     .with_reply("POST", "explain_forecast", MockReply::json(json!({ "summary": "ok" })));
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use super::{ApiResponse, ApiTransport};
use crate::error::{InsightError, Result};

#[derive(Debug, Clone)]
pub enum MockReply {
    Response(ApiResponse),
    /// Transport-level failure (connection refused...).
    Fail(String),
}

impl MockReply {
    pub fn json(body: Value) -> Self {
        MockReply::Response(ApiResponse::ok(body))
    }

    pub fn status(status: u16, body: Value) -> Self {
        MockReply::Response(ApiResponse::new(status, Some(body)))
    }

    /// A response whose body could not be parsed.
    pub fn unparsable(status: u16) -> Self {
        MockReply::Response(ApiResponse::new(status, None))
    }

    pub fn fail(message: impl Into<String>) -> Self {
        MockReply::Fail(message.into())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: &'static str,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, VecDeque<MockReply>>>,
    calls: Mutex<Vec<RecordedCall>>,
    latency: Duration,
    route_latency: HashMap<String, Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, method: &str, path: &str, reply: MockReply) -> Self {
        self.push_reply(method, path, reply);
        self
    }

    /// Simulated network time before every reply.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Latency for one route, overriding [`with_latency`](Self::with_latency).
    pub fn with_route_latency(mut self, method: &str, path: &str, latency: Duration) -> Self {
        self.route_latency.insert(route_key(method, path), latency);
        self
    }

    pub fn push_reply(&self, method: &str, path: &str, reply: MockReply) {
        self.routes
            .lock()
            .entry(route_key(method, path))
            .or_default()
            .push_back(reply);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, path: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.path == path).count()
    }

    fn next_reply(&self, method: &str, path: &str) -> MockReply {
        let mut routes = self.routes.lock();
        match routes.get_mut(&route_key(method, path)) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(|| MockReply::unparsable(404)),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| MockReply::unparsable(404)),
            None => MockReply::Response(ApiResponse::new(404, Some(Value::String(format!("no mock for {} {}", method, path))))),
        }
    }

    async fn respond(&self, call: RecordedCall) -> Result<ApiResponse> {
        let (method, path) = (call.method, call.path.clone());
        self.calls.lock().push(call);
        let latency = self
            .route_latency
            .get(&route_key(method, &path))
            .copied()
            .unwrap_or(self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match self.next_reply(method, &path) {
            MockReply::Response(resp) => Ok(resp),
            MockReply::Fail(message) => Err(InsightError::Transport(message)),
        }
    }
}

fn route_key(method: &str, path: &str) -> String {
    format!("{} {}", method.to_uppercase(), path.trim_start_matches('/'))
}

#[async_trait]
impl ApiTransport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get_json(&self, path: &str, query: &[(String, String)]) -> Result<ApiResponse> {
        self.respond(RecordedCall {
            method: "GET",
            path: path.trim_start_matches('/').to_string(),
            query: query.to_vec(),
            body: None,
        })
        .await
    }

    async fn post_json(&self, path: &str, query: &[(String, String)], body: &Value) -> Result<ApiResponse> {
        self.respond(RecordedCall {
            method: "POST",
            path: path.trim_start_matches('/').to_string(),
            query: query.to_vec(),
            body: Some(body.clone()),
        })
        .await
    }
}
