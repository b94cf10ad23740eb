use async_trait::async_trait;
use serde_json::Value;
use crate::error::Result;

pub mod http;
pub mod mock;
pub mod explain;
pub mod forecast;
pub mod stores;
pub mod category;

/// Status plus defensively parsed JSON body (`None` when the body was not valid JSON).
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Option<Value>,
}

impl ApiResponse {
    pub fn new(status: u16, body: Option<Value>) -> Self {
        Self { status, body }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(200, Some(body))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, for error messages.
    pub fn body_text(&self) -> String {
        match &self.body {
            Some(Value::String(s)) => s.clone(),
            Some(v) => v.to_string(),
            None => String::new(),
        }
    }
}

/// The dashboard API as seen by the orchestration layer. Paths are relative to the API base
/// (`"forecast/7"`, `"explain_forecast"`).
#[async_trait]
pub trait ApiTransport: Send + Sync {
    fn name(&self) -> &str;
    async fn get_json(&self, path: &str, query: &[(String, String)]) -> Result<ApiResponse>;
    async fn post_json(&self, path: &str, query: &[(String, String)], body: &Value) -> Result<ApiResponse>;
}
