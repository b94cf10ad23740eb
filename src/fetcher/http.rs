use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use super::{ApiResponse, ApiTransport};
use crate::error::Result;

/// reqwest-backed transport against `API_BASE`.
pub struct HttpTransport {
    base_url: String,
    client: Client,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("StoreInsights/1.0"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().unwrap_or_else(|_| Client::new());

        Self { base_url: base_url.into(), client }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `API_BASE` already carries the `/api` prefix; join with exactly one slash.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    async fn read(resp: reqwest::Response) -> Result<ApiResponse> {
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        // Unparsable bodies become `None`, never an error.
        let body = serde_json::from_str::<Value>(&text).ok();
        Ok(ApiResponse { status, body })
    }
}

#[async_trait]
impl ApiTransport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn get_json(&self, path: &str, query: &[(String, String)]) -> Result<ApiResponse> {
        let url = self.url(path);
        tracing::debug!(%url, "GET");
        let resp = self.client.get(&url).query(query).send().await?;
        Self::read(resp).await
    }

    async fn post_json(&self, path: &str, query: &[(String, String)], body: &Value) -> Result<ApiResponse> {
        let url = self.url(path);
        tracing::debug!(%url, "POST");
        let resp = self.client.post(&url).query(query).json(body).send().await?;
        Self::read(resp).await
    }
}
