use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use super::ApiTransport;
use crate::core::rate_limiter::{RateLimiter, MAX_ATTEMPTS};
use crate::error::{InsightError, Result};
use crate::llm::payload::ExplainRequestPayload;

pub const EXPLAIN_PATH: &str = "explain_forecast";

/// POST the payload, retrying once on rate limiting. Returns the extracted summary.
///
/// The token aborts both the HTTP call and the backoff sleep. A cancelled call never reaches
/// the caller's cache write because it returns `Err(Cancelled)`.
pub async fn request_explanation(
    transport: &dyn ApiTransport,
    payload: &ExplainRequestPayload,
    cancel: &CancellationToken,
) -> Result<String> {
    let body = serde_json::to_value(payload)?;
    let query = payload.query_params();
    let mut attempt = 0;

    loop {
        attempt += 1;

        // Dropping the losing branch drops the in-progress request.
        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(InsightError::Cancelled),
            r = transport.post_json(EXPLAIN_PATH, &query, &body) => r?,
        };

        if attempt < MAX_ATTEMPTS && RateLimiter::is_rate_limited(resp.status, resp.body.as_ref()) {
            let wait = RateLimiter::backoff_delay(resp.body.as_ref());
            warn!(status = resp.status, wait_ms = wait.as_millis() as u64, "Explanation rate limited, retrying once");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(InsightError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
            continue;
        }

        // A second 429 is terminal and its body is used as-is.
        if !resp.is_success() && resp.status != 429 {
            return Err(InsightError::Status {
                status: resp.status,
                body: resp.body_text(),
            });
        }

        debug!(attempt, status = resp.status, "Explanation received");
        return Ok(extract_summary(resp.body.as_ref()));
    }
}

/// A bare JSON string is the summary; otherwise read `summary`; default empty.
pub fn extract_summary(body: Option<&Value>) -> String {
    match body {
        Some(Value::String(s)) => s.clone(),
        Some(v) => v.get("summary").and_then(Value::as_str).unwrap_or_default().to_string(),
        None => String::new(),
    }
}
