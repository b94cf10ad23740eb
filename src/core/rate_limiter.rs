use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::time::Duration;

/// Wait used when the server gives no "try again in Ns" hint.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(1600);

/// Two attempts total: the first call plus one retry.
pub const MAX_ATTEMPTS: u32 = 2;

static RATE_LIMIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)rate limit").expect("valid regex"));
static TRY_AGAIN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)try again in\s+([\d.]+)s").expect("valid regex"));

pub struct RateLimiter;

impl RateLimiter {
    /// 429, or a body whose JSON text mentions "rate limit" in any case.
    pub fn is_rate_limited(status: u16, body: Option<&Value>) -> bool {
        if status == 429 {
            return true;
        }
        match body {
            Some(json) => RATE_LIMIT_RE.is_match(&json.to_string()),
            None => false,
        }
    }

    /// How long to wait before the retry, honouring a "try again in 2.5s" hint in the error message.
    pub fn backoff_delay(body: Option<&Value>) -> Duration {
        let message = body.map(error_message).unwrap_or_default();

        TRY_AGAIN_RE
            .captures(&message)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(|secs| Duration::from_millis((secs * 1000.0).ceil() as u64))
            .unwrap_or(DEFAULT_BACKOFF)
    }
}

/// `error.message`, else a string `error`, else a top-level `message`.
fn error_message(body: &Value) -> String {
    if let Some(msg) = body.pointer("/error/message").and_then(Value::as_str) {
        return msg.to_string();
    }
    if let Some(msg) = body.get("error").and_then(Value::as_str) {
        return msg.to_string();
    }
    body.get("message").and_then(Value::as_str).unwrap_or_default().to_string()
}
