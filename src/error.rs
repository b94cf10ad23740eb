//! Error type shared by the transport, cache and persistence layers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InsightError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API error (status={status}): {body}")]
    Status { status: u16, body: String },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Response superseded by a newer request")]
    Superseded,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl InsightError {
    /// Errors produced by abandoning the request rather than by the server.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, InsightError::Cancelled | InsightError::Superseded)
    }
}

// Coalesced callers receive a copy of the leader's outcome.
impl Clone for InsightError {
    fn clone(&self) -> Self {
        match self {
            InsightError::Transport(m) => InsightError::Transport(m.clone()),
            InsightError::Status { status, body } => InsightError::Status { status: *status, body: body.clone() },
            InsightError::Cancelled => InsightError::Cancelled,
            InsightError::Superseded => InsightError::Superseded,
            InsightError::Json(e) => InsightError::Transport(format!("JSON error: {}", e)),
            InsightError::Database(e) => InsightError::Transport(format!("Database error: {}", e)),
            InsightError::Config(m) => InsightError::Config(m.clone()),
        }
    }
}

impl From<reqwest::Error> for InsightError {
    fn from(e: reqwest::Error) -> Self {
        InsightError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, InsightError>;
