use thiserror::Error;

/// Every failure a store adapter or the controller can report.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("your session was rejected by the server (HTTP {status}); please log in again")]
    Auth { status: u16 },
    #[error("please log in first")]
    LoginRequired,
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Server-supplied message, shown as-is.
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("note {0} not found")]
    NotFound(String),
    #[error("{0}")]
    Unsupported(&'static str),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("failed to parse JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl ClientError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ClientError::Auth { .. })
    }

    /// Transport failures and unexplained status codes.
    pub fn is_network(&self) -> bool {
        matches!(self, ClientError::Network(_) | ClientError::Http(_))
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
