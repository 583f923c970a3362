use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("backend response could not be parsed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("backend call timed out")]
    Timeout,

    #[error("backend returned no query results")]
    EmptyResponse,

    #[error("chunk task failed: {0}")]
    Join(String),
}

pub type Result<T> = std::result::Result<T, BackendError>;
