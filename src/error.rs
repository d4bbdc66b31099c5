use thiserror::Error;

/// Errors produced by the extractor and its components.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Low-level HTTP transport failure (connection refused, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON parsing failed at the serde level.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// The model provider returned a non-success status code.
    #[error("model call failed with HTTP {status}: {body}")]
    ModelCall {
        /// HTTP status code (e.g. 429, 500, 503).
        status: u16,
        /// Response body text.
        body: String,
    },

    /// An item's content kind is not one the processor was configured to accept.
    #[error("processor '{processor}' does not accept content kind '{kind}'")]
    UnsupportedContent { processor: String, kind: String },

    /// Processing was cancelled via the cancellation flag.
    #[error("processing was cancelled")]
    Cancelled,

    /// Invalid configuration detected at construction time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The item source failed while pulling the next item.
    #[error("item source failed: {0}")]
    Source(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for ExtractError {
    fn from(err: anyhow::Error) -> Self {
        ExtractError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;
