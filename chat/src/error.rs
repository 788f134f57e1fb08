use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("API key not configured")]
    MissingApiKey,

    #[error("API error: {message}")]
    Upstream { status: u16, message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to decode upstream response: {0}")]
    Decode(String),
}
