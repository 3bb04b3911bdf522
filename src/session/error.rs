use reqwest::StatusCode;

use super::store::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The server rejected the request's credentials and the session could not be renewed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// The refresh token could not be exchanged for a new pair.
    #[error("session renewal failed: {0}")]
    RefreshExchangeFailed(String),
    /// Any other non-success response.
    #[error("server returned {status}: {message}")]
    Api {
        status: StatusCode,
        message: String,
        code: Option<String>,
    },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("session storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl SessionError {
    /// True when the caller has to log in again.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            SessionError::Unauthorized(_) | SessionError::RefreshExchangeFailed(_)
        )
    }
}
