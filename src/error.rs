//! Error types shared by the backend.
//!
//! [`ApiError`] is what a single remote call can produce. The poller matches
//! on its variants to pick a recovery policy. [`Error`] is the crate wide
//! taxonomy surfaced by the facade and the authorization flow.

use std::time::Duration;

use thiserror::Error;

/// Outcome classes of a single Spotify Web API call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The access token was rejected (401/403).
    #[error("token rejected by remote ({status}): {message}")]
    Auth { status: u16, message: String },

    /// 429 with the server provided `Retry-After`, if any.
    #[error("rate limited (retry after {0:?})")]
    RateLimited(Option<Duration>),

    #[error("remote error {status}: {message}")]
    Remote { status: u16, message: String },

    /// The request never produced an HTTP response.
    #[error("remote unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ApiError::Remote {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => ApiError::Unavailable(err.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("authorization was not completed: {0}")]
    AuthorizationDenied(String),

    #[error("another authorization attempt is already in progress")]
    AuthorizationInProgress,

    #[error("cannot listen for the redirect on port {port}: {source}")]
    ListenerBind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("no cached token, authorization required")]
    NotAuthenticated,

    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("token expired or revoked")]
    TokenExpiredOrRevoked,

    #[error("rate limited by remote")]
    RateLimited(Option<Duration>),

    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("remote error {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("invalid repeat mode {0:?}, expected off, track or context")]
    InvalidRepeatMode(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl From<ApiError> for Error {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Auth { .. } => Error::TokenExpiredOrRevoked,
            ApiError::RateLimited(retry_after) => Error::RateLimited(retry_after),
            ApiError::Remote { status, message } => Error::Remote { status, message },
            ApiError::Unavailable(message) => Error::RemoteUnavailable(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
