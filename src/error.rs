use std::sync::Arc;

use thiserror::Error;

/// Result type used throughout the SDK.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the SDK.
///
/// Most of these never reach the host application: the in-app engine logs them and degrades to
/// "no message shown". They are returned from construction, shutdown, and the lower-level building
/// blocks ([`InAppApi`](crate::InAppApi), [`Storage`](crate::Storage)).
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Invalid base URL configuration.
    #[error("invalid base_url configuration")]
    InvalidBaseUrl(#[source] url::ParseError),

    /// The server rejected the request, the account name is likely invalid.
    #[error("unauthorized, account_name is likely invalid")]
    Unauthorized,

    /// Network error.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),

    /// Persisted state or a server response could not be (de)serialized.
    #[error(transparent)]
    Serialization(Arc<serde_json::Error>),

    /// A message failed validation and was dropped.
    #[error("invalid in-app message: {0}")]
    InvalidMessage(String),

    /// The engine thread panicked. This should normally never happen.
    #[error("engine thread panicked")]
    EngineThreadPanicked,

    /// The engine thread is no longer accepting commands.
    #[error("engine thread has stopped")]
    EngineStopped,
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Serialization(Arc::new(value))
    }
}
