//! Public types for the mercury-subscriber crate.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// A future that returns a bearer token for one publish or subscribe call.
pub type TokenFuture = Pin<Box<dyn Future<Output = Result<String, BoxError>> + Send>>;

/// A boxed error type for the token callback.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Callback that returns a fresh access token for `(action, channel_id)`.
pub type TokenProvider = Box<dyn Fn(Action, String) -> TokenFuture + Send + Sync>;

/// The action a token is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Pub,
    Sub,
}

impl Action {
    /// Wire label handed to the token provider (`"pub"` or `"sub"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Pub => "pub",
            Action::Sub => "sub",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure reported by the remote side: a non-success publish response or
/// a stream-level error event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriberError {
    /// HTTP status, when the transport reported one.
    pub status: Option<u16>,
    /// Raw response body or stream error data.
    pub message: Option<String>,
}

impl SubscriberError {
    pub fn new(status: Option<u16>, message: Option<String>) -> Self {
        Self { status, message }
    }
}

impl fmt::Display for SubscriberError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("subscriber error")?;
        if let Some(status) = self.status {
            write!(f, " (status {status})")?;
        }
        if let Some(message) = self.message.as_deref().filter(|m| !m.is_empty()) {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SubscriberError {}

/// Errors returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid path segment {0:?}: dot segments are not addressable")]
    InvalidSegment(String),

    #[error("cannot publish without an access token provider")]
    MissingTokenProvider,

    #[error("token fetch failed: {0}")]
    TokenFetch(BoxError),

    #[error(transparent)]
    Remote(#[from] SubscriberError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON encode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message decode error: {0}")]
    Decode(serde_json::Error),

    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

impl Error {
    /// The remote failure, if this error is one.
    pub fn as_remote(&self) -> Option<&SubscriberError> {
        match self {
            Error::Remote(e) => Some(e),
            _ => None,
        }
    }
}
