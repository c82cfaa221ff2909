//! Error types for netbridge.

use std::fmt;

use bytes::Bytes;
use thiserror::Error;

/// Broad classification of a transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The task was cancelled, either by its caller or by session invalidation.
    Cancelled,
    TimedOut,
    CannotConnect,
    /// The connection dropped while the response was being received.
    NetworkConnectionLost,
    /// The transfer finished without a usable response.
    BadServerResponse,
    /// The transport cannot perform the requested kind of task.
    Unsupported,
    Unknown,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorKind::Cancelled => "cancelled",
            TransportErrorKind::TimedOut => "timed out",
            TransportErrorKind::CannotConnect => "cannot connect",
            TransportErrorKind::NetworkConnectionLost => "network connection lost",
            TransportErrorKind::BadServerResponse => "bad server response",
            TransportErrorKind::Unsupported => "unsupported",
            TransportErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A failure reported by the transport in a task's terminal event.
///
/// Downloads that stopped part-way may carry opaque resume data which can
/// be handed back to [`ApiClient::download_resuming`](crate::ApiClient::download_resuming).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    kind:        TransportErrorKind,
    message:     String,
    resume_data: Option<Bytes>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            resume_data: None,
        }
    }

    pub fn cancelled() -> Self {
        Self::new(TransportErrorKind::Cancelled, "task was cancelled")
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Unknown, message)
    }

    #[must_use]
    pub fn with_resume_data(mut self, resume_data: Bytes) -> Self {
        self.resume_data = Some(resume_data);
        self
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn resume_data(&self) -> Option<&Bytes> {
        self.resume_data.as_ref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == TransportErrorKind::Cancelled
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("response status code was unacceptable: {0}")]
    UnacceptableStatusCode(u16),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode response body: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("response body is not valid UTF-8: {0}")]
    Text(#[source] std::str::Utf8Error),

    #[error("failed to place downloaded file: {0}")]
    Fs(#[from] netbridge_fs::Error),

    #[error("delegate failed: {0}")]
    Delegate(String),

    #[error("task was abandoned before it completed")]
    Abandoned,
}

impl Error {
    /// The transport error behind this failure, if it is transport-level.
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Error::Transport(e) => Some(e),
            _ => None,
        }
    }

    /// `true` when the task ended because it was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.transport_error().is_some_and(TransportError::is_cancelled)
    }

    /// The rejected status code for validation failures.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::UnacceptableStatusCode(code) => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
