//! Error types for dispatch operations.

use thiserror::Error;

/// A message whose content could not be turned into an [`Event`](crate::core::Event).
#[derive(Debug, Error)]
#[error("malformed message: {reason}")]
pub struct DecodeError {
    /// Why decoding failed.
    pub reason: String,
}

impl DecodeError {
    /// Create a decode error with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Raised by an [`EventDispatcher`](crate::core::EventDispatcher) when an event could not be applied.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ProcessingError(pub String);

impl ProcessingError {
    /// Create a processing error from any displayable cause.
    pub fn new(cause: impl std::fmt::Display) -> Self {
        Self(cause.to_string())
    }
}

/// Errors produced by queue dispatch components.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The queue could not be reached, or a read/acknowledge failed.
    #[error("transport error: {0}")]
    Transport(String),
    /// Message content was malformed.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// The event dispatcher failed; the message was left on the queue.
    #[error("processing failed for message {message_id}: {source}")]
    Processing {
        /// Transport identifier of the message that failed.
        message_id: String,
        /// Underlying failure.
        #[source]
        source: ProcessingError,
    },
    /// Missing service identity, credential key or connection details.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The unit of work could not be started, committed or rolled back.
    #[error("transaction error: {0}")]
    Transaction(String),
    /// The scheduler has been shut down.
    #[error("dispatcher shut down")]
    Shutdown,
}

impl DispatchError {
    /// True for failures of the remote queue itself.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Invalid configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A duration that must be strictly positive was zero.
    #[error("{0} must be greater than 0")]
    NonPositive(&'static str),
    /// Configuration text could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
