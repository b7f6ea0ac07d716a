//! Peek-and-acknowledge message source abstraction.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::DispatchError;

/// Connection details resolved for a tenant's queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Identifies the remote endpoint (account, namespace or API key scope).
    pub connection_identifier: String,
    /// Name of the queue at that endpoint.
    pub queue_name: String,
}

impl ConnectionParams {
    /// Create connection parameters.
    pub fn new(connection_identifier: impl Into<String>, queue_name: impl Into<String>) -> Self {
        Self {
            connection_identifier: connection_identifier.into(),
            queue_name: queue_name.into(),
        }
    }
}

impl fmt::Display for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.connection_identifier, self.queue_name)
    }
}

/// An unacknowledged message read from a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Transport identifier; `remove` acknowledges by this id.
    pub id: String,
    /// Raw content, decoded by an [`EventDecoder`](crate::core::EventDecoder).
    pub content: String,
}

impl Message {
    /// Create a message.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }
}

/// A remote queue that hands out the oldest unacknowledged message until it is removed.
///
/// Implementations bound every remote call with their own timeout; `next` must never
/// block indefinitely. Failures are reported as [`DispatchError::Transport`], which is
/// distinct from an empty queue (`Ok(None)`).
#[async_trait]
pub trait Queue: Send + Sync {
    /// Return the oldest unacknowledged message, if any.
    async fn next(&self) -> Result<Option<Message>, DispatchError>;

    /// Durably delete `message`. Removing an unknown or already-removed message
    /// fails without altering queue state.
    async fn remove(&self, message: &Message) -> Result<(), DispatchError>;

    /// Human readable queue name for logs.
    fn name(&self) -> String;
}

/// Creates queue clients from connection details.
pub trait QueueFactory: Send + Sync {
    /// Connect to the queue described by `params`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Configuration`] or [`DispatchError::Transport`] when the
    /// queue cannot be constructed.
    fn create(&self, params: &ConnectionParams) -> Result<Arc<dyn Queue>, DispatchError>;
}
