//! In-memory peek-and-acknowledge queues.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::core::{ConnectionParams, DispatchError, Message, Queue, QueueFactory};

#[derive(Default)]
struct QueueState {
    messages: VecDeque<Message>,
    removed: usize,
    failing_reads: usize,
    failing_removes: usize,
}

/// FIFO queue where `next` returns the head until it is removed.
pub struct InMemoryQueue {
    name: String,
    state: Mutex<QueueState>,
}

impl InMemoryQueue {
    /// Create an empty queue.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Append a message with a generated id and return the id.
    pub fn push(&self, content: impl Into<String>) -> String {
        let id = Uuid::new_v4().to_string();
        self.push_message(Message::new(id.clone(), content));
        id
    }

    /// Append a message.
    pub fn push_message(&self, message: Message) {
        self.state.lock().messages.push_back(message);
    }

    /// Unacknowledged messages, oldest first.
    #[must_use]
    pub fn pending(&self) -> Vec<Message> {
        self.state.lock().messages.iter().cloned().collect()
    }

    /// Number of unacknowledged messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().messages.len()
    }

    /// True if every message has been acknowledged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().messages.is_empty()
    }

    /// Number of successful removals.
    #[must_use]
    pub fn removed(&self) -> usize {
        self.state.lock().removed
    }

    /// Make the next `count` reads fail with a transport error.
    pub fn fail_reads(&self, count: usize) {
        self.state.lock().failing_reads = count;
    }

    /// Make the next `count` removals fail with a transport error.
    pub fn fail_removes(&self, count: usize) {
        self.state.lock().failing_removes = count;
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    async fn next(&self) -> Result<Option<Message>, DispatchError> {
        let mut state = self.state.lock();
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(DispatchError::Transport(format!("{}: read failed", self.name)));
        }
        Ok(state.messages.front().cloned())
    }

    async fn remove(&self, message: &Message) -> Result<(), DispatchError> {
        let mut state = self.state.lock();
        if state.failing_removes > 0 {
            state.failing_removes -= 1;
            return Err(DispatchError::Transport(format!("{}: remove failed", self.name)));
        }
        let Some(pos) = state.messages.iter().position(|m| m.id == message.id) else {
            return Err(DispatchError::Transport(format!(
                "{}: unknown message {}",
                self.name, message.id
            )));
        };
        state.messages.remove(pos);
        state.removed += 1;
        Ok(())
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

/// Hands out one shared [`InMemoryQueue`] per set of connection parameters.
#[derive(Default)]
pub struct InMemoryBroker {
    queues: Mutex<HashMap<ConnectionParams, Arc<InMemoryQueue>>>,
}

impl InMemoryBroker {
    /// Create an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The queue for `params`, created on first use.
    pub fn queue(&self, params: &ConnectionParams) -> Arc<InMemoryQueue> {
        let mut queues = self.queues.lock();
        Arc::clone(
            queues
                .entry(params.clone())
                .or_insert_with(|| Arc::new(InMemoryQueue::new(params.to_string()))),
        )
    }
}

impl QueueFactory for InMemoryBroker {
    fn create(&self, params: &ConnectionParams) -> Result<Arc<dyn Queue>, DispatchError> {
        let queue: Arc<dyn Queue> = self.queue(params);
        Ok(queue)
    }
}
