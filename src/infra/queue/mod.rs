//! Queue backends.

pub mod memory;

pub use memory::{InMemoryBroker, InMemoryQueue};
