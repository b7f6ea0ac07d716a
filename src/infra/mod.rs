//! Infrastructure adapters for queue backends and tenant configuration.

pub mod directory;
pub mod queue;

pub use directory::InMemoryDirectory;
pub use queue::{InMemoryBroker, InMemoryQueue};
