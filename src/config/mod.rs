//! Configuration models for the dispatch scheduler.

pub mod dispatch;

pub use dispatch::{DispatchConfig, FAILURE_INTERVAL_ENV, POLL_INTERVAL_ENV, SHUTDOWN_TIMEOUT_ENV};
