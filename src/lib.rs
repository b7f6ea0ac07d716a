//! # Tenant Dispatch
//!
//! A tenant-multiplexed, single-flight dispatch scheduler for remote message queues.
//!
//! Each distinct credential key selects one physical queue. Tenants (practice locations,
//! clinics, accounts) are registered against keys; tenants sharing a key are multiplexed
//! onto a single queue dispatcher. A background worker repeatedly drains every queue,
//! decodes each message into a typed event, hands it to an event dispatcher and
//! acknowledges the message only if processing succeeds.
//!
//! ## Key Properties
//!
//! - **Single-flight**: at most one drain cycle is ever in flight
//! - **At-least-once**: a message whose processing fails stays on its queue
//! - **Failure isolation**: a failing queue is skipped for the rest of a cycle; the others keep draining
//! - **Malformed messages**: logged and removed, never retried
//! - **Bounded shutdown**: `destroy()` waits a bounded time, then cancels
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tenant_dispatch::builders::SchedulerBuilder;
//! use tenant_dispatch::config::DispatchConfig;
//! use tenant_dispatch::core::{EventDispatcher, EventRouter, Tenant};
//! use tenant_dispatch::infra::{InMemoryBroker, InMemoryDirectory};
//!
//! let directory = Arc::new(InMemoryDirectory::new("events"));
//! let router: Arc<dyn EventDispatcher> = Arc::new(EventRouter::new());
//! let scheduler = SchedulerBuilder::new(
//!     directory,
//!     Arc::new(InMemoryBroker::new()),
//!     Arc::new(move |_: &Tenant| Ok(Arc::clone(&router))),
//! )
//! .with_config(DispatchConfig::from_env()?)
//! .with_tenants([Tenant::new(1, "Main Street")])
//! .build()?;
//!
//! // Tenant lifecycle notifications
//! scheduler.tenant_added(&Tenant::new(2, "Harbour Road"))?;
//!
//! scheduler.destroy();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core dispatch abstractions, registry and scheduler.
pub mod core;
/// Configuration models for scheduler timing.
pub mod config;
/// Builders to construct the scheduler from configuration.
pub mod builders;
/// Infrastructure adapters for queues and tenant directories.
pub mod infra;
/// Shared utilities.
pub mod util;
