//! Core dispatch abstractions: queues, events, the tenant registry and the scheduler.

pub mod audit;
pub mod error;
pub mod event;
pub mod listeners;
pub mod processor;
pub mod queue;
pub mod queue_dispatcher;
pub mod registry;
pub mod scheduler;
pub mod sync;
pub mod tenant;
pub mod transaction;
pub mod worker_pool;

pub use audit::{build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink};
pub use error::{AppResult, ConfigError, DecodeError, DispatchError, ProcessingError};
pub use event::{Event, EventDecoder, EventKind, JsonEventDecoder};
pub use listeners::{Listener, ListenerId, ListenerRegistry};
pub use processor::{EventDispatcher, EventDispatcherFactory, EventProcessor, EventRouter};
pub use queue::{ConnectionParams, Message, Queue, QueueFactory};
pub use queue_dispatcher::QueueDispatcher;
pub use registry::{DispatcherFactory, QueueDispatcherFactory, QueueDispatchers, TenantDirectory};
pub use scheduler::{ScheduledDispatcher, SchedulerState};
pub use sync::{PauseOutcome, PauseSignal, PermitGuard, RunPermit};
pub use tenant::{CredentialKey, DispatchContext, ServiceIdentity, Tenant, TenantId};
pub use transaction::{NoTransactions, Transaction, TransactionBoundary};
pub use worker_pool::{CyclePool, Job, PoolError, PoolStats, WorkerContext};
