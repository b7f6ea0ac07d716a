//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use tenant_dispatch::config::DispatchConfig;
use tenant_dispatch::core::{
    ConnectionParams, CredentialKey, DispatchContext, DispatchError, Event, EventDispatcher,
    InMemoryAuditSink, ProcessingError, QueueDispatcherFactory, QueueDispatchers,
    ScheduledDispatcher, ServiceIdentity, Tenant, TenantId, Transaction, TransactionBoundary,
};
use tenant_dispatch::infra::{InMemoryBroker, InMemoryDirectory, InMemoryQueue};

pub const QUEUE_NAME: &str = "events";

/// Event dispatcher that records what it processed and fails on chosen event types.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub processed: Mutex<Vec<(TenantId, Event)>>,
    attempts: AtomicUsize,
    fail_types: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    panic_next: AtomicBool,
}

impl RecordingDispatcher {
    pub fn fail_on(&self, event_type: &str) {
        self.fail_types.lock().insert(event_type.to_string());
    }

    /// Panic on the next dispatch only.
    pub fn panic_once(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn processed_types(&self) -> Vec<String> {
        self.processed
            .lock()
            .iter()
            .map(|(_, e)| e.event_type.clone())
            .collect()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventDispatcher for RecordingDispatcher {
    async fn dispatch(&self, event: &Event, ctx: &DispatchContext) -> Result<(), ProcessingError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("processor bug on {}", event.event_type);
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_types.lock().contains(&event.event_type) {
            return Err(ProcessingError::new(format!("cannot apply {}", event.event_type)));
        }
        self.processed.lock().push((ctx.tenant.id, event.clone()));
        Ok(())
    }
}

/// Transaction boundary counting how units of work end.
#[derive(Default)]
pub struct CountingTransactions {
    pub begun: Arc<AtomicUsize>,
    pub committed: Arc<AtomicUsize>,
    pub rolled_back: Arc<AtomicUsize>,
    pub fail_begin: AtomicBool,
    pub fail_commit: AtomicBool,
}

impl CountingTransactions {
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.begun.load(Ordering::SeqCst),
            self.committed.load(Ordering::SeqCst),
            self.rolled_back.load(Ordering::SeqCst),
        )
    }
}

struct CountingTransaction {
    committed: Arc<AtomicUsize>,
    rolled_back: Arc<AtomicUsize>,
    fail_commit: bool,
}

#[async_trait]
impl Transaction for CountingTransaction {
    async fn commit(self: Box<Self>) -> Result<(), DispatchError> {
        if self.fail_commit {
            return Err(DispatchError::Transaction("commit failed".into()));
        }
        self.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DispatchError> {
        self.rolled_back.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl TransactionBoundary for CountingTransactions {
    async fn begin(&self) -> Result<Box<dyn Transaction>, DispatchError> {
        if self.fail_begin.load(Ordering::SeqCst) {
            return Err(DispatchError::Transaction("no connection".into()));
        }
        self.begun.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingTransaction {
            committed: Arc::clone(&self.committed),
            rolled_back: Arc::clone(&self.rolled_back),
            fail_commit: self.fail_commit.load(Ordering::SeqCst),
        }))
    }
}

/// Broker, directory and registry wired with a recording dispatcher.
pub struct Fixture {
    pub broker: Arc<InMemoryBroker>,
    pub directory: Arc<InMemoryDirectory>,
    pub recorder: Arc<RecordingDispatcher>,
    pub transactions: Arc<CountingTransactions>,
    pub audit: Arc<InMemoryAuditSink>,
    pub registry: Arc<QueueDispatchers>,
}

impl Fixture {
    pub fn new() -> Self {
        tenant_dispatch::util::init_tracing();
        let broker = Arc::new(InMemoryBroker::new());
        let directory = Arc::new(InMemoryDirectory::new(QUEUE_NAME));
        directory.set_identity(Some(identity()));
        let recorder = Arc::new(RecordingDispatcher::default());
        let transactions = Arc::new(CountingTransactions::default());
        let audit = Arc::new(InMemoryAuditSink::new(1000));

        let shared: Arc<dyn EventDispatcher> = recorder.clone();
        let factory = QueueDispatcherFactory::new(
            directory.clone(),
            broker.clone(),
            Arc::new(move |_: &Tenant| -> Result<Arc<dyn EventDispatcher>, DispatchError> {
                Ok(Arc::clone(&shared))
            }),
        )
        .with_transactions(transactions.clone())
        .with_audit(audit.clone());
        let registry = Arc::new(QueueDispatchers::new(directory.clone(), Arc::new(factory)));

        Self {
            broker,
            directory,
            recorder,
            transactions,
            audit,
            registry,
        }
    }

    /// Tenant `id` configured with `key`.
    pub fn tenant(&self, id: u64, key: Option<&str>) -> Tenant {
        let tenant = Tenant::new(id, format!("Location {id}"));
        self.directory.set_key(tenant.id, key.map(CredentialKey::new));
        tenant
    }

    pub fn queue(&self, key: &str) -> Arc<InMemoryQueue> {
        self.broker.queue(&ConnectionParams::new(key, QUEUE_NAME))
    }

    pub fn scheduler(&self, config: &DispatchConfig) -> ScheduledDispatcher {
        ScheduledDispatcher::new(Arc::clone(&self.registry), config).unwrap()
    }
}

pub fn fast_config() -> DispatchConfig {
    DispatchConfig::new()
        .with_poll_interval(Duration::from_millis(20))
        .with_failure_interval(Duration::from_millis(40))
        .with_shutdown_timeout(Duration::from_secs(5))
}

pub fn event_json(event_type: &str) -> String {
    format!(r#"{{"clinicApiKey":"clinic-1","eventType":"{event_type}","object":{{"id":"H1"}}}}"#)
}

pub fn identity() -> ServiceIdentity {
    ServiceIdentity::new("smartflow-service")
}

pub fn key(key: &str) -> CredentialKey {
    CredentialKey::new(key)
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}
