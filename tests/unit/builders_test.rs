//! Tests for builders

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tenant_dispatch::builders::SchedulerBuilder;
use tenant_dispatch::config::DispatchConfig;
use tenant_dispatch::core::{
    AuditAction, ConnectionParams, CredentialKey, DispatchError, EventDispatcher, EventRouter,
    InMemoryAuditSink, ServiceIdentity, Tenant,
};
use tenant_dispatch::infra::{InMemoryBroker, InMemoryDirectory};

fn builder(directory: &Arc<InMemoryDirectory>, broker: &Arc<InMemoryBroker>) -> SchedulerBuilder {
    let router: Arc<dyn EventDispatcher> = Arc::new(EventRouter::new());
    SchedulerBuilder::new(
        directory.clone(),
        broker.clone(),
        Arc::new(move |_: &Tenant| -> Result<Arc<dyn EventDispatcher>, DispatchError> {
            Ok(Arc::clone(&router))
        }),
    )
}

#[test]
fn test_builder_registers_tenants_and_polls() {
    let directory = Arc::new(InMemoryDirectory::new("events"));
    directory.set_identity(Some(ServiceIdentity::new("svc")));
    let main = Tenant::new(1, "Main Street");
    let harbour = Tenant::new(2, "Harbour Road");
    directory.set_key(main.id, Some(CredentialKey::new("K1")));
    directory.set_key(harbour.id, Some(CredentialKey::new("K1")));
    let broker = Arc::new(InMemoryBroker::new());
    let queue = broker.queue(&ConnectionParams::new("K1", "events"));
    let id = queue.push(r#"{"eventType":"notes.entered","object":[]}"#);
    let audit = Arc::new(InMemoryAuditSink::new(16));

    let scheduler = builder(&directory, &broker)
        .with_config(DispatchConfig::new().with_poll_interval(Duration::from_millis(20)))
        .with_audit(audit.clone())
        .with_tenants([main, harbour])
        .build()
        .unwrap();

    assert_eq!(scheduler.dispatchers().len(), 1);
    let deadline = Instant::now() + Duration::from_secs(5);
    while !queue.is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(queue.is_empty());
    assert_eq!(audit.for_message(&id)[0].action, AuditAction::Processed);
    assert!(scheduler.destroy());
}

#[test]
fn test_builder_rejects_invalid_config() {
    let directory = Arc::new(InMemoryDirectory::new("events"));
    let broker = Arc::new(InMemoryBroker::new());

    let result = builder(&directory, &broker)
        .with_config(DispatchConfig::new().with_failure_interval(Duration::ZERO))
        .build();

    assert!(result.is_err());
}

#[test]
fn test_builder_skips_unconstructible_tenants() {
    let directory = Arc::new(InMemoryDirectory::new("events"));
    let broken = Tenant::new(1, "No Key");
    directory.set_key(broken.id, Some(CredentialKey::new("")));
    let broker = Arc::new(InMemoryBroker::new());

    let scheduler = builder(&directory, &broker)
        .with_tenants([broken])
        .build()
        .unwrap();

    assert!(scheduler.dispatchers().is_empty());
    assert_eq!(scheduler.cycles(), 0);
    assert!(scheduler.destroy());
}
