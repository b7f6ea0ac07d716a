//! Benchmarks for the dispatch path.
//!
//! Benchmarks cover:
//! - Envelope decoding
//! - Draining an in-memory queue through a `QueueDispatcher`
//! - Registry churn on shared credential keys

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::runtime::Runtime;

use tenant_dispatch::core::{
    ConnectionParams, CredentialKey, DispatchContext, DispatchError, Event, EventDecoder,
    EventDispatcher, JsonEventDecoder, ProcessingError, QueueDispatcher,
    QueueDispatcherFactory, QueueDispatchers, ServiceIdentity, Tenant,
};
use tenant_dispatch::infra::{InMemoryBroker, InMemoryDirectory};

// ============================================================================
// Fixtures
// ============================================================================

struct NoOpDispatcher;

#[async_trait]
impl EventDispatcher for NoOpDispatcher {
    async fn dispatch(&self, event: &Event, _ctx: &DispatchContext) -> Result<(), ProcessingError> {
        black_box(event);
        Ok(())
    }
}

fn envelope(id: u64) -> String {
    format!(
        r#"{{"clinicApiKey":"clinic-{}","eventType":"treatment.record_entered","object":{{"id":{id},"medication":"Meloxicam"}}}}"#,
        id % 8
    )
}

fn registry() -> (Arc<InMemoryDirectory>, QueueDispatchers) {
    let broker = Arc::new(InMemoryBroker::new());
    let directory = Arc::new(InMemoryDirectory::new("events"));
    let dispatcher: Arc<dyn EventDispatcher> = Arc::new(NoOpDispatcher);
    let factory = QueueDispatcherFactory::new(
        directory.clone(),
        broker,
        Arc::new(move |_: &Tenant| -> Result<Arc<dyn EventDispatcher>, DispatchError> {
            Ok(Arc::clone(&dispatcher))
        }),
    );
    let registry = QueueDispatchers::new(directory.clone(), Arc::new(factory));
    (directory, registry)
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let content = envelope(42);
    c.bench_function("decode_single_treatment", |b| {
        b.iter(|| JsonEventDecoder.decode(black_box(&content)).unwrap());
    });
}

fn bench_drain_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("drain_queue");
    let identity = ServiceIdentity::new("bench");

    for size in [100u64, 1_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.to_async(Runtime::new().unwrap()).iter(|| {
                let identity = identity.clone();
                async move {
                    let broker = InMemoryBroker::new();
                    let queue = broker.queue(&ConnectionParams::new("K1", "events"));
                    for i in 0..size {
                        queue.push(envelope(i));
                    }
                    let dispatcher = QueueDispatcher::new(
                        CredentialKey::new("K1"),
                        Tenant::new(1, "Bench"),
                        queue,
                        Arc::new(JsonEventDecoder),
                        Arc::new(NoOpDispatcher),
                    );
                    let mut count = 0;
                    while dispatcher.dispatch(&identity).await.unwrap() {
                        count += 1;
                    }
                    black_box(count);
                }
            });
        });
    }
    group.finish();
}

fn bench_registry_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_churn");

    for tenants in [10u64, 100] {
        group.throughput(Throughput::Elements(tenants));
        group.bench_with_input(BenchmarkId::from_parameter(tenants), &tenants, |b, &tenants| {
            b.iter(|| {
                let (directory, registry) = registry();
                let all: Vec<Tenant> = (1..=tenants)
                    .map(|id| {
                        let tenant = Tenant::new(id, format!("Location {id}"));
                        directory.set_key(tenant.id, Some(CredentialKey::new(format!("K{}", id % 4))));
                        tenant
                    })
                    .collect();
                for tenant in &all {
                    registry.add(tenant).unwrap();
                }
                // Removing in insertion order forces a promotion on every shared key.
                for tenant in &all {
                    black_box(registry.remove(tenant));
                }
                assert!(registry.is_empty());
            });
        });
    }
    group.finish();
}

criterion_group!(dispatch_benches, bench_decode, bench_drain_queue, bench_registry_churn);
criterion_main!(dispatch_benches);
