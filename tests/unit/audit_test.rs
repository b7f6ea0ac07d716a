//! Tests for audit sink

use tenant_dispatch::core::{
    build_audit_event, AuditAction, AuditSink, CredentialKey, InMemoryAuditSink, TenantId,
};

#[test]
fn test_in_memory_audit_sink() {
    let sink = InMemoryAuditSink::new(10);
    let key = CredentialKey::new("K1");

    sink.record(build_audit_event("m-1", TenantId(1), &key, AuditAction::Processed, None));
    sink.record(build_audit_event(
        "m-2",
        TenantId(1),
        &key,
        AuditAction::Discarded,
        Some("missing eventType".into()),
    ));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].message_id, "m-1");
    assert_eq!(events[1].action, AuditAction::Discarded);
    assert_eq!(events[1].detail.as_deref(), Some("missing eventType"));
    assert_ne!(events[0].event_id, events[1].event_id);
    assert_eq!(sink.for_message("m-2").len(), 1);
}

#[test]
fn test_audit_sink_overflow() {
    let sink = InMemoryAuditSink::new(2);
    let key = CredentialKey::new("K1");

    for id in ["m-1", "m-2", "m-3"] {
        sink.record(build_audit_event(id, TenantId(4), &key, AuditAction::Failed, None));
    }

    let ids: Vec<String> = sink.events().into_iter().map(|e| e.message_id).collect();
    assert_eq!(ids, vec!["m-2", "m-3"]);
}

#[test]
fn test_audit_event_serializes() {
    let event = build_audit_event(
        "m-1",
        TenantId(2),
        &CredentialKey::new("K2"),
        AuditAction::Processed,
        None,
    );
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["action"], "processed");
    assert_eq!(json["tenant"], 2);
    assert_eq!(json["key"], "K2");
}
