//! Tests for event decoding

use tenant_dispatch::core::{EventDecoder, EventKind, JsonEventDecoder};

fn envelope(event_type: &str, object: &str) -> String {
    format!(r#"{{"clinicApiKey":"c-9","eventType":"{event_type}","object":{object}}}"#)
}

#[test]
fn test_event_type_mapping() {
    let cases = [
        ("hospitalizations.created", EventKind::Admission, false),
        ("hospitalization.created", EventKind::Admission, true),
        ("hospitalizations.discharged", EventKind::Discharge, false),
        ("hospitalization.discharged", EventKind::Discharge, true),
        ("treatments.records_entered", EventKind::Treatment, false),
        ("treatment.record_entered", EventKind::Treatment, true),
        ("inventoryitems.imported", EventKind::InventoryImported, false),
        ("medics.imported", EventKind::MedicsImported, false),
        ("notes.entered", EventKind::Notes, false),
        ("anesthetics.finalized", EventKind::Anesthetics, false),
        ("invoices.paid", EventKind::Unsupported, false),
    ];
    for (event_type, kind, single) in cases {
        assert_eq!(EventKind::from_event_type(event_type), (kind, single), "{event_type}");
    }
}

#[test]
fn test_list_forms_pass_through() {
    let event = JsonEventDecoder
        .decode(&envelope("treatments.records_entered", r#"[{"id":1},{"id":2}]"#))
        .unwrap();

    assert_eq!(event.kind, EventKind::Treatment);
    assert_eq!(event.object.as_array().map(Vec::len), Some(2));
    assert_eq!(event.clinic_api_key.as_deref(), Some("c-9"));
}

#[test]
fn test_single_forms_are_wrapped() {
    let event = JsonEventDecoder
        .decode(&envelope("treatment.record_entered", r#"{"id":1}"#))
        .unwrap();

    assert_eq!(event.object, serde_json::json!([{"id": 1}]));
    assert_eq!(event.event_type, "treatment.record_entered");
}

#[test]
fn test_malformed_content_fails() {
    for content in ["", "[]", "{\"eventType\":", r#"{"eventType":""}"#, r#"{"eventType":"medics.imported"}"#] {
        assert!(JsonEventDecoder.decode(content).is_err(), "{content}");
    }
}
