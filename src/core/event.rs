//! Typed events and decoding of raw message content.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::DecodeError;

/// The kind of an event, used to route it to a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// One or more patients admitted.
    Admission,
    /// One or more patients discharged.
    Discharge,
    /// Treatment records entered.
    Treatment,
    /// Inventory import finished on the remote side.
    InventoryImported,
    /// Medic (clinician) import finished on the remote side.
    MedicsImported,
    /// Clinical notes entered.
    Notes,
    /// Anaesthetic sheets finalised.
    Anesthetics,
    /// An event type this crate does not recognise.
    Unsupported,
}

impl EventKind {
    /// Map a wire `eventType` onto a kind. The second element is true when the wire
    /// form carries a single object rather than a list.
    #[must_use]
    pub fn from_event_type(event_type: &str) -> (Self, bool) {
        match event_type {
            "hospitalizations.created" => (Self::Admission, false),
            "hospitalization.created" => (Self::Admission, true),
            "hospitalizations.discharged" => (Self::Discharge, false),
            "hospitalization.discharged" => (Self::Discharge, true),
            "treatments.records_entered" => (Self::Treatment, false),
            "treatment.record_entered" => (Self::Treatment, true),
            "inventoryitems.imported" => (Self::InventoryImported, false),
            "medics.imported" => (Self::MedicsImported, false),
            "notes.entered" => (Self::Notes, false),
            "anesthetics.finalized" => (Self::Anesthetics, false),
            _ => (Self::Unsupported, false),
        }
    }
}

/// An immutable, decoded message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Routing kind.
    pub kind: EventKind,
    /// The wire event type, preserved for unsupported events and logs.
    pub event_type: String,
    /// Key of the clinic that produced the event, if supplied.
    pub clinic_api_key: Option<String>,
    /// Event body. Single-object wire forms are normalised into a one-element array.
    pub object: Value,
}

/// Turns raw message content into an [`Event`].
pub trait EventDecoder: Send + Sync {
    /// Decode `content`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] for malformed content. Such messages are discarded.
    fn decode(&self, content: &str) -> Result<Event, DecodeError>;
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "clinicApiKey")]
    clinic_api_key: Option<String>,
    #[serde(rename = "eventType")]
    event_type: Option<String>,
    #[serde(default)]
    object: Value,
}

/// Decodes the JSON envelope `{"clinicApiKey", "eventType", "object"}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEventDecoder;

impl EventDecoder for JsonEventDecoder {
    fn decode(&self, content: &str) -> Result<Event, DecodeError> {
        let envelope: Envelope =
            serde_json::from_str(content).map_err(|e| DecodeError::new(e.to_string()))?;
        let event_type = envelope
            .event_type
            .filter(|t| !t.is_empty())
            .ok_or_else(|| DecodeError::new("missing eventType"))?;
        let (kind, single) = EventKind::from_event_type(&event_type);
        let object = match envelope.object {
            Value::Null if kind == EventKind::Unsupported => Value::Null,
            Value::Null => return Err(DecodeError::new(format!("{event_type} has no object"))),
            value if single => Value::Array(vec![value]),
            value => value,
        };
        Ok(Event {
            kind,
            event_type,
            clinic_api_key: envelope.clinic_api_key,
            object,
        })
    }
}
