//! Event envelope - the common wrapper for all queued events.

use chrono::{DateTime, Utc};
use nrsched_id::{CellIndex, EventId};
use serde::{Deserialize, Serialize};

use crate::{EventError, UeEvent};

/// Where an event is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "kind", content = "cell_index")]
pub enum EventScope {
    /// Applied once per slot, by the first cell to run that slot.
    #[default]
    Common,
    /// Applied by the slot pipeline of the given cell.
    Cell(CellIndex),
}

impl std::fmt::Display for EventScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventScope::Common => write!(f, "common"),
            EventScope::Cell(cell_index) => write!(f, "{}", cell_index),
        }
    }
}

/// The event envelope - common metadata for all events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<P> {
    /// Monotonic identifier assigned on enqueue.
    pub event_id: EventId,

    /// When the event was enqueued.
    pub occurred_at: DateTime<Utc>,

    /// Where the event is applied.
    pub scope: EventScope,

    /// The event type (e.g., "ue.created", "ue.uci_indication").
    pub event_type: String,

    /// Event-specific payload.
    pub payload: P,
}

impl<P> EventEnvelope<P> {
    /// Creates a new event envelope builder.
    pub fn builder() -> EventEnvelopeBuilder<P> {
        EventEnvelopeBuilder::new()
    }
}

impl EventEnvelope<UeEvent> {
    /// Wraps a UE event, deriving type and scope from the payload.
    ///
    /// The payload is validated first.
    pub fn for_ue_event(event_id: EventId, event: UeEvent) -> Result<Self, EventError> {
        event.validate()?;
        EventEnvelope::builder()
            .event_id(event_id)
            .scope(event.scope())
            .event_type(event.event_type())
            .payload(event)
            .build()
    }

    /// Checks that the envelope scope agrees with what the payload requires.
    pub fn check_scope(&self) -> Result<(), EventError> {
        let required = self.payload.scope();
        if let EventScope::Cell(expected) = required {
            if self.scope != required {
                return Err(EventError::ScopeMismatch {
                    event_type: self.payload.event_type(),
                    expected,
                    actual: self.scope.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Builder for constructing event envelopes.
#[derive(Debug)]
pub struct EventEnvelopeBuilder<P> {
    event_id: Option<EventId>,
    occurred_at: Option<DateTime<Utc>>,
    scope: EventScope,
    event_type: Option<String>,
    payload: Option<P>,
}

impl<P> EventEnvelopeBuilder<P> {
    pub fn new() -> Self {
        Self {
            event_id: None,
            occurred_at: None,
            scope: EventScope::Common,
            event_type: None,
            payload: None,
        }
    }

    pub fn event_id(mut self, id: EventId) -> Self {
        self.event_id = Some(id);
        self
    }

    pub fn occurred_at(mut self, ts: DateTime<Utc>) -> Self {
        self.occurred_at = Some(ts);
        self
    }

    pub fn scope(mut self, scope: EventScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn cell(mut self, cell_index: CellIndex) -> Self {
        self.scope = EventScope::Cell(cell_index);
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn payload(mut self, payload: P) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Builds the event envelope.
    ///
    /// Fails if `event_id`, `event_type` or `payload` were not set.
    pub fn build(self) -> Result<EventEnvelope<P>, EventError> {
        Ok(EventEnvelope {
            event_id: self.event_id.ok_or(EventError::MissingField("event_id"))?,
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
            scope: self.scope,
            event_type: self
                .event_type
                .ok_or(EventError::MissingField("event_type"))?,
            payload: self.payload.ok_or(EventError::MissingField("payload"))?,
        })
    }
}

impl<P> Default for EventEnvelopeBuilder<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{UeRemovedPayload, UlBsrPayload};
    use nrsched_id::{Rnti, UeIndex};

    #[test]
    fn test_event_scope_serialization() {
        assert_eq!(
            serde_json::to_string(&EventScope::Common).unwrap(),
            r#"{"kind":"common"}"#
        );
        assert_eq!(
            serde_json::to_string(&EventScope::Cell(CellIndex::new(2).unwrap())).unwrap(),
            r#"{"kind":"cell","cell_index":2}"#
        );
    }

    #[test]
    fn test_event_scope_display() {
        assert_eq!(EventScope::Common.to_string(), "common");
        assert_eq!(
            EventScope::Cell(CellIndex::new(1).unwrap()).to_string(),
            "cell_1"
        );
    }

    #[test]
    fn test_event_envelope_builder() {
        let envelope = EventEnvelope::<serde_json::Value>::builder()
            .event_id(EventId::new(1))
            .event_type("ue.removed")
            .payload(serde_json::json!({"ue_index": 4}))
            .build()
            .unwrap();

        assert_eq!(envelope.event_type, "ue.removed");
        assert_eq!(envelope.scope, EventScope::Common);
    }

    #[test]
    fn test_event_envelope_builder_missing_field() {
        let result = EventEnvelope::<serde_json::Value>::builder()
            .event_id(EventId::new(1))
            .payload(serde_json::json!({}))
            .build();
        assert_eq!(result.unwrap_err(), EventError::MissingField("event_type"));
    }

    #[test]
    fn test_for_ue_event_derives_scope() {
        let cell_index = CellIndex::new(3).unwrap();
        let envelope = EventEnvelope::for_ue_event(
            EventId::new(7),
            UeEvent::UlBsr(UlBsrPayload {
                cell_index,
                crnti: Rnti::new_crnti(0x4601).unwrap(),
                reported_bytes: 1500,
            }),
        )
        .unwrap();
        assert_eq!(envelope.scope, EventScope::Cell(cell_index));
        assert_eq!(envelope.event_type, "ue.ul_bsr");
        assert!(envelope.check_scope().is_ok());
    }

    #[test]
    fn test_check_scope_mismatch() {
        let cell_index = CellIndex::new(3).unwrap();
        let envelope = EventEnvelope::builder()
            .event_id(EventId::new(8))
            .event_type("ue.ul_bsr")
            .payload(UeEvent::UlBsr(UlBsrPayload {
                cell_index,
                crnti: Rnti::new_crnti(0x4601).unwrap(),
                reported_bytes: 0,
            }))
            .build()
            .unwrap();
        assert!(matches!(
            envelope.check_scope(),
            Err(EventError::ScopeMismatch { .. })
        ));

        let common = EventEnvelope::for_ue_event(
            EventId::new(9),
            UeEvent::Removed(UeRemovedPayload {
                ue_index: UeIndex::new(0).unwrap(),
            }),
        )
        .unwrap();
        assert!(common.check_scope().is_ok());
    }
}
