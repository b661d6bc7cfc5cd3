//! Error types for event handling.

use nrsched_id::{CellIndex, Rnti, UeIndex};
use thiserror::Error;

/// Errors that can occur when building or validating events.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// A required envelope field was not set.
    #[error("missing required envelope field: {0}")]
    MissingField(&'static str),

    /// The event payload is invalid.
    #[error("invalid event payload: {0}")]
    InvalidPayload(String),

    /// The event scope does not match the payload.
    #[error("event {event_type} must be scoped to cell {expected}, got {actual}")]
    ScopeMismatch {
        event_type: &'static str,
        expected: CellIndex,
        actual: String,
    },

    /// The RNTI cannot address a UE.
    #[error("rnti={0}: not a C-RNTI")]
    InvalidRnti(Rnti),

    /// A UE lists the same serving cell twice.
    #[error("ue={ue_index}: duplicate serving cell {cell_index}")]
    DuplicateServingCell {
        ue_index: UeIndex,
        cell_index: CellIndex,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Serialization(err.to_string())
    }
}
