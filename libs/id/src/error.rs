//! Error types for index parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The identifier string is empty.
    #[error("ID cannot be empty")]
    Empty,

    /// The identifier has an invalid prefix.
    #[error("invalid ID prefix: expected '{expected}', got '{actual}'")]
    InvalidPrefix {
        expected: &'static str,
        actual: String,
    },

    /// The identifier is missing the underscore separator.
    #[error("ID missing underscore separator")]
    MissingSeparator,

    /// The numeric portion could not be parsed.
    #[error("invalid number: {0}")]
    InvalidNumber(String),

    /// The value is outside the range allowed for this identifier.
    #[error("{kind} value {value} out of range (must be below {max})")]
    OutOfRange {
        kind: &'static str,
        value: u64,
        max: u64,
    },

    /// The RNTI is not usable as a UE identifier.
    #[error("RNTI {0:#x} is outside the C-RNTI range")]
    InvalidCrnti(u16),

    /// The numerology is not supported.
    #[error("invalid numerology {0}")]
    InvalidNumerology(u8),
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }

    /// Returns true if this error indicates a range violation.
    pub fn is_range_error(&self) -> bool {
        matches!(
            self,
            IdError::OutOfRange { .. } | IdError::InvalidCrnti(_) | IdError::InvalidNumerology(_)
        )
    }
}
