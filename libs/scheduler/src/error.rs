//! Error types for the UE scheduler.

use nrsched_events::EventError;
use nrsched_id::{CellIndex, HarqId, Rnti, UeIndex};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors returned by scheduler configuration and event handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Invalid expert configuration.
    #[error("invalid scheduler configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// A cell with this index was already added.
    #[error("{0} already configured")]
    CellAlreadyConfigured(CellIndex),

    /// The cell is not configured in this scheduler.
    #[error("{0} not configured")]
    CellNotConfigured(CellIndex),

    /// All cells of one scheduler must share the same numerology.
    #[error("{cell_index}: numerology {actual} differs from scheduler numerology {expected}")]
    NumerologyMismatch {
        cell_index: CellIndex,
        expected: u8,
        actual: u8,
    },

    /// No scheduling strategy with the given name exists.
    #[error("unknown scheduler strategy: {0}")]
    UnknownStrategy(String),

    /// The UE index is already in use.
    #[error("{0} already exists")]
    UeIndexInUse(UeIndex),

    /// The RNTI is already assigned to another UE.
    #[error("rnti={rnti} already assigned to {ue_index}")]
    RntiInUse { rnti: Rnti, ue_index: UeIndex },

    /// No UE with this index exists.
    #[error("{0} not found")]
    UeNotFound(UeIndex),

    /// No UE with this RNTI exists.
    #[error("rnti={0} not found")]
    RntiNotFound(Rnti),

    /// The UE is not served by the cell.
    #[error("{ue_index} not served by {cell_index}")]
    CellNotServing {
        ue_index: UeIndex,
        cell_index: CellIndex,
    },

    /// Invalid event.
    #[error(transparent)]
    Event(#[from] EventError),
}

impl SchedulerError {
    /// Returns true if the error refers to an entity that does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SchedulerError::CellNotConfigured(_)
                | SchedulerError::UeNotFound(_)
                | SchedulerError::RntiNotFound(_)
        )
    }
}

/// Reasons why a grant could not be placed in the resource grid.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The cell does not take part in this allocation round.
    #[error("{0} not part of the allocation")]
    CellNotFound(CellIndex),

    /// No DL transmission possible in this slot.
    #[error("DL not enabled in this slot")]
    DlDisabled,

    /// PDSCH not allowed in this slot (CSI-RS present).
    #[error("PDSCH not allowed in this slot")]
    PdschNotAllowed,

    /// No UL slot found within the k2 window.
    #[error("no UL slot available for PUSCH")]
    NoUlSlot,

    /// No UL slot found within the k1 window.
    #[error("no UL slot available for HARQ-ACK")]
    NoFeedbackSlot,

    /// Control-channel capacity exhausted.
    #[error("no PDCCH space left")]
    PdcchExhausted,

    /// UL control capacity exhausted.
    #[error("no PUCCH space left")]
    PucchExhausted,

    /// Per-slot UE grant limit reached.
    #[error("grant limit reached")]
    GrantLimit,

    /// Not enough PRBs left.
    #[error("requested {requested} PRBs, {available} available")]
    PrbsExhausted { requested: u32, available: u32 },

    /// The UE does not exist.
    #[error("{0} not found")]
    UeNotFound(UeIndex),

    /// The UE is not served by the cell.
    #[error("{ue_index} not served by {cell_index}")]
    CellNotServing {
        ue_index: UeIndex,
        cell_index: CellIndex,
    },

    /// The HARQ process is not in the state the grant requires.
    #[error("{0} not available")]
    HarqNotAvailable(HarqId),

    /// The UE already has a grant of this direction in the slot.
    #[error("{0} already has a grant in this slot")]
    UeAlreadyAllocated(UeIndex),
}

impl AllocError {
    /// Returns true if no further grant of the same direction can be placed
    /// in the cell during this slot.
    pub fn is_cell_exhausted(&self) -> bool {
        matches!(
            self,
            AllocError::DlDisabled
                | AllocError::PdschNotAllowed
                | AllocError::NoUlSlot
                | AllocError::NoFeedbackSlot
                | AllocError::PdcchExhausted
                | AllocError::GrantLimit
                | AllocError::PrbsExhausted { .. }
        )
    }
}
