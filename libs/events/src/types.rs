//! Event type definitions for all UE-directed scheduler events.
//!
//! Each event type has a corresponding payload struct with the event-specific
//! data. Payloads validate themselves before they are queued.

use nrsched_id::{CellIndex, HarqId, Rnti, SlotPoint, UeIndex, MAX_NOF_HARQS};
use serde::{Deserialize, Serialize};

use crate::{EventError, EventScope};

// =============================================================================
// Event Type Constants
// =============================================================================

/// All event type names as constants.
pub mod event_types {
    // Lifecycle
    pub const UE_CREATED: &str = "ue.created";
    pub const UE_RECONFIGURED: &str = "ue.reconfigured";
    pub const UE_REMOVED: &str = "ue.removed";

    // Buffer state
    pub const UE_DL_BUFFER_STATE: &str = "ue.dl_buffer_state";
    pub const UE_UL_BSR: &str = "ue.ul_bsr";

    // Lower-layer feedback
    pub const UE_UCI_INDICATION: &str = "ue.uci_indication";
    pub const UE_CRC_INDICATION: &str = "ue.crc_indication";
}

/// Logical channel carrying SRB0 (CCCH) traffic.
pub const LCID_SRB0: u8 = 0;

// =============================================================================
// Shared Enums
// =============================================================================

/// Value of a single HARQ-ACK feedback bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarqAckValue {
    /// Positive acknowledgement.
    Ack,
    /// Negative acknowledgement.
    Nack,
    /// Feedback expected but not detected.
    Dtx,
}

impl HarqAckValue {
    /// Returns true for a positive acknowledgement.
    pub fn is_ack(&self) -> bool {
        matches!(self, HarqAckValue::Ack)
    }
}

impl std::fmt::Display for HarqAckValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HarqAckValue::Ack => "ack",
            HarqAckValue::Nack => "nack",
            HarqAckValue::Dtx => "dtx",
        };
        write!(f, "{}", s)
    }
}

// =============================================================================
// UE Lifecycle
// =============================================================================

fn default_nof_harqs() -> u8 {
    MAX_NOF_HARQS as u8
}

/// Scheduler-relevant configuration of a UE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UeConfig {
    /// Primary serving cell.
    pub pcell_index: CellIndex,

    /// Secondary serving cells.
    #[serde(default)]
    pub scell_indexes: Vec<CellIndex>,

    /// Number of DL HARQ processes per serving cell.
    #[serde(default = "default_nof_harqs")]
    pub nof_dl_harqs: u8,

    /// Number of UL HARQ processes per serving cell.
    #[serde(default = "default_nof_harqs")]
    pub nof_ul_harqs: u8,
}

impl UeConfig {
    /// Creates a single-cell configuration with the maximum number of HARQs.
    pub fn single_cell(pcell_index: CellIndex) -> Self {
        Self {
            pcell_index,
            scell_indexes: Vec::new(),
            nof_dl_harqs: default_nof_harqs(),
            nof_ul_harqs: default_nof_harqs(),
        }
    }

    /// Serving cells, PCell first.
    pub fn serving_cells(&self) -> impl Iterator<Item = CellIndex> + '_ {
        std::iter::once(self.pcell_index).chain(self.scell_indexes.iter().copied())
    }

    /// Validates HARQ dimensioning and serving cell uniqueness.
    pub fn validate(&self, ue_index: UeIndex) -> Result<(), EventError> {
        for (name, nof) in [("DL", self.nof_dl_harqs), ("UL", self.nof_ul_harqs)] {
            if nof == 0 || usize::from(nof) > MAX_NOF_HARQS {
                return Err(EventError::InvalidPayload(format!(
                    "ue={}: {} HARQ process count {} outside 1..={}",
                    ue_index, name, nof, MAX_NOF_HARQS
                )));
            }
        }
        let mut seen = std::collections::HashSet::new();
        for cell_index in self.serving_cells() {
            if !seen.insert(cell_index) {
                return Err(EventError::DuplicateServingCell {
                    ue_index,
                    cell_index,
                });
            }
        }
        Ok(())
    }
}

/// Payload for ue.created event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UeCreatedPayload {
    pub ue_index: UeIndex,
    pub crnti: Rnti,
    pub config: UeConfig,
}

/// Payload for ue.reconfigured event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UeReconfiguredPayload {
    pub ue_index: UeIndex,
    pub config: UeConfig,
}

/// Payload for ue.removed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UeRemovedPayload {
    pub ue_index: UeIndex,
}

// =============================================================================
// Buffer State
// =============================================================================

/// Payload for ue.dl_buffer_state event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DlBufferStatePayload {
    pub ue_index: UeIndex,
    pub lcid: u8,
    pub pending_bytes: u32,
}

/// Payload for ue.ul_bsr event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UlBsrPayload {
    pub cell_index: CellIndex,
    pub crnti: Rnti,
    pub reported_bytes: u32,
}

// =============================================================================
// Lower-Layer Feedback
// =============================================================================

/// Payload for ue.uci_indication event.
///
/// `harq_bits[i]` is the feedback for the DL HARQ process that was assigned
/// HARQ-ACK bit index `i` for `slot_rx`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UciIndicationPayload {
    pub cell_index: CellIndex,
    pub slot_rx: SlotPoint,
    pub crnti: Rnti,
    #[serde(default)]
    pub harq_bits: Vec<HarqAckValue>,
    #[serde(default)]
    pub sr_detected: bool,
}

/// Payload for ue.crc_indication event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrcIndicationPayload {
    pub cell_index: CellIndex,
    pub slot_rx: SlotPoint,
    pub crnti: Rnti,
    pub harq_id: HarqId,
    pub tb_crc_success: bool,
}

// =============================================================================
// Event Union
// =============================================================================

/// Any event the UE scheduler's event manager can apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum UeEvent {
    Created(UeCreatedPayload),
    Reconfigured(UeReconfiguredPayload),
    Removed(UeRemovedPayload),
    DlBufferState(DlBufferStatePayload),
    UlBsr(UlBsrPayload),
    UciIndication(UciIndicationPayload),
    CrcIndication(CrcIndicationPayload),
}

impl UeEvent {
    /// The event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            UeEvent::Created(_) => event_types::UE_CREATED,
            UeEvent::Reconfigured(_) => event_types::UE_RECONFIGURED,
            UeEvent::Removed(_) => event_types::UE_REMOVED,
            UeEvent::DlBufferState(_) => event_types::UE_DL_BUFFER_STATE,
            UeEvent::UlBsr(_) => event_types::UE_UL_BSR,
            UeEvent::UciIndication(_) => event_types::UE_UCI_INDICATION,
            UeEvent::CrcIndication(_) => event_types::UE_CRC_INDICATION,
        }
    }

    /// Where the event must be applied.
    ///
    /// Feedback and BSRs are produced by a specific cell and are applied by
    /// that cell's slot pipeline. Everything else is applied once per slot by
    /// whichever cell runs first.
    pub fn scope(&self) -> EventScope {
        match self {
            UeEvent::Created(_)
            | UeEvent::Reconfigured(_)
            | UeEvent::Removed(_)
            | UeEvent::DlBufferState(_) => EventScope::Common,
            UeEvent::UlBsr(p) => EventScope::Cell(p.cell_index),
            UeEvent::UciIndication(p) => EventScope::Cell(p.cell_index),
            UeEvent::CrcIndication(p) => EventScope::Cell(p.cell_index),
        }
    }

    /// Validates the payload.
    pub fn validate(&self) -> Result<(), EventError> {
        match self {
            UeEvent::Created(p) => {
                if !p.crnti.is_crnti() {
                    return Err(EventError::InvalidRnti(p.crnti));
                }
                p.config.validate(p.ue_index)
            }
            UeEvent::Reconfigured(p) => p.config.validate(p.ue_index),
            UeEvent::UciIndication(p) if p.harq_bits.is_empty() && !p.sr_detected => Err(
                EventError::InvalidPayload(format!("rnti={}: empty UCI indication", p.crnti)),
            ),
            _ => Ok(()),
        }
    }
}

// =============================================================================
// Error Indication
// =============================================================================

/// Categories of previously scheduled grants that the lower layers could not
/// transmit for a given slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorOutcome {
    /// DL/UL control-channel grants (DCIs) were discarded.
    #[serde(default)]
    pub pdcch_discarded: bool,

    /// DL data grants were discarded.
    #[serde(default)]
    pub pdsch_discarded: bool,

    /// UL data and UL control grants were discarded.
    #[serde(default)]
    pub pusch_and_pucch_discarded: bool,
}

impl ErrorOutcome {
    /// All categories discarded.
    pub fn all() -> Self {
        Self {
            pdcch_discarded: true,
            pdsch_discarded: true,
            pusch_and_pucch_discarded: true,
        }
    }

    /// Returns true if no category is set.
    pub fn is_empty(&self) -> bool {
        !(self.pdcch_discarded || self.pdsch_discarded || self.pusch_and_pucch_discarded)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn cell(i: u8) -> CellIndex {
        CellIndex::new(i).unwrap()
    }

    fn ue(i: u16) -> UeIndex {
        UeIndex::new(i).unwrap()
    }

    fn slot(count: u32) -> SlotPoint {
        SlotPoint::from_count(0, count).unwrap()
    }

    #[test]
    fn test_harq_ack_value_serialization() {
        assert_eq!(
            serde_json::to_string(&HarqAckValue::Nack).unwrap(),
            "\"nack\""
        );
        assert!(HarqAckValue::Ack.is_ack());
        assert!(!HarqAckValue::Dtx.is_ack());
    }

    #[test]
    fn test_ue_created_json_defaults() {
        let json = r#"{
            "type": "created",
            "payload": {
                "ue_index": 3,
                "crnti": 17921,
                "config": { "pcell_index": 1 }
            }
        }"#;
        let event: UeEvent = serde_json::from_str(json).unwrap();
        let UeEvent::Created(payload) = &event else {
            panic!("expected ue.created, got {:?}", event);
        };
        assert_eq!(payload.config.nof_dl_harqs, 16);
        assert!(payload.config.scell_indexes.is_empty());
        assert_eq!(event.event_type(), event_types::UE_CREATED);
        assert_eq!(event.scope(), EventScope::Common);
        assert!(event.validate().is_ok());
    }

    #[rstest]
    #[case(0, 16)]
    #[case(8, 17)]
    fn test_invalid_harq_dimensioning(#[case] nof_dl: u8, #[case] nof_ul: u8) {
        let config = UeConfig {
            nof_dl_harqs: nof_dl,
            nof_ul_harqs: nof_ul,
            ..UeConfig::single_cell(cell(0))
        };
        assert!(matches!(
            config.validate(ue(0)),
            Err(EventError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_duplicate_serving_cell_rejected() {
        let config = UeConfig {
            scell_indexes: vec![cell(1), cell(0)],
            ..UeConfig::single_cell(cell(0))
        };
        assert_eq!(
            config.validate(ue(2)),
            Err(EventError::DuplicateServingCell {
                ue_index: ue(2),
                cell_index: cell(0)
            })
        );
    }

    #[test]
    fn test_non_crnti_rejected() {
        let event = UeEvent::Created(UeCreatedPayload {
            ue_index: ue(0),
            crnti: Rnti::SI_RNTI,
            config: UeConfig::single_cell(cell(0)),
        });
        assert_eq!(event.validate(), Err(EventError::InvalidRnti(Rnti::SI_RNTI)));
    }

    #[test]
    fn test_feedback_events_are_cell_scoped() {
        let crnti = Rnti::new_crnti(0x4601).unwrap();
        let uci = UeEvent::UciIndication(UciIndicationPayload {
            cell_index: cell(2),
            slot_rx: slot(54),
            crnti,
            harq_bits: vec![HarqAckValue::Ack],
            sr_detected: false,
        });
        assert_eq!(uci.scope(), EventScope::Cell(cell(2)));

        let crc = UeEvent::CrcIndication(CrcIndicationPayload {
            cell_index: cell(1),
            slot_rx: slot(54),
            crnti,
            harq_id: HarqId::new(0).unwrap(),
            tb_crc_success: true,
        });
        assert_eq!(crc.scope(), EventScope::Cell(cell(1)));
    }

    #[test]
    fn test_empty_uci_rejected() {
        let event = UeEvent::UciIndication(UciIndicationPayload {
            cell_index: cell(0),
            slot_rx: slot(54),
            crnti: Rnti::new_crnti(0x4601).unwrap(),
            harq_bits: vec![],
            sr_detected: false,
        });
        assert!(event.validate().is_err());
    }

    #[test]
    fn test_error_outcome_helpers() {
        assert!(ErrorOutcome::default().is_empty());
        assert!(!ErrorOutcome::all().is_empty());
        let outcome: ErrorOutcome = serde_json::from_str(r#"{"pdsch_discarded":true}"#).unwrap();
        assert!(outcome.pdsch_discarded);
        assert!(!outcome.pdcch_discarded);
    }
}
