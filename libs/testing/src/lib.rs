//! # nrsched-testing
//!
//! Fixtures shared by the nrsched test suites: identifier shorthands and
//! UE event builders. Everything here panics on invalid input, which is
//! what a test wants.

use std::sync::Once;

use nrsched_events::{
    CrcIndicationPayload, DlBufferStatePayload, HarqAckValue, UciIndicationPayload, UeConfig,
    UeCreatedPayload, UeEvent, UeReconfiguredPayload, UeRemovedPayload, UlBsrPayload,
};
use nrsched_id::{CellIndex, HarqId, Rnti, SlotPoint, UeIndex};

/// First C-RNTI handed out by [`crnti_for`].
pub const FIRST_CRNTI: u16 = 0x4601;

// =============================================================================
// Identifiers
// =============================================================================

pub fn cell(index: u8) -> CellIndex {
    CellIndex::new(index).expect("valid cell index")
}

pub fn ue(index: u16) -> UeIndex {
    UeIndex::new(index).expect("valid UE index")
}

pub fn harq(id: u8) -> HarqId {
    HarqId::new(id).expect("valid HARQ id")
}

pub fn rnti(value: u16) -> Rnti {
    Rnti::new_crnti(value).expect("valid C-RNTI")
}

/// C-RNTI conventionally assigned to UE `index` in tests.
pub fn crnti_for(index: u16) -> Rnti {
    rnti(FIRST_CRNTI + index)
}

/// Slot `count` at numerology 0.
pub fn slot(count: u32) -> SlotPoint {
    slot_mu(0, count)
}

pub fn slot_mu(numerology: u8, count: u32) -> SlotPoint {
    SlotPoint::from_count(numerology, count).expect("valid slot")
}

// =============================================================================
// Events
// =============================================================================

/// `ue.created` for UE `index` served by `cells` (PCell first).
pub fn ue_created(index: u16, cells: &[u8]) -> UeEvent {
    UeEvent::Created(UeCreatedPayload {
        ue_index: ue(index),
        crnti: crnti_for(index),
        config: ue_config(cells),
    })
}

pub fn ue_reconfigured(index: u16, cells: &[u8]) -> UeEvent {
    UeEvent::Reconfigured(UeReconfiguredPayload {
        ue_index: ue(index),
        config: ue_config(cells),
    })
}

pub fn ue_removed(index: u16) -> UeEvent {
    UeEvent::Removed(UeRemovedPayload { ue_index: ue(index) })
}

pub fn ue_config(cells: &[u8]) -> UeConfig {
    let (pcell, scells) = cells.split_first().expect("at least one serving cell");
    UeConfig {
        scell_indexes: scells.iter().copied().map(cell).collect(),
        ..UeConfig::single_cell(cell(*pcell))
    }
}

pub fn dl_buffer_state(index: u16, lcid: u8, pending_bytes: u32) -> UeEvent {
    UeEvent::DlBufferState(DlBufferStatePayload {
        ue_index: ue(index),
        lcid,
        pending_bytes,
    })
}

pub fn ul_bsr(cell_index: u8, index: u16, reported_bytes: u32) -> UeEvent {
    UeEvent::UlBsr(UlBsrPayload {
        cell_index: cell(cell_index),
        crnti: crnti_for(index),
        reported_bytes,
    })
}

/// UCI indication carrying HARQ-ACK bits in bit-index order.
pub fn harq_ack(cell_index: u8, slot_rx: SlotPoint, index: u16, bits: &[HarqAckValue]) -> UeEvent {
    UeEvent::UciIndication(UciIndicationPayload {
        cell_index: cell(cell_index),
        slot_rx,
        crnti: crnti_for(index),
        harq_bits: bits.to_vec(),
        sr_detected: false,
    })
}

pub fn sr_indication(cell_index: u8, slot_rx: SlotPoint, index: u16) -> UeEvent {
    UeEvent::UciIndication(UciIndicationPayload {
        cell_index: cell(cell_index),
        slot_rx,
        crnti: crnti_for(index),
        harq_bits: Vec::new(),
        sr_detected: true,
    })
}

pub fn crc_indication(cell_index: u8, slot_rx: SlotPoint, index: u16, harq_id: u8, ok: bool) -> UeEvent {
    UeEvent::CrcIndication(CrcIndicationPayload {
        cell_index: cell(cell_index),
        slot_rx,
        crnti: crnti_for(index),
        harq_id: harq(harq_id),
        tb_crc_success: ok,
    })
}

// =============================================================================
// Logging
// =============================================================================

static TRACING: Once = Once::new();

/// Routes `tracing` output to the test harness. Honours `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ue_created_uses_conventional_rnti() {
        let UeEvent::Created(p) = ue_created(2, &[1, 0]) else {
            panic!("expected ue.created");
        };
        assert_eq!(p.crnti.value(), 0x4603);
        assert_eq!(p.config.pcell_index, cell(1));
        assert_eq!(p.config.scell_indexes, vec![cell(0)]);
    }

    #[test]
    fn test_events_validate() {
        assert!(ue_created(0, &[0]).validate().is_ok());
        assert!(harq_ack(0, slot(54), 0, &[HarqAckValue::Ack]).validate().is_ok());
        assert!(sr_indication(0, slot(54), 0).validate().is_ok());
    }
}
