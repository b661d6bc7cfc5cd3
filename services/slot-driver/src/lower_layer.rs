//! Emulated PHY feedback.
//!
//! Turns the finalized decisions of a slot into the indications a real PHY
//! would report once that slot is over: HARQ-ACK and SR on PUCCH, CRC and
//! piggybacked HARQ-ACK on PUSCH. It also injects error indications for
//! recently transmitted slots.

use nrsched_events::{
    CrcIndicationPayload, ErrorOutcome, HarqAckValue, UciIndicationPayload, UeEvent, UlBsrPayload,
};
use nrsched_id::{CellIndex, Rnti, SlotPoint};
use nrsched_scheduler::SchedResult;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Probability that an SR occasion carries a positive SR.
const SR_PROBABILITY: f64 = 0.2;

/// Probability that a HARQ-ACK bit is not detected at all.
const DTX_PROBABILITY: f64 = 0.01;

/// Feedback behaviour of the emulated PHY.
#[derive(Debug, Clone, Copy)]
pub struct LowerLayerConfig {
    pub seed: u64,
    pub ack_probability: f64,
    pub crc_ok_probability: f64,
    pub error_indication_period_slots: u32,
    /// Largest UL buffer occupancy reported after a PUSCH or SR.
    pub max_bsr_bytes: u32,
}

/// Emulated PHY of one cell.
#[derive(Debug)]
pub struct LowerLayerEmulator {
    cell_index: CellIndex,
    cfg: LowerLayerConfig,
    rng: StdRng,
    nof_slots: u64,
}

impl LowerLayerEmulator {
    /// Create a new emulator. Every cell gets its own random stream.
    pub fn new(cell_index: CellIndex, cfg: LowerLayerConfig) -> Self {
        Self {
            cell_index,
            rng: StdRng::seed_from_u64(cfg.seed.wrapping_add(u64::from(cell_index.value()))),
            cfg,
            nof_slots: 0,
        }
    }

    /// Indications for the UL channels of `result`, whose slot just ended.
    pub fn ul_indications(&mut self, result: &SchedResult) -> Vec<UeEvent> {
        let mut events = Vec::new();

        for pucch in &result.ul.pucchs {
            let harq_bits = self.harq_bits(pucch.harq_ack_nof_bits());
            let sr_detected = pucch.sr_bits() > 0 && self.rng.random_bool(SR_PROBABILITY);
            if harq_bits.is_empty() && !sr_detected {
                continue;
            }
            if sr_detected {
                events.push(self.bsr(pucch.crnti));
            }
            events.push(UeEvent::UciIndication(UciIndicationPayload {
                cell_index: self.cell_index,
                slot_rx: result.slot,
                crnti: pucch.crnti,
                harq_bits,
                sr_detected,
            }));
        }

        for pusch in &result.ul.puschs {
            let tb_crc_success = self.rng.random_bool(self.cfg.crc_ok_probability);
            events.push(UeEvent::CrcIndication(CrcIndicationPayload {
                cell_index: self.cell_index,
                slot_rx: result.slot,
                crnti: pusch.rnti,
                harq_id: pusch.harq_id,
                tb_crc_success,
            }));
            let harq_bits = self.harq_bits(pusch.harq_ack_nof_bits());
            if !harq_bits.is_empty() {
                events.push(UeEvent::UciIndication(UciIndicationPayload {
                    cell_index: self.cell_index,
                    slot_rx: result.slot,
                    crnti: pusch.rnti,
                    harq_bits,
                    sr_detected: false,
                }));
            }
            if tb_crc_success {
                events.push(self.bsr(pusch.rnti));
            }
        }

        events
    }

    /// Called once per slot after `slot_tx` was scheduled. Every
    /// `error_indication_period_slots` it reports that part of the previous
    /// slot could not be transmitted.
    pub fn error_indication(&mut self, slot_tx: SlotPoint) -> Option<(SlotPoint, ErrorOutcome)> {
        self.nof_slots += 1;
        let period = u64::from(self.cfg.error_indication_period_slots);
        if period == 0 || self.nof_slots % period != 0 {
            return None;
        }

        let mut outcome = ErrorOutcome {
            pdcch_discarded: self.rng.random_bool(0.5),
            pdsch_discarded: self.rng.random_bool(0.5),
            pusch_and_pucch_discarded: self.rng.random_bool(0.5),
        };
        if outcome.is_empty() {
            outcome = ErrorOutcome::all();
        }
        Some((slot_tx - 1u32, outcome))
    }

    fn harq_bits(&mut self, nof_bits: u8) -> Vec<HarqAckValue> {
        (0..nof_bits)
            .map(|_| {
                if self.rng.random_bool(DTX_PROBABILITY) {
                    HarqAckValue::Dtx
                } else if self.rng.random_bool(self.cfg.ack_probability) {
                    HarqAckValue::Ack
                } else {
                    HarqAckValue::Nack
                }
            })
            .collect()
    }

    fn bsr(&mut self, crnti: Rnti) -> UeEvent {
        UeEvent::UlBsr(UlBsrPayload {
            cell_index: self.cell_index,
            crnti,
            reported_bytes: self.rng.random_range(0..=self.cfg.max_bsr_bytes),
        })
    }
}
