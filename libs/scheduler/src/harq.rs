//! HARQ process tracking.
//!
//! Every UE keeps one [`HarqEntity`] per serving cell. An entity holds a
//! fixed set of DL and UL HARQ processes; each process moves between
//! [`HarqState::Empty`], [`HarqState::WaitingAck`] and
//! [`HarqState::PendingRetx`]:
//!
//! ```text
//!           new_tx                 NACK / timeout (retxs left)
//!  Empty ───────────▶ WaitingAck ─────────────────────────────▶ PendingRetx
//!    ▲                  │    ▲                                     │
//!    │ ACK / max retxs  │    └────────────── new_retx ─────────────┘
//!    └──────────────────┘
//! ```
//!
//! Cancellation returns a process to `Empty` from any state and is
//! idempotent.

use std::cmp::Ordering;

use nrsched_events::HarqAckValue;
use nrsched_id::{HarqId, Rnti, SlotPoint};
use serde::Serialize;
use tracing::{debug, warn};

/// Number of codewords a DL HARQ process can carry.
pub const MAX_NOF_CODEWORDS: usize = 2;

/// State of a HARQ process or of one of its transport blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HarqState {
    /// Nothing in flight.
    Empty,
    /// A NACKed transport block awaits a retransmission grant.
    PendingRetx,
    /// Transmitted; awaiting HARQ-ACK (DL) or CRC (UL).
    WaitingAck,
}

/// Result of applying feedback or a timeout to a HARQ process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarqOutcome {
    /// Acknowledged; the process is free.
    Acked,
    /// Negatively acknowledged; a retransmission is pending.
    RetxPending,
    /// Negatively acknowledged with no retransmissions left; the process is free.
    MaxRetxReached,
    /// More feedback for the same transmission is expected before deciding.
    AwaitingMoreFeedback,
    /// The process was not waiting for feedback.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TransportBlock {
    state: HarqState,
    ndi: bool,
    nof_retxs: u32,
    max_nof_retxs: u32,
}

impl TransportBlock {
    const fn empty() -> Self {
        Self {
            state: HarqState::Empty,
            ndi: false,
            nof_retxs: 0,
            max_nof_retxs: 0,
        }
    }

    fn new_tx(&mut self, max_nof_retxs: u32) {
        self.state = HarqState::WaitingAck;
        self.ndi = !self.ndi;
        self.nof_retxs = 0;
        self.max_nof_retxs = max_nof_retxs;
    }

    fn new_retx(&mut self) {
        self.state = HarqState::WaitingAck;
        self.nof_retxs += 1;
    }

    fn nack(&mut self) -> HarqOutcome {
        if self.nof_retxs < self.max_nof_retxs {
            self.state = HarqState::PendingRetx;
            HarqOutcome::RetxPending
        } else {
            self.state = HarqState::Empty;
            HarqOutcome::MaxRetxReached
        }
    }

    fn cancel(&mut self) -> bool {
        let was_active = self.state != HarqState::Empty;
        self.state = HarqState::Empty;
        was_active
    }
}

// =============================================================================
// DL HARQ
// =============================================================================

/// A DL HARQ process.
#[derive(Debug, Clone)]
pub struct DlHarqProcess {
    id: HarqId,
    tbs: [TransportBlock; MAX_NOF_CODEWORDS],
    slot_tx: Option<SlotPoint>,
    slot_ack: Option<SlotPoint>,
    harq_bit_idx: u8,
    pucch_ack_to_receive: u32,
}

impl DlHarqProcess {
    /// Create a new, empty DL HARQ process.
    pub fn new(id: HarqId) -> Self {
        Self {
            id,
            tbs: [TransportBlock::empty(); MAX_NOF_CODEWORDS],
            slot_tx: None,
            slot_ack: None,
            harq_bit_idx: 0,
            pucch_ack_to_receive: 0,
        }
    }

    pub fn id(&self) -> HarqId {
        self.id
    }

    /// Aggregate state over all codewords.
    pub fn state(&self) -> HarqState {
        if self.tbs.iter().any(|tb| tb.state == HarqState::WaitingAck) {
            HarqState::WaitingAck
        } else if self.tbs.iter().any(|tb| tb.state == HarqState::PendingRetx) {
            HarqState::PendingRetx
        } else {
            HarqState::Empty
        }
    }

    /// State of a single codeword.
    pub fn tb_state(&self, cw: usize) -> HarqState {
        self.tbs.get(cw).map_or(HarqState::Empty, |tb| tb.state)
    }

    pub fn is_empty(&self) -> bool {
        self.state() == HarqState::Empty
    }

    pub fn is_waiting_ack(&self) -> bool {
        self.state() == HarqState::WaitingAck
    }

    pub fn has_pending_retx(&self) -> bool {
        self.state() == HarqState::PendingRetx
    }

    /// Slot of the last (re)transmission.
    pub fn slot_tx(&self) -> Option<SlotPoint> {
        self.slot_tx
    }

    /// Slot where HARQ-ACK for the last (re)transmission is expected.
    pub fn slot_ack(&self) -> Option<SlotPoint> {
        self.slot_ack
    }

    /// HARQ-ACK bit index assigned in the feedback slot.
    pub fn harq_bit_idx(&self) -> u8 {
        self.harq_bit_idx
    }

    pub fn ndi(&self, cw: usize) -> bool {
        self.tbs.get(cw).is_some_and(|tb| tb.ndi)
    }

    pub fn nof_retxs(&self, cw: usize) -> u32 {
        self.tbs.get(cw).map_or(0, |tb| tb.nof_retxs)
    }

    /// Number of UL control grants expected to carry feedback for this
    /// process.
    pub fn pucch_ack_to_receive(&self) -> u32 {
        self.pucch_ack_to_receive
    }

    /// Number of codewords not in [`HarqState::Empty`].
    pub fn nof_active_codewords(&self) -> usize {
        self.tbs
            .iter()
            .filter(|tb| tb.state != HarqState::Empty)
            .count()
    }

    /// Starts a new transmission of `nof_codewords` transport blocks.
    pub fn new_tx(
        &mut self,
        slot_tx: SlotPoint,
        k1: u32,
        max_nof_retxs: u32,
        harq_bit_idx: u8,
        nof_codewords: usize,
    ) {
        debug_assert!(self.is_empty(), "new_tx on busy {}", self.id);
        let nof_codewords = nof_codewords.clamp(1, MAX_NOF_CODEWORDS);
        for tb in &mut self.tbs[..nof_codewords] {
            tb.new_tx(max_nof_retxs);
        }
        self.start_waiting(slot_tx, k1, harq_bit_idx);
    }

    /// Retransmits every codeword pending retransmission.
    pub fn new_retx(&mut self, slot_tx: SlotPoint, k1: u32, harq_bit_idx: u8) {
        debug_assert!(self.has_pending_retx(), "new_retx on {} without retx", self.id);
        for tb in self
            .tbs
            .iter_mut()
            .filter(|tb| tb.state == HarqState::PendingRetx)
        {
            tb.new_retx();
        }
        self.start_waiting(slot_tx, k1, harq_bit_idx);
    }

    fn start_waiting(&mut self, slot_tx: SlotPoint, k1: u32, harq_bit_idx: u8) {
        self.slot_tx = Some(slot_tx);
        self.slot_ack = Some(slot_tx + k1);
        self.harq_bit_idx = harq_bit_idx;
        self.pucch_ack_to_receive = 0;
    }

    /// Registers one more finalized UL control grant carrying feedback for
    /// this process.
    pub fn increment_pucch_counter(&mut self) {
        self.pucch_ack_to_receive += 1;
    }

    /// Applies one HARQ-ACK report.
    ///
    /// An ACK is final. A NACK or DTX is only final once no other UL control
    /// grant carrying feedback for this process is outstanding.
    pub fn ack_info(&mut self, ack: HarqAckValue) -> HarqOutcome {
        if !self.is_waiting_ack() {
            return HarqOutcome::Ignored;
        }
        if ack.is_ack() {
            for tb in self
                .tbs
                .iter_mut()
                .filter(|tb| tb.state == HarqState::WaitingAck)
            {
                tb.state = HarqState::Empty;
            }
            self.pucch_ack_to_receive = 0;
            return HarqOutcome::Acked;
        }
        if self.pucch_ack_to_receive > 1 {
            self.pucch_ack_to_receive -= 1;
            return HarqOutcome::AwaitingMoreFeedback;
        }
        self.pucch_ack_to_receive = 0;
        self.nack_waiting_tbs()
    }

    fn nack_waiting_tbs(&mut self) -> HarqOutcome {
        let mut outcome = HarqOutcome::MaxRetxReached;
        for tb in self
            .tbs
            .iter_mut()
            .filter(|tb| tb.state == HarqState::WaitingAck)
        {
            if tb.nack() == HarqOutcome::RetxPending {
                outcome = HarqOutcome::RetxPending;
            }
        }
        outcome
    }

    /// Cancels one codeword. Returns true if it was not already empty.
    pub fn cancel(&mut self, cw: usize) -> bool {
        let cancelled = self.tbs.get_mut(cw).is_some_and(TransportBlock::cancel);
        if self.is_empty() {
            self.pucch_ack_to_receive = 0;
        }
        cancelled
    }

    /// Cancels every codeword. Returns true if any was not already empty.
    pub fn cancel_all(&mut self) -> bool {
        let mut cancelled = false;
        for cw in 0..MAX_NOF_CODEWORDS {
            cancelled |= self.cancel(cw);
        }
        cancelled
    }

    fn slot_indication(&mut self, slot: SlotPoint, max_ack_wait_slots: u32) -> Option<HarqOutcome> {
        let slot_ack = self.slot_ack?;
        if !self.is_waiting_ack() || slot - slot_ack <= max_ack_wait_slots as i32 {
            return None;
        }
        self.pucch_ack_to_receive = 0;
        Some(self.nack_waiting_tbs())
    }
}

// =============================================================================
// UL HARQ
// =============================================================================

/// A UL HARQ process.
#[derive(Debug, Clone)]
pub struct UlHarqProcess {
    id: HarqId,
    tb: TransportBlock,
    slot_tx: Option<SlotPoint>,
    slot_rx: Option<SlotPoint>,
}

impl UlHarqProcess {
    /// Create a new, empty UL HARQ process.
    pub fn new(id: HarqId) -> Self {
        Self {
            id,
            tb: TransportBlock::empty(),
            slot_tx: None,
            slot_rx: None,
        }
    }

    pub fn id(&self) -> HarqId {
        self.id
    }

    pub fn state(&self) -> HarqState {
        self.tb.state
    }

    pub fn is_empty(&self) -> bool {
        self.tb.state == HarqState::Empty
    }

    pub fn is_waiting_ack(&self) -> bool {
        self.tb.state == HarqState::WaitingAck
    }

    pub fn has_pending_retx(&self) -> bool {
        self.tb.state == HarqState::PendingRetx
    }

    /// Slot of the UL grant (DCI).
    pub fn slot_tx(&self) -> Option<SlotPoint> {
        self.slot_tx
    }

    /// Slot where the PUSCH is received and CRC is expected.
    pub fn slot_rx(&self) -> Option<SlotPoint> {
        self.slot_rx
    }

    pub fn ndi(&self) -> bool {
        self.tb.ndi
    }

    pub fn nof_retxs(&self) -> u32 {
        self.tb.nof_retxs
    }

    pub fn new_tx(&mut self, slot_tx: SlotPoint, k2: u32, max_nof_retxs: u32) {
        debug_assert!(self.is_empty(), "new_tx on busy {}", self.id);
        self.tb.new_tx(max_nof_retxs);
        self.slot_tx = Some(slot_tx);
        self.slot_rx = Some(slot_tx + k2);
    }

    pub fn new_retx(&mut self, slot_tx: SlotPoint, k2: u32) {
        debug_assert!(self.has_pending_retx(), "new_retx on {} without retx", self.id);
        self.tb.new_retx();
        self.slot_tx = Some(slot_tx);
        self.slot_rx = Some(slot_tx + k2);
    }

    /// Applies the CRC result of the PUSCH.
    pub fn crc_info(&mut self, tb_crc_success: bool) -> HarqOutcome {
        if !self.is_waiting_ack() {
            return HarqOutcome::Ignored;
        }
        if tb_crc_success {
            self.tb.state = HarqState::Empty;
            HarqOutcome::Acked
        } else {
            self.tb.nack()
        }
    }

    /// Cancels the process. Returns true if it was not already empty.
    pub fn cancel(&mut self) -> bool {
        self.tb.cancel()
    }

    fn slot_indication(&mut self, slot: SlotPoint, max_ack_wait_slots: u32) -> Option<HarqOutcome> {
        let slot_rx = self.slot_rx?;
        if !self.is_waiting_ack() || slot - slot_rx <= max_ack_wait_slots as i32 {
            return None;
        }
        Some(self.tb.nack())
    }
}

// =============================================================================
// HARQ Entity
// =============================================================================

/// The DL and UL HARQ processes of one UE in one serving cell.
#[derive(Debug, Clone)]
pub struct HarqEntity {
    rnti: Rnti,
    max_ack_wait_slots: u32,
    dl_harqs: Vec<DlHarqProcess>,
    ul_harqs: Vec<UlHarqProcess>,
}

impl HarqEntity {
    /// Create a new HARQ entity with `nof_dl_harqs` and `nof_ul_harqs`
    /// processes.
    pub fn new(rnti: Rnti, nof_dl_harqs: usize, nof_ul_harqs: usize, max_ack_wait_slots: u32) -> Self {
        Self {
            rnti,
            max_ack_wait_slots,
            dl_harqs: HarqId::all().take(nof_dl_harqs).map(DlHarqProcess::new).collect(),
            ul_harqs: HarqId::all().take(nof_ul_harqs).map(UlHarqProcess::new).collect(),
        }
    }

    pub fn rnti(&self) -> Rnti {
        self.rnti
    }

    pub fn set_rnti(&mut self, rnti: Rnti) {
        self.rnti = rnti;
    }

    pub fn nof_dl_harqs(&self) -> usize {
        self.dl_harqs.len()
    }

    pub fn nof_ul_harqs(&self) -> usize {
        self.ul_harqs.len()
    }

    pub fn dl_harqs(&self) -> &[DlHarqProcess] {
        &self.dl_harqs
    }

    pub fn ul_harqs(&self) -> &[UlHarqProcess] {
        &self.ul_harqs
    }

    pub fn dl_harq(&self, id: HarqId) -> Option<&DlHarqProcess> {
        self.dl_harqs.get(id.as_usize())
    }

    pub fn dl_harq_mut(&mut self, id: HarqId) -> Option<&mut DlHarqProcess> {
        self.dl_harqs.get_mut(id.as_usize())
    }

    pub fn ul_harq(&self, id: HarqId) -> Option<&UlHarqProcess> {
        self.ul_harqs.get(id.as_usize())
    }

    pub fn ul_harq_mut(&mut self, id: HarqId) -> Option<&mut UlHarqProcess> {
        self.ul_harqs.get_mut(id.as_usize())
    }

    pub fn find_empty_dl_harq(&self) -> Option<&DlHarqProcess> {
        self.dl_harqs.iter().find(|h| h.is_empty())
    }

    /// Oldest DL process pending retransmission.
    pub fn find_pending_dl_retx(&self) -> Option<&DlHarqProcess> {
        self.dl_harqs
            .iter()
            .filter(|h| h.has_pending_retx())
            .min_by(|a, b| cmp_slot_tx(a.slot_tx, b.slot_tx))
    }

    pub fn find_empty_ul_harq(&self) -> Option<&UlHarqProcess> {
        self.ul_harqs.iter().find(|h| h.is_empty())
    }

    /// Oldest UL process pending retransmission.
    pub fn find_pending_ul_retx(&self) -> Option<&UlHarqProcess> {
        self.ul_harqs
            .iter()
            .filter(|h| h.has_pending_retx())
            .min_by(|a, b| cmp_slot_tx(a.slot_tx, b.slot_tx))
    }

    /// Finds the DL process waiting for feedback at `slot_ack` with the given
    /// HARQ-ACK bit index.
    pub fn find_dl_harq_waiting_ack_slot(
        &mut self,
        slot_ack: SlotPoint,
        harq_bit_idx: u8,
    ) -> Option<&mut DlHarqProcess> {
        self.dl_harqs.iter_mut().find(|h| {
            h.is_waiting_ack() && h.slot_ack == Some(slot_ack) && h.harq_bit_idx == harq_bit_idx
        })
    }

    /// Number of DL processes expecting feedback at `slot_ack`.
    pub fn nof_dl_harqs_waiting_ack_at(&self, slot_ack: SlotPoint) -> usize {
        self.dl_harqs
            .iter()
            .filter(|h| h.is_waiting_ack() && h.slot_ack == Some(slot_ack))
            .count()
    }

    /// Applies one HARQ-ACK bit received at `slot_ack`.
    pub fn dl_ack_info(
        &mut self,
        slot_ack: SlotPoint,
        harq_bit_idx: u8,
        ack: HarqAckValue,
    ) -> Option<(HarqId, HarqOutcome)> {
        let rnti = self.rnti;
        let Some(h) = self.find_dl_harq_waiting_ack_slot(slot_ack, harq_bit_idx) else {
            warn!(
                rnti = %rnti,
                slot = %slot_ack,
                harq_bit_idx,
                "HARQ-ACK for unknown DL HARQ process"
            );
            return None;
        };
        let outcome = h.ack_info(ack);
        debug!(rnti = %rnti, harq = %h.id, ack = %ack, ?outcome, "DL HARQ feedback");
        Some((h.id, outcome))
    }

    /// Applies the CRC of the PUSCH carried by UL process `harq_id`.
    pub fn ul_crc_info(&mut self, harq_id: HarqId, tb_crc_success: bool) -> Option<HarqOutcome> {
        let rnti = self.rnti;
        let Some(h) = self.ul_harq_mut(harq_id) else {
            warn!(rnti = %rnti, harq = %harq_id, "CRC for unknown UL HARQ process");
            return None;
        };
        let outcome = h.crc_info(tb_crc_success);
        debug!(rnti = %rnti, harq = %harq_id, crc = tb_crc_success, ?outcome, "UL HARQ CRC");
        Some(outcome)
    }

    /// Cancels every DL process expecting feedback at `slot_ack`.
    pub fn cancel_dl_harqs(&mut self, slot_ack: SlotPoint) -> usize {
        self.dl_harqs
            .iter_mut()
            .filter(|h| h.slot_ack == Some(slot_ack) && h.is_waiting_ack())
            .map(|h| h.cancel_all())
            .filter(|cancelled| *cancelled)
            .count()
    }

    /// Expires processes whose feedback is overdue. Returns how many timed out.
    pub fn slot_indication(&mut self, slot: SlotPoint) -> usize {
        let mut nof_timeouts = 0;
        for h in &mut self.dl_harqs {
            if let Some(outcome) = h.slot_indication(slot, self.max_ack_wait_slots) {
                nof_timeouts += 1;
                warn!(rnti = %self.rnti, harq = %h.id, slot = %slot, ?outcome, "DL HARQ-ACK timeout");
            }
        }
        for h in &mut self.ul_harqs {
            if let Some(outcome) = h.slot_indication(slot, self.max_ack_wait_slots) {
                nof_timeouts += 1;
                warn!(rnti = %self.rnti, harq = %h.id, slot = %slot, ?outcome, "UL CRC timeout");
            }
        }
        nof_timeouts
    }
}

/// Orders transmissions oldest first, across the slot counter wraparound.
fn cmp_slot_tx(a: Option<SlotPoint>, b: Option<SlotPoint>) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}
