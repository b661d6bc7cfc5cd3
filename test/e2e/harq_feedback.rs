//! End-to-end HARQ feedback flows through the full slot pipeline.
//!
//! A single FDD cell, one UE and a DL transmission at slot 50 whose
//! HARQ-ACK is expected on the PUCCH of slot 54.
//!
//! ## Running
//!
//! ```bash
//! cargo test -p nrsched-e2e --test harq_feedback
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nrsched_events::{ErrorOutcome, HarqAckValue};
use nrsched_scheduler::grid_allocator::{UeCellGridAllocator, UeResourceGridView};
use nrsched_scheduler::{
    CellConfig, HarqState, LoggingNotifier, SchedulerExpertConfig, SchedulerMetricsHandler,
    SchedulerStrategy, TimeRoundRobinStrategy, UeRepository, UeScheduler, UeSchedulerCellParams,
};
use nrsched_testing::{cell, dl_buffer_state, harq_ack, init_tracing, slot, ue, ue_created};
use rstest::rstest;

/// Round robin that can be switched off, so that a pending retransmission
/// is observable before it is rescheduled.
struct PausableStrategy {
    inner: TimeRoundRobinStrategy,
    paused: Arc<AtomicBool>,
}

impl SchedulerStrategy for PausableStrategy {
    fn name(&self) -> &'static str {
        "pausable"
    }

    fn dl_sched(
        &mut self,
        alloc: &mut UeCellGridAllocator<'_>,
        view: &UeResourceGridView<'_>,
        ues: &mut UeRepository,
    ) {
        if !self.paused.load(Ordering::SeqCst) {
            self.inner.dl_sched(alloc, view, ues);
        }
    }

    fn ul_sched(
        &mut self,
        alloc: &mut UeCellGridAllocator<'_>,
        view: &UeResourceGridView<'_>,
        ues: &mut UeRepository,
    ) {
        if !self.paused.load(Ordering::SeqCst) {
            self.inner.ul_sched(alloc, view, ues);
        }
    }
}

struct Harness {
    sched: UeScheduler,
    paused: Arc<AtomicBool>,
}

impl Harness {
    fn new(max_nof_dl_harq_retxs: u32) -> Self {
        init_tracing();
        let expert = SchedulerExpertConfig {
            max_nof_dl_harq_retxs,
            ..Default::default()
        };
        let paused = Arc::new(AtomicBool::new(false));
        let mut sched = UeScheduler::new(
            expert.clone(),
            Box::new(PausableStrategy {
                inner: TimeRoundRobinStrategy::default(),
                paused: paused.clone(),
            }),
            Arc::new(LoggingNotifier),
            SchedulerMetricsHandler::disabled(),
        )
        .unwrap();
        sched
            .add_cell(UeSchedulerCellParams::new(CellConfig::fdd(cell(0), 0, 52), &expert))
            .unwrap();
        Self { sched, paused }
    }

    /// Runs slots 50..=`last` with a single small DL transmission at 50.
    fn with_dl_tx_at_50(max_nof_dl_harq_retxs: u32, last: u32) -> Self {
        let h = Self::new(max_nof_dl_harq_retxs);
        h.sched.handle_ue_event(ue_created(0, &[0])).unwrap();
        h.sched.handle_ue_event(dl_buffer_state(0, 4, 100)).unwrap();
        h.run(50..=last);
        h
    }

    fn run(&self, slots: std::ops::RangeInclusive<u32>) {
        for count in slots {
            self.sched.run_slot(slot(count), cell(0));
        }
    }

    fn pause(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    /// (state, slot_ack, pucch_ack_to_receive, nof_retxs) of DL HARQ 0.
    fn dl_harq(&self) -> (HarqState, Option<u32>, u32, u32) {
        self.sched.with_ue_repository(|ues| {
            let h = &ues.get(ue(0)).unwrap().pcell().harqs.dl_harqs()[0];
            (
                h.state(),
                h.slot_ack().map(|s| s.count()),
                h.pucch_ack_to_receive(),
                h.nof_retxs(0),
            )
        })
    }
}

#[test]
fn test_dl_transmission_expects_feedback_four_slots_later() {
    let h = Harness::with_dl_tx_at_50(4, 50);
    let result = h.sched.get_history(cell(0), slot(50)).unwrap();
    assert_eq!(result.dl.ue_grants.len(), 1);
    assert_eq!(result.dl.ue_grants[0].harq_id.value(), 0);
    assert_eq!(h.dl_harq(), (HarqState::WaitingAck, Some(54), 0, 0));
}

#[test]
fn test_positive_feedback_frees_process() {
    let h = Harness::with_dl_tx_at_50(4, 53);
    assert_eq!(h.dl_harq().2, 0);

    // Slot 54 carries the PUCCH with the process's HARQ-ACK bit.
    h.run(54..=54);
    let pucch_slot = h.sched.get_history(cell(0), slot(54)).unwrap();
    assert_eq!(pucch_slot.ul.pucchs.len(), 1);
    assert_eq!(pucch_slot.ul.pucchs[0].harq_ack_nof_bits(), 1);
    assert_eq!(h.dl_harq(), (HarqState::WaitingAck, Some(54), 1, 0));

    h.sched
        .handle_ue_event(harq_ack(0, slot(54), 0, &[HarqAckValue::Ack]))
        .unwrap();
    h.run(55..=55);
    assert_eq!(h.dl_harq().0, HarqState::Empty);
    assert_eq!(h.sched.metrics().cell_metrics(cell(0)).nof_harq_acks, 1);
}

#[rstest]
#[case::retxs_left(4, HarqState::PendingRetx)]
#[case::no_retxs_left(0, HarqState::Empty)]
fn test_negative_feedback(#[case] max_retxs: u32, #[case] expected: HarqState) {
    let h = Harness::with_dl_tx_at_50(max_retxs, 54);
    h.pause(true);
    h.sched
        .handle_ue_event(harq_ack(0, slot(54), 0, &[HarqAckValue::Nack]))
        .unwrap();
    h.run(55..=55);
    assert_eq!(h.dl_harq().0, expected);
    assert_eq!(h.sched.metrics().cell_metrics(cell(0)).nof_harq_nacks, 1);
}

#[test]
fn test_pending_retransmission_is_rescheduled() {
    let h = Harness::with_dl_tx_at_50(4, 54);
    h.pause(true);
    h.sched
        .handle_ue_event(harq_ack(0, slot(54), 0, &[HarqAckValue::Nack]))
        .unwrap();
    h.run(55..=55);
    assert_eq!(h.dl_harq().0, HarqState::PendingRetx);

    h.pause(false);
    h.run(56..=56);
    let result = h.sched.get_history(cell(0), slot(56)).unwrap();
    assert_eq!(result.dl.ue_grants.len(), 1);
    assert!(!result.dl.ue_grants[0].codewords[0].new_data);
    assert_eq!(h.dl_harq(), (HarqState::WaitingAck, Some(60), 0, 1));
}

#[test]
fn test_discarded_dci_cancels_process() {
    let h = Harness::with_dl_tx_at_50(4, 53);
    // The NACK arrives before slot 54 is scheduled, so the retransmission
    // DCI goes out in slot 54 itself.
    h.sched
        .handle_ue_event(harq_ack(0, slot(54), 0, &[HarqAckValue::Nack]))
        .unwrap();
    h.run(54..=54);
    let result = h.sched.get_history(cell(0), slot(54)).unwrap();
    assert_eq!(result.dl.dl_pdcchs.len(), 1);
    assert_eq!(h.dl_harq(), (HarqState::WaitingAck, Some(58), 0, 1));

    h.sched.handle_error_indication(
        slot(54),
        cell(0),
        ErrorOutcome {
            pdcch_discarded: true,
            ..Default::default()
        },
    );
    assert_eq!(h.dl_harq().0, HarqState::Empty);
    assert_eq!(h.sched.metrics().cell_metrics(cell(0)).nof_cancelled_harqs, 1);

    // Feedback for the cancelled transmission is ignored.
    h.sched
        .handle_ue_event(harq_ack(0, slot(58), 0, &[HarqAckValue::Ack]))
        .unwrap();
    h.run(55..=55);
    assert_eq!(h.dl_harq().0, HarqState::Empty);
}

#[test]
fn test_discarded_pucch_cancels_process_awaiting_its_feedback() {
    let h = Harness::with_dl_tx_at_50(4, 54);
    assert_eq!(h.dl_harq().0, HarqState::WaitingAck);

    h.sched.handle_error_indication(
        slot(54),
        cell(0),
        ErrorOutcome {
            pusch_and_pucch_discarded: true,
            ..Default::default()
        },
    );
    assert_eq!(h.dl_harq().0, HarqState::Empty);
}

#[test]
fn test_stale_error_indication_changes_nothing() {
    let h = Harness::with_dl_tx_at_50(4, 54);
    h.run(55..=80);
    let before = h.dl_harq();

    h.sched.handle_error_indication(slot(50), cell(0), ErrorOutcome::all());
    assert_eq!(h.dl_harq(), before);
    let m = h.sched.metrics().cell_metrics(cell(0));
    assert_eq!(m.nof_stale_error_indications, 1);
    assert_eq!(m.nof_cancelled_harqs, 0);
}
