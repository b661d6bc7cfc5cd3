//! Per-cell slot loop.

use nrsched_id::CellIndex;
use nrsched_scheduler::UeScheduler;
use tracing::{debug, info, warn};

use crate::lower_layer::LowerLayerEmulator;
use crate::slot_clock::SlotClock;

/// What a cell thread did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellRunSummary {
    pub nof_slots: u64,
    pub nof_indications: u64,
    pub nof_rejected_indications: u64,
    pub nof_error_indications: u64,
}

/// Runs the slots of one cell until the clock stops.
///
/// After each slot the emulated PHY reports on that slot's UL channels and,
/// from time to time, on grants it failed to transmit.
pub fn run_cell(
    sched: &UeScheduler,
    clock: &SlotClock,
    cell_index: CellIndex,
    mut phy: LowerLayerEmulator,
) -> CellRunSummary {
    info!(cell_index = %cell_index, "Cell slot loop started");

    let mut summary = CellRunSummary::default();
    let mut n = 0u64;
    while let Some(slot_tx) = clock.begin_slot(n) {
        sched.run_slot(slot_tx, cell_index);
        summary.nof_slots += 1;

        if let Some(result) = sched.get_history(cell_index, slot_tx) {
            for event in phy.ul_indications(&result) {
                summary.nof_indications += 1;
                if let Err(e) = sched.handle_ue_event(event) {
                    summary.nof_rejected_indications += 1;
                    warn!(cell_index = %cell_index, slot = %slot_tx, error = %e, "Indication rejected");
                }
            }
        }

        if let Some((slot, outcome)) = phy.error_indication(slot_tx) {
            debug!(cell_index = %cell_index, slot = %slot, ?outcome, "Injecting error indication");
            sched.handle_error_indication(slot, cell_index, outcome);
            summary.nof_error_indications += 1;
        }

        n += 1;
    }

    info!(
        cell_index = %cell_index,
        nof_slots = summary.nof_slots,
        nof_indications = summary.nof_indications,
        nof_error_indications = summary.nof_error_indications,
        "Cell slot loop stopped"
    );
    summary
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use nrsched_scheduler::{
        CellConfig, LoggingNotifier, SchedulerExpertConfig, SchedulerMetricsHandler,
        TimeRoundRobinStrategy, UeSchedulerCellParams,
    };
    use nrsched_testing::{cell, dl_buffer_state, init_tracing, ue_created};

    use super::*;
    use crate::lower_layer::LowerLayerConfig;

    #[test]
    fn test_cells_stop_together() {
        init_tracing();
        let expert = SchedulerExpertConfig::default();
        let mut sched = UeScheduler::new(
            expert.clone(),
            Box::new(TimeRoundRobinStrategy::default()),
            Arc::new(LoggingNotifier),
            SchedulerMetricsHandler::disabled(),
        )
        .unwrap();
        for i in 0..2 {
            sched
                .add_cell(UeSchedulerCellParams::new(CellConfig::fdd(cell(i), 0, 52), &expert))
                .unwrap();
        }
        sched.handle_ue_event(ue_created(0, &[0, 1])).unwrap();
        sched.handle_ue_event(dl_buffer_state(0, 4, 100_000)).unwrap();

        let clock = SlotClock::new(0, Duration::ZERO, 60);
        let phy_cfg = LowerLayerConfig {
            seed: 1,
            ack_probability: 0.5,
            crc_ok_probability: 1.0,
            error_indication_period_slots: 7,
            max_bsr_bytes: 1000,
        };
        let summaries: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|i| {
                    let (sched, clock) = (&sched, &clock);
                    s.spawn(move || {
                        run_cell(sched, clock, cell(i), LowerLayerEmulator::new(cell(i), phy_cfg))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for summary in &summaries {
            assert_eq!(summary.nof_slots, 60);
            assert_eq!(summary.nof_error_indications, 8);
            assert_eq!(summary.nof_rejected_indications, 0);
        }
        assert!(summaries[0].nof_indications > 0);
        assert_eq!(sched.last_completed_slot().map(|s| s.count()), Some(59));
    }
}
