//! End-to-end multi-cell synchronization.
//!
//! ## Running
//!
//! ```bash
//! cargo test -p nrsched-e2e --test multi_cell_barrier
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use nrsched_scheduler::{
    CellConfig, LoggingNotifier, SchedulerExpertConfig, SchedulerMetricsHandler,
    SchedulerSyncPoint, TimeRoundRobinStrategy, UeScheduler, UeSchedulerCellParams,
};
use nrsched_testing::{cell, dl_buffer_state, init_tracing, slot, ue, ue_created};

#[test]
fn test_callback_runs_once_before_any_cell_leaves() {
    let sync = SchedulerSyncPoint::new();
    let nof_runs = AtomicUsize::new(0);

    thread::scope(|s| {
        for _ in 0..2 {
            s.spawn(|| {
                for count in 0..=100 {
                    sync.wait(slot(count), 2, || {
                        nof_runs.fetch_add(1, Ordering::SeqCst);
                    });
                    // Whoever leaves, the callback of this slot already ran.
                    assert_eq!(nof_runs.load(Ordering::SeqCst), count as usize + 1);
                }
            });
        }
    });

    assert_eq!(nof_runs.load(Ordering::SeqCst), 101);
    assert_eq!(sync.last_completed_slot(), Some(slot(100)));
}

#[test]
fn test_two_cells_share_one_decision_per_slot() {
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
    // One UE per PCell and one aggregating both carriers.
    sched.handle_ue_event(ue_created(0, &[0])).unwrap();
    sched.handle_ue_event(ue_created(1, &[1])).unwrap();
    sched.handle_ue_event(ue_created(2, &[0, 1])).unwrap();
    for i in 0..3 {
        sched.handle_ue_event(dl_buffer_state(i, 4, 1_000_000)).unwrap();
    }

    thread::scope(|s| {
        for i in 0..2 {
            let sched = &sched;
            s.spawn(move || {
                for count in 0..=100 {
                    sched.run_slot(slot(count), cell(i));
                }
            });
        }
    });

    assert_eq!(sched.last_completed_slot(), Some(slot(100)));
    for i in 0..2 {
        assert!(sched.get_history(cell(i), slot(100)).is_some());
        assert!(sched.metrics().cell_metrics(cell(i)).nof_dl_grants > 0);
    }
    // The aggregating UE is served on both carriers.
    sched.with_ue_repository(|ues| {
        let ue2 = ues.get(ue(2)).unwrap();
        assert_eq!(ue2.cells().len(), 2);
    });
}
