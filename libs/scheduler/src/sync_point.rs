//! Multi-cell synchronization point.
//!
//! Every cell thread calls [`SchedulerSyncPoint::wait`] once per slot. The
//! last thread to arrive runs the shared callback; nobody leaves the round
//! until the callback has finished.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, ThreadId};

use nrsched_id::SlotPoint;
use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct SyncState {
    generation: u64,
    nof_participants: Option<usize>,
    current_slot: Option<SlotPoint>,
    last_completed: Option<SlotPoint>,
    arrived: Vec<ThreadId>,
}

/// Reusable barrier for the cells of one scheduler.
///
/// Contract violations (a changing participant count, a slot that does not
/// advance, cells disagreeing on the slot, or one thread arriving twice in a
/// round) panic.
#[derive(Debug, Default)]
pub struct SchedulerSyncPoint {
    state: Mutex<SyncState>,
    cvar: Condvar,
}

impl SchedulerSyncPoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until `nof_participants` threads have called `wait` for `slot`.
    ///
    /// The last arrival runs `on_last` before anyone is released.
    pub fn wait<F: FnOnce()>(&self, slot: SlotPoint, nof_participants: usize, on_last: F) {
        assert!(nof_participants > 0, "sync point needs at least one participant");
        let mut st = self.state.lock();

        match st.nof_participants {
            None => st.nof_participants = Some(nof_participants),
            Some(n) => assert_eq!(
                n, nof_participants,
                "number of sync point participants changed"
            ),
        }

        if st.arrived.is_empty() {
            if let Some(last) = st.last_completed {
                assert!(
                    slot > last,
                    "slot {} is not newer than last completed slot {}",
                    slot,
                    last
                );
            }
            st.current_slot = Some(slot);
        } else {
            assert_eq!(
                st.current_slot,
                Some(slot),
                "cells disagree on the slot being scheduled"
            );
        }

        let me = thread::current().id();
        assert!(
            !st.arrived.contains(&me),
            "thread arrived twice at the sync point for slot {}",
            slot
        );
        st.arrived.push(me);

        if st.arrived.len() < nof_participants {
            let generation = st.generation;
            while st.generation == generation {
                self.cvar.wait(&mut st);
            }
            return;
        }

        let result = panic::catch_unwind(AssertUnwindSafe(on_last));
        st.arrived.clear();
        st.last_completed = st.current_slot.take();
        st.generation = st.generation.wrapping_add(1);
        self.cvar.notify_all();
        drop(st);
        if let Err(payload) = result {
            panic::resume_unwind(payload);
        }
    }

    /// Last slot for which every participant completed the round.
    pub fn last_completed_slot(&self) -> Option<SlotPoint> {
        self.state.lock().last_completed
    }
}
