//! Scheduler metrics.
//!
//! Counters are accumulated per cell and handed to a consumer through a
//! bounded channel every `metrics_report_period_slots`. A full channel never
//! blocks the slot pipeline: the report is deferred and the counters keep
//! accumulating until the next attempt.

use std::collections::BTreeMap;

use nrsched_id::{CellIndex, SlotPoint};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Counters of one cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CellMetrics {
    pub nof_dl_grants: u64,
    pub nof_dl_retxs: u64,
    pub nof_ul_grants: u64,
    pub nof_ul_retxs: u64,
    pub nof_harq_acks: u64,
    pub nof_harq_nacks: u64,
    pub nof_harq_discards: u64,
    pub nof_crc_ok: u64,
    pub nof_crc_ko: u64,
    pub nof_harq_timeouts: u64,
    pub nof_error_indications: u64,
    pub nof_stale_error_indications: u64,
    pub nof_cancelled_harqs: u64,
    pub nof_puxch_conflicts: u64,
}

/// Snapshot handed to the metrics consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerMetricsReport {
    pub slot: SlotPoint,
    pub nof_slots: u32,
    pub nof_ues: usize,
    pub nof_deferred: u32,
    pub cells: BTreeMap<CellIndex, CellMetrics>,
}

#[derive(Debug, Default)]
struct MetricsState {
    cells: BTreeMap<CellIndex, CellMetrics>,
    nof_slots: u32,
    nof_deferred: u32,
}

/// Accumulates counters and emits periodic reports.
#[derive(Debug)]
pub struct SchedulerMetricsHandler {
    report_period_slots: u32,
    tx: Option<mpsc::Sender<SchedulerMetricsReport>>,
    state: Mutex<MetricsState>,
}

impl SchedulerMetricsHandler {
    /// Create a new handler that reports to `tx`.
    pub fn new(report_period_slots: u32, tx: mpsc::Sender<SchedulerMetricsReport>) -> Self {
        Self {
            report_period_slots: report_period_slots.max(1),
            tx: Some(tx),
            state: Mutex::new(MetricsState::default()),
        }
    }

    /// A handler that only accumulates.
    pub fn disabled() -> Self {
        Self {
            report_period_slots: u32::MAX,
            tx: None,
            state: Mutex::new(MetricsState::default()),
        }
    }

    /// Updates the counters of a cell.
    pub fn record(&self, cell_index: CellIndex, update: impl FnOnce(&mut CellMetrics)) {
        update(self.state.lock().cells.entry(cell_index).or_default());
    }

    /// Current counters of a cell.
    pub fn cell_metrics(&self, cell_index: CellIndex) -> CellMetrics {
        self.state
            .lock()
            .cells
            .get(&cell_index)
            .copied()
            .unwrap_or_default()
    }

    /// Called once per slot. Sends a report at the end of every period.
    pub fn slot_indication(&self, slot: SlotPoint, nof_ues: usize) {
        let mut st = self.state.lock();
        st.nof_slots += 1;
        if st.nof_slots < self.report_period_slots {
            return;
        }
        let Some(tx) = &self.tx else {
            return;
        };

        let report = SchedulerMetricsReport {
            slot,
            nof_slots: st.nof_slots,
            nof_ues,
            nof_deferred: st.nof_deferred,
            cells: st.cells.clone(),
        };
        match tx.try_send(report) {
            Ok(()) => {
                debug!(slot = %slot, nof_slots = st.nof_slots, "Metrics report sent");
                *st = MetricsState::default();
            }
            Err(TrySendError::Full(_)) => {
                st.nof_deferred += 1;
                warn!(slot = %slot, nof_deferred = st.nof_deferred, "Metrics consumer busy, report deferred");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(slot = %slot, "Metrics consumer gone");
                *st = MetricsState::default();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell0() -> CellIndex {
        CellIndex::new(0).unwrap()
    }

    fn slot(count: u32) -> SlotPoint {
        SlotPoint::from_count(0, count).unwrap()
    }

    #[test]
    fn test_report_every_period() {
        let (tx, mut rx) = mpsc::channel(4);
        let metrics = SchedulerMetricsHandler::new(3, tx);
        metrics.record(cell0(), |m| m.nof_dl_grants += 2);
        for count in 0..3 {
            metrics.slot_indication(slot(count), 1);
        }
        let report = rx.try_recv().unwrap();
        assert_eq!(report.nof_slots, 3);
        assert_eq!(report.cells[&cell0()].nof_dl_grants, 2);
        assert_eq!(metrics.cell_metrics(cell0()), CellMetrics::default());
    }

    #[test]
    fn test_full_channel_defers_report() {
        let (tx, mut rx) = mpsc::channel(1);
        let metrics = SchedulerMetricsHandler::new(1, tx);
        metrics.record(cell0(), |m| m.nof_ul_grants += 1);
        metrics.slot_indication(slot(0), 0);
        metrics.record(cell0(), |m| m.nof_ul_grants += 1);
        metrics.slot_indication(slot(1), 0);

        // The second report could not be sent; its counters are kept.
        assert_eq!(metrics.cell_metrics(cell0()).nof_ul_grants, 1);
        assert_eq!(rx.try_recv().unwrap().cells[&cell0()].nof_ul_grants, 1);

        metrics.slot_indication(slot(2), 0);
        let report = rx.try_recv().unwrap();
        assert_eq!(report.nof_deferred, 1);
        assert_eq!(report.nof_slots, 2);
        assert_eq!(report.cells[&cell0()].nof_ul_grants, 1);
    }

    #[test]
    fn test_disabled_handler_accumulates() {
        let metrics = SchedulerMetricsHandler::disabled();
        metrics.record(cell0(), |m| m.nof_harq_acks += 1);
        metrics.slot_indication(slot(0), 0);
        assert_eq!(metrics.cell_metrics(cell0()).nof_harq_acks, 1);
    }

    #[test]
    fn test_report_serializes() {
        let mut cells = BTreeMap::new();
        cells.insert(cell0(), CellMetrics::default());
        let report = SchedulerMetricsReport {
            slot: slot(10),
            nof_slots: 10,
            nof_ues: 2,
            nof_deferred: 0,
            cells,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["cells"]["0"]["nof_dl_grants"], 0);
    }
}
