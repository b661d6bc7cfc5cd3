//! Metrics report consumer.

use anyhow::Result;
use nrsched_scheduler::SchedulerMetricsReport;
use tokio::sync::mpsc;
use tracing::info;

/// Logs every metrics report until the scheduler drops its sender.
pub async fn run_metrics_reporter(mut rx: mpsc::Receiver<SchedulerMetricsReport>) -> Result<u64> {
    let mut nof_reports = 0u64;
    while let Some(report) = rx.recv().await {
        nof_reports += 1;
        for (cell_index, m) in &report.cells {
            info!(
                slot = %report.slot,
                cell_index = %cell_index,
                nof_ues = report.nof_ues,
                dl_grants = m.nof_dl_grants,
                dl_retxs = m.nof_dl_retxs,
                ul_grants = m.nof_ul_grants,
                acks = m.nof_harq_acks,
                nacks = m.nof_harq_nacks,
                timeouts = m.nof_harq_timeouts,
                error_indications = m.nof_error_indications,
                cancelled_harqs = m.nof_cancelled_harqs,
                "Cell metrics"
            );
        }
        info!(report = %serde_json::to_string(&report)?, "Metrics report");
    }
    info!(nof_reports, "Metrics reporter stopped");
    Ok(nof_reports)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use nrsched_scheduler::CellMetrics;
    use nrsched_testing::{cell, slot};

    use super::*;

    #[tokio::test]
    async fn test_drains_until_sender_dropped() {
        let (tx, rx) = mpsc::channel(4);
        for count in [1000, 2000] {
            tx.send(SchedulerMetricsReport {
                slot: slot(count),
                nof_slots: 1000,
                nof_ues: 2,
                nof_deferred: 0,
                cells: BTreeMap::from([(cell(0), CellMetrics::default())]),
            })
            .await
            .unwrap();
        }
        drop(tx);
        assert_eq!(run_metrics_reporter(rx).await.unwrap(), 2);
    }
}
