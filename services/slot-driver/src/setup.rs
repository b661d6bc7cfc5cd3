//! Scheduler assembly from the driver configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use nrsched_events::{UeConfig, UeCreatedPayload, UeEvent};
use nrsched_id::{CellIndex, Rnti, UeIndex};
use nrsched_scheduler::{
    create_scheduler_strategy, CellConfig, DuplexMode, LoggingNotifier, PeriodicUciScheduler,
    SchedulerMetricsHandler, SchedulerMetricsReport, UeScheduler, UeSchedulerCellParams,
};
use tokio::sync::mpsc;
use tracing::info;

use crate::config::Config;
use crate::lower_layer::LowerLayerConfig;

/// First C-RNTI handed to the UEs created at startup.
const FIRST_CRNTI: u16 = 0x4601;

/// Builds the scheduler with every configured cell added.
pub fn build_scheduler(
    config: &Config,
    metrics_tx: mpsc::Sender<SchedulerMetricsReport>,
) -> Result<UeScheduler> {
    let strategy = create_scheduler_strategy(&config.strategy)?;
    let metrics = SchedulerMetricsHandler::new(config.expert.metrics_report_period_slots, metrics_tx);
    let mut sched = UeScheduler::new(
        config.expert.clone(),
        strategy,
        Arc::new(LoggingNotifier),
        metrics,
    )?;

    for cell_index in cell_indexes(config)? {
        let cfg = CellConfig {
            duplex: config.tdd_pattern.map_or(DuplexMode::Fdd, DuplexMode::Tdd),
            ..CellConfig::fdd(cell_index, config.numerology, config.nof_prbs)
        };
        let uci = PeriodicUciScheduler::new(
            &config.expert,
            config.sr_period_slots,
            config.csi_period_slots,
        );
        sched
            .add_cell(UeSchedulerCellParams::new(cfg, &config.expert).with_uci_scheduler(Box::new(uci)))
            .with_context(|| format!("failed to add {cell_index}"))?;
        info!(cell_index = %cell_index, nof_prbs = config.nof_prbs, "Cell added");
    }
    Ok(sched)
}

pub fn cell_indexes(config: &Config) -> Result<Vec<CellIndex>> {
    (0..config.nof_cells)
        .map(|i| CellIndex::new(i).context("invalid cell index"))
        .collect()
}

/// Creation events of the startup UEs. UE `i` has its PCell on cell
/// `i % nof_cells`; with carrier aggregation every other cell is an SCell.
pub fn initial_ue_events(config: &Config) -> Result<Vec<UeEvent>> {
    let cells = cell_indexes(config)?;
    (0..config.nof_ues)
        .map(|i| -> Result<UeEvent> {
            let pcell_index = cells[usize::from(i) % cells.len()];
            let scell_indexes = if config.carrier_aggregation {
                cells.iter().copied().filter(|c| *c != pcell_index).collect()
            } else {
                Vec::new()
            };
            Ok(UeEvent::Created(UeCreatedPayload {
                ue_index: UeIndex::new(i)?,
                crnti: Rnti::new_crnti(
                    FIRST_CRNTI.checked_add(i).context("C-RNTI space exhausted")?,
                )?,
                config: UeConfig {
                    scell_indexes,
                    ..UeConfig::single_cell(pcell_index)
                },
            }))
        })
        .collect()
}

pub fn lower_layer_config(config: &Config) -> LowerLayerConfig {
    LowerLayerConfig {
        seed: config.seed,
        ack_probability: config.ack_probability,
        crc_ok_probability: config.crc_ok_probability,
        error_indication_period_slots: config.error_indication_period_slots,
        max_bsr_bytes: config.traffic_bytes,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use nrsched_testing::cell;
    use rstest::rstest;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
    }

    #[test]
    fn test_builds_every_cell() {
        let (tx, _rx) = mpsc::channel(1);
        let sched = build_scheduler(&config(&[("NRSCHED_NOF_CELLS", "3")]), tx).unwrap();
        assert_eq!(sched.nof_cells(), 3);
        assert_eq!(sched.cell_config(cell(2)).map(|c| c.nof_dl_prbs), Some(52));
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        let (tx, _rx) = mpsc::channel(1);
        assert!(build_scheduler(&config(&[("NRSCHED_STRATEGY", "qos")]), tx).is_err());
    }

    #[rstest]
    #[case::single_carrier("false", 0)]
    #[case::carrier_aggregation("true", 1)]
    fn test_initial_ues(#[case] ca: &str, #[case] nof_scells: usize) {
        let cfg = config(&[
            ("NRSCHED_NOF_CELLS", "2"),
            ("NRSCHED_NOF_UES", "3"),
            ("NRSCHED_CARRIER_AGGREGATION", ca),
        ]);
        let events = initial_ue_events(&cfg).unwrap();
        assert_eq!(events.len(), 3);
        for (i, event) in events.iter().enumerate() {
            let UeEvent::Created(p) = event else {
                panic!("expected ue.created");
            };
            assert_eq!(p.config.pcell_index, cell((i % 2) as u8));
            assert_eq!(p.config.scell_indexes.len(), nof_scells);
            assert!(event.validate().is_ok());
        }
    }
}
