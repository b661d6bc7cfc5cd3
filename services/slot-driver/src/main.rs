//! nrsched slot driver
//!
//! Drives the UE scheduler against a wall-clock slot tick.
//!
//! ## Architecture
//!
//! - **Cell threads**: one OS thread per cell runs the slot pipeline and
//!   reports emulated PHY feedback for the slot it just scheduled
//! - **Traffic generator**: refreshes DL buffer occupancies periodically
//! - **Metrics reporter**: logs the scheduler's periodic reports

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use nrsched_slot_driver::cell_runner::{run_cell, CellRunSummary};
use nrsched_slot_driver::lower_layer::LowerLayerEmulator;
use nrsched_slot_driver::slot_clock::SlotClock;
use nrsched_slot_driver::{reporter, setup, traffic, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.as_str().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        nof_cells = config.nof_cells,
        numerology = config.numerology,
        nof_ues = config.nof_ues,
        strategy = %config.strategy,
        slot_period_us = config.slot_period.as_micros() as u64,
        nof_slots = config.nof_slots,
        "Starting nrsched slot driver"
    );

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (metrics_tx, metrics_rx) = mpsc::channel(config.metrics_channel_capacity);
    let sched = Arc::new(setup::build_scheduler(&config, metrics_tx)?);

    let mut ues = Vec::new();
    for event in setup::initial_ue_events(&config)? {
        if let nrsched_events::UeEvent::Created(p) = &event {
            ues.push(p.ue_index);
        }
        sched.handle_ue_event(event)?;
    }

    // Start the metrics reporter
    let reporter_handle = tokio::spawn(reporter::run_metrics_reporter(metrics_rx));

    // Start the traffic generator
    let traffic_handle = tokio::spawn(traffic::run_traffic_loop(
        Arc::clone(&sched),
        ues,
        config.traffic_interval,
        config.traffic_bytes,
        config.seed,
        shutdown_rx.clone(),
    ));

    // Start one thread per cell
    let clock = Arc::new(SlotClock::new(
        config.numerology,
        config.slot_period,
        config.nof_slots,
    ));
    let phy_cfg = setup::lower_layer_config(&config);
    let mut cell_threads = Vec::new();
    for cell_index in setup::cell_indexes(&config)? {
        let sched = Arc::clone(&sched);
        let clock = Arc::clone(&clock);
        let handle = std::thread::Builder::new()
            .name(format!("{cell_index}"))
            .spawn(move || {
                run_cell(&sched, &clock, cell_index, LowerLayerEmulator::new(cell_index, phy_cfg))
            })
            .with_context(|| format!("failed to spawn thread for {cell_index}"))?;
        cell_threads.push(handle);
    }
    let mut cells_handle = tokio::task::spawn_blocking(move || {
        cell_threads
            .into_iter()
            .map(|h| h.join())
            .collect::<std::thread::Result<Vec<CellRunSummary>>>()
    });

    // Wait for shutdown signal or the configured run length
    let cells_result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            let stop_at = clock.stop();
            info!(stop_at, "Received shutdown signal");
            (&mut cells_handle).await
        }
        result = &mut cells_handle => result,
    };

    match cells_result {
        Ok(Ok(summaries)) => {
            let nof_slots: u64 = summaries.iter().map(|s| s.nof_slots).sum();
            info!(nof_cells = summaries.len(), nof_slots, "Cell threads exited normally");
        }
        Ok(Err(_)) => error!("Cell thread panicked"),
        Err(e) => error!(error = %e, "Cell supervisor task failed"),
    }

    // Signal shutdown to all workers
    let _ = shutdown_tx.send(true);

    match traffic_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Traffic generator error"),
        Err(e) => error!(error = %e, "Traffic generator panicked"),
    }

    // The reporter ends once the scheduler, and with it the metrics sender,
    // is dropped.
    drop(sched);
    match reporter_handle.await {
        Ok(Ok(nof_reports)) => info!(nof_reports, "Metrics reporter exited"),
        Ok(Err(e)) => warn!(error = %e, "Metrics reporter error"),
        Err(e) => error!(error = %e, "Metrics reporter panicked"),
    }

    info!("Slot driver shutdown complete");
    Ok(())
}
