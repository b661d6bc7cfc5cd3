//! DL traffic generator.
//!
//! Stands in for the RLC layer: at every tick one random UE gets a new DL
//! buffer occupancy on its data bearer.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use nrsched_events::{DlBufferStatePayload, UeEvent};
use nrsched_id::UeIndex;
use nrsched_scheduler::UeScheduler;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Logical channel of the default data bearer.
pub const DATA_LCID: u8 = 4;

/// Run the traffic generator until shutdown.
pub async fn run_traffic_loop(
    sched: Arc<UeScheduler>,
    ues: Vec<UeIndex>,
    interval: Duration,
    max_bytes: u32,
    seed: u64,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    if ues.is_empty() {
        info!("No UEs, traffic generator idle");
        return Ok(());
    }

    info!(
        nof_ues = ues.len(),
        interval_ms = interval.as_millis() as u64,
        max_bytes,
        "Starting traffic generator"
    );

    let mut rng = StdRng::seed_from_u64(seed);
    let mut interval_timer = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = interval_timer.tick() => {
                let ue_index = ues[rng.random_range(0..ues.len())];
                let pending_bytes = rng.random_range(1..=max_bytes.max(1));
                let event = UeEvent::DlBufferState(DlBufferStatePayload {
                    ue_index,
                    lcid: DATA_LCID,
                    pending_bytes,
                });
                match sched.handle_ue_event(event) {
                    Ok(event_id) => {
                        debug!(event_id = %event_id, ue_index = %ue_index, pending_bytes, "DL buffer state queued");
                    }
                    Err(e) => {
                        warn!(ue_index = %ue_index, error = %e, "DL buffer state rejected");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("Traffic generator shutting down");
                    return Ok(());
                }
            }
        }
    }
}
