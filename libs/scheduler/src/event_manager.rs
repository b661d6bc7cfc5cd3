//! UE event manager.
//!
//! Events arrive from arbitrary threads and are queued. They are applied at
//! the start of a slot, before any grant decision for that slot:
//! - common events (UE lifecycle, DL buffer state) once per slot, by the
//!   first cell that runs the slot;
//! - cell events (BSR, UCI, CRC) by the cell that produced them.
//!
//! Queues are only locked long enough to swap their contents out, so
//! producers never wait for event processing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use nrsched_events::{
    CrcIndicationPayload, DlBufferStatePayload, EventEnvelope, EventError, EventScope,
    UciIndicationPayload, UeCreatedPayload, UeEvent, UeReconfiguredPayload, UeRemovedPayload,
    UlBsrPayload, LCID_SRB0,
};
use nrsched_id::{CellIndex, EventId, SlotPoint, UeIndex, MAX_NOF_CELLS};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, instrument, warn};

use crate::config::SchedulerExpertConfig;
use crate::error::SchedulerError;
use crate::harq::HarqOutcome;
use crate::metrics::SchedulerMetricsHandler;
use crate::notifier::SchedConfigurationNotifier;
use crate::ue::Ue;
use crate::ue_repository::UeRepository;
use crate::ue_scheduler::CellContext;

type EventQueue = Mutex<Vec<EventEnvelope<UeEvent>>>;

/// Side effects collected while the UE directory is locked and executed
/// after it is released.
#[derive(Debug, Default)]
struct Deferred {
    config_complete: Vec<(UeIndex, bool)>,
    deleted: Vec<UeIndex>,
    srb0_updates: Vec<(CellIndex, UeIndex, u32)>,
}

/// Queues and applies UE events.
pub struct UeEventManager {
    expert_cfg: SchedulerExpertConfig,
    notifier: Arc<dyn SchedConfigurationNotifier>,
    next_event_id: AtomicU64,
    last_common_slot: Mutex<Option<SlotPoint>>,
    common_events: EventQueue,
    cell_events: Vec<EventQueue>,
}

impl UeEventManager {
    pub fn new(expert_cfg: SchedulerExpertConfig, notifier: Arc<dyn SchedConfigurationNotifier>) -> Self {
        Self {
            expert_cfg,
            notifier,
            next_event_id: AtomicU64::new(0),
            last_common_slot: Mutex::new(None),
            common_events: Mutex::new(Vec::new()),
            cell_events: (0..MAX_NOF_CELLS).map(|_| Mutex::new(Vec::new())).collect(),
        }
    }

    /// Validates and queues an event. Returns the assigned event id.
    pub fn enqueue(&self, event: UeEvent) -> Result<EventId, EventError> {
        let event_id = EventId::new(self.next_event_id.fetch_add(1, Ordering::Relaxed));
        let envelope = EventEnvelope::for_ue_event(event_id, event)?;
        debug!(
            event_id = %event_id,
            event_type = %envelope.event_type,
            scope = %envelope.scope,
            "Event queued"
        );
        match envelope.scope {
            EventScope::Common => self.common_events.lock().push(envelope),
            EventScope::Cell(cell_index) => self.cell_events[cell_index.as_usize()].lock().push(envelope),
        }
        Ok(event_id)
    }

    /// Number of queued events, all scopes.
    pub fn nof_pending(&self) -> usize {
        self.common_events.lock().len()
            + self.cell_events.iter().map(|q| q.lock().len()).sum::<usize>()
    }

    /// Applies the events due for `cell_index` at `slot`.
    pub(crate) fn run(
        &self,
        slot: SlotPoint,
        cell_index: CellIndex,
        ue_db: &RwLock<UeRepository>,
        cells: &[Option<CellContext>],
        metrics: &SchedulerMetricsHandler,
    ) {
        // Held until the events are applied, so that no cell applies its own
        // events before the common events of the slot.
        let mut last_common_slot = self.last_common_slot.lock();
        let common = if *last_common_slot == Some(slot) {
            Vec::new()
        } else {
            *last_common_slot = Some(slot);
            std::mem::take(&mut *self.common_events.lock())
        };
        let own = std::mem::take(&mut *self.cell_events[cell_index.as_usize()].lock());
        if common.is_empty() && own.is_empty() {
            return;
        }

        let mut deferred = Deferred::default();
        {
            let mut ues = ue_db.write();
            for envelope in common.iter().chain(own.iter()) {
                if let Err(e) = self.apply(envelope, &mut ues, cells, metrics, &mut deferred) {
                    warn!(
                        event_id = %envelope.event_id,
                        event_type = %envelope.event_type,
                        slot = %slot,
                        error = %e,
                        "Discarding event"
                    );
                }
            }
        }
        drop(last_common_slot);

        for (pcell, ue_index, pending_bytes) in deferred.srb0_updates {
            if let Some(cell) = cells.get(pcell.as_usize()).and_then(Option::as_ref) {
                cell.srb0_sched
                    .lock()
                    .handle_dl_buffer_state_indication(ue_index, pending_bytes);
            }
        }
        for (ue_index, success) in deferred.config_complete {
            self.notifier.on_ue_config_complete(ue_index, success);
        }
        for ue_index in deferred.deleted {
            self.notifier.on_ue_delete_response(ue_index);
        }
    }

    #[instrument(skip_all, fields(event_id = %envelope.event_id, event_type = %envelope.event_type))]
    fn apply(
        &self,
        envelope: &EventEnvelope<UeEvent>,
        ues: &mut UeRepository,
        cells: &[Option<CellContext>],
        metrics: &SchedulerMetricsHandler,
        deferred: &mut Deferred,
    ) -> Result<(), SchedulerError> {
        match &envelope.payload {
            UeEvent::Created(p) => {
                let result = self.handle_ue_created(p, ues, cells);
                deferred.config_complete.push((p.ue_index, result.is_ok()));
                result
            }
            UeEvent::Reconfigured(p) => {
                let result = self.handle_ue_reconfigured(p, ues, cells);
                deferred.config_complete.push((p.ue_index, result.is_ok()));
                result
            }
            UeEvent::Removed(p) => {
                deferred.deleted.push(p.ue_index);
                self.handle_ue_removed(p, ues)
            }
            UeEvent::DlBufferState(p) => self.handle_dl_buffer_state(p, ues, deferred),
            UeEvent::UlBsr(p) => self.handle_ul_bsr(p, ues),
            UeEvent::UciIndication(p) => self.handle_uci_indication(p, ues, metrics),
            UeEvent::CrcIndication(p) => self.handle_crc_indication(p, ues, metrics),
        }
    }

    fn check_cells_configured(
        config: &nrsched_events::UeConfig,
        cells: &[Option<CellContext>],
    ) -> Result<(), SchedulerError> {
        for cell_index in config.serving_cells() {
            if cells.get(cell_index.as_usize()).and_then(Option::as_ref).is_none() {
                return Err(SchedulerError::CellNotConfigured(cell_index));
            }
        }
        Ok(())
    }

    fn handle_ue_created(
        &self,
        p: &UeCreatedPayload,
        ues: &mut UeRepository,
        cells: &[Option<CellContext>],
    ) -> Result<(), SchedulerError> {
        Self::check_cells_configured(&p.config, cells)?;
        ues.add_ue(Ue::new(p.ue_index, p.crnti, p.config.clone(), &self.expert_cfg))
    }

    fn handle_ue_reconfigured(
        &self,
        p: &UeReconfiguredPayload,
        ues: &mut UeRepository,
        cells: &[Option<CellContext>],
    ) -> Result<(), SchedulerError> {
        Self::check_cells_configured(&p.config, cells)?;
        let ue = ues
            .get_mut(p.ue_index)
            .ok_or(SchedulerError::UeNotFound(p.ue_index))?;
        ue.handle_reconfiguration(p.config.clone(), &self.expert_cfg);
        Ok(())
    }

    fn handle_ue_removed(
        &self,
        p: &UeRemovedPayload,
        ues: &mut UeRepository,
    ) -> Result<(), SchedulerError> {
        ues.remove_ue(p.ue_index).map(|_| ())
    }

    fn handle_dl_buffer_state(
        &self,
        p: &DlBufferStatePayload,
        ues: &mut UeRepository,
        deferred: &mut Deferred,
    ) -> Result<(), SchedulerError> {
        let ue = ues
            .get_mut(p.ue_index)
            .ok_or(SchedulerError::UeNotFound(p.ue_index))?;
        if p.lcid == LCID_SRB0 {
            deferred
                .srb0_updates
                .push((ue.pcell().cell_index(), p.ue_index, p.pending_bytes));
        } else {
            ue.handle_dl_buffer_state(p.lcid, p.pending_bytes);
        }
        Ok(())
    }

    fn handle_ul_bsr(&self, p: &UlBsrPayload, ues: &mut UeRepository) -> Result<(), SchedulerError> {
        let ue = ues
            .find_by_rnti_mut(p.crnti)
            .ok_or(SchedulerError::RntiNotFound(p.crnti))?;
        if !ue.is_served_by(p.cell_index) {
            return Err(SchedulerError::CellNotServing {
                ue_index: ue.ue_index(),
                cell_index: p.cell_index,
            });
        }
        ue.handle_bsr(p.reported_bytes);
        Ok(())
    }

    fn handle_uci_indication(
        &self,
        p: &UciIndicationPayload,
        ues: &mut UeRepository,
        metrics: &SchedulerMetricsHandler,
    ) -> Result<(), SchedulerError> {
        let ue = ues
            .find_by_rnti_mut(p.crnti)
            .ok_or(SchedulerError::RntiNotFound(p.crnti))?;
        let ue_index = ue.ue_index();
        if p.sr_detected {
            ue.handle_sr();
        }
        let ue_cell = ue
            .find_cell_mut(p.cell_index)
            .ok_or(SchedulerError::CellNotServing {
                ue_index,
                cell_index: p.cell_index,
            })?;

        for (bit_idx, ack) in p.harq_bits.iter().enumerate() {
            let Ok(bit_idx) = u8::try_from(bit_idx) else {
                break;
            };
            let Some((_, outcome)) = ue_cell.harqs.dl_ack_info(p.slot_rx, bit_idx, *ack) else {
                continue;
            };
            metrics.record(p.cell_index, |m| match outcome {
                HarqOutcome::Acked => m.nof_harq_acks += 1,
                HarqOutcome::RetxPending => m.nof_harq_nacks += 1,
                HarqOutcome::MaxRetxReached => {
                    m.nof_harq_nacks += 1;
                    m.nof_harq_discards += 1;
                }
                HarqOutcome::AwaitingMoreFeedback | HarqOutcome::Ignored => {}
            });
        }
        Ok(())
    }

    fn handle_crc_indication(
        &self,
        p: &CrcIndicationPayload,
        ues: &mut UeRepository,
        metrics: &SchedulerMetricsHandler,
    ) -> Result<(), SchedulerError> {
        let ue = ues
            .find_by_rnti_mut(p.crnti)
            .ok_or(SchedulerError::RntiNotFound(p.crnti))?;
        let ue_index = ue.ue_index();
        let ue_cell = ue
            .find_cell_mut(p.cell_index)
            .ok_or(SchedulerError::CellNotServing {
                ue_index,
                cell_index: p.cell_index,
            })?;
        let Some(outcome) = ue_cell.harqs.ul_crc_info(p.harq_id, p.tb_crc_success) else {
            return Ok(());
        };
        metrics.record(p.cell_index, |m| {
            if p.tb_crc_success {
                m.nof_crc_ok += 1;
            } else {
                m.nof_crc_ko += 1;
            }
            if outcome == HarqOutcome::MaxRetxReached {
                m.nof_harq_discards += 1;
            }
        });
        Ok(())
    }
}
