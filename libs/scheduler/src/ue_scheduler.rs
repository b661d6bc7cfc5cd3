//! Multi-cell UE scheduler.
//!
//! One thread per cell calls [`UeScheduler::run_slot`] every slot. Each call
//! goes through the same pipeline:
//!
//! 1. advance the cell's resource grid;
//! 2. apply queued UE events;
//! 3. advance UE timers (once per slot, whichever cell gets there first);
//! 4. run the cell's UCI and SRB0 schedulers;
//! 5. meet the other cells at the sync point, where the last one to arrive
//!    runs the scheduling strategy over all cells;
//! 6. register the HARQ-ACK bits of finalized UL control grants;
//! 7. check the finalized slot for conflicting UL grants.
//!
//! Locks are always taken in this order: event queues, cell schedulers, UE
//! repository, cell grids (ascending cell index), strategy. No lock is held
//! while waiting at the sync point.

use std::sync::Arc;

use nrsched_events::{ErrorOutcome, EventScope, UeEvent};
use nrsched_id::{CellIndex, EventId, HarqId, Rnti, SlotPoint, UeIndex, MAX_NOF_CELLS};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::cell::{CellConfig, CellResourceAllocator};
use crate::cell_schedulers::{FifoSrb0Scheduler, NoopUciScheduler, Srb0Scheduler, UciScheduler};
use crate::config::SchedulerExpertConfig;
use crate::error::SchedulerError;
use crate::event_manager::UeEventManager;
use crate::grid_allocator::{is_pdsch_allowed, CellView, UeCellGridAllocator, UeResourceGridView};
use crate::harq::{UlHarqProcess, MAX_NOF_CODEWORDS};
use crate::metrics::SchedulerMetricsHandler;
use crate::notifier::SchedConfigurationNotifier;
use crate::result::SchedResult;
use crate::strategy::SchedulerStrategy;
use crate::sync_point::SchedulerSyncPoint;
use crate::ue_repository::UeRepository;

/// PRBs used for one SRB0 PDSCH by the default SRB0 scheduler.
const DEFAULT_SRB0_NOF_PRBS: u32 = 4;

/// Everything needed to add a cell.
pub struct UeSchedulerCellParams {
    pub cfg: CellConfig,
    pub uci_sched: Box<dyn UciScheduler>,
    pub srb0_sched: Box<dyn Srb0Scheduler>,
}

impl UeSchedulerCellParams {
    /// Parameters with the default cell schedulers: no periodic UCI and a
    /// FIFO SRB0 scheduler.
    pub fn new(cfg: CellConfig, expert_cfg: &SchedulerExpertConfig) -> Self {
        Self {
            cfg,
            uci_sched: Box::new(NoopUciScheduler),
            srb0_sched: Box::new(FifoSrb0Scheduler::new(expert_cfg.clone(), DEFAULT_SRB0_NOF_PRBS)),
        }
    }

    pub fn with_uci_scheduler(mut self, uci_sched: Box<dyn UciScheduler>) -> Self {
        self.uci_sched = uci_sched;
        self
    }

    pub fn with_srb0_scheduler(mut self, srb0_sched: Box<dyn Srb0Scheduler>) -> Self {
        self.srb0_sched = srb0_sched;
        self
    }
}

/// Per-cell state owned by the scheduler.
pub(crate) struct CellContext {
    pub(crate) cfg: CellConfig,
    pub(crate) res_alloc: Mutex<CellResourceAllocator>,
    pub(crate) uci_sched: Mutex<Box<dyn UciScheduler>>,
    pub(crate) srb0_sched: Mutex<Box<dyn Srb0Scheduler>>,
}

/// The UE scheduler of a group of cells sharing one numerology.
pub struct UeScheduler {
    expert_cfg: SchedulerExpertConfig,
    cells: Vec<Option<CellContext>>,
    nof_cells: usize,
    numerology: Option<u8>,
    ue_db: RwLock<UeRepository>,
    event_mng: UeEventManager,
    strategy: Mutex<Box<dyn SchedulerStrategy>>,
    sync_point: SchedulerSyncPoint,
    metrics: SchedulerMetricsHandler,
}

impl UeScheduler {
    /// Create a new scheduler without cells.
    pub fn new(
        expert_cfg: SchedulerExpertConfig,
        strategy: Box<dyn SchedulerStrategy>,
        notifier: Arc<dyn SchedConfigurationNotifier>,
        metrics: SchedulerMetricsHandler,
    ) -> Result<Self, SchedulerError> {
        expert_cfg.validate()?;
        info!(strategy = strategy.name(), history_depth = expert_cfg.history_depth, "Creating UE scheduler");
        Ok(Self {
            event_mng: UeEventManager::new(expert_cfg.clone(), notifier),
            expert_cfg,
            cells: (0..MAX_NOF_CELLS).map(|_| None).collect(),
            nof_cells: 0,
            numerology: None,
            ue_db: RwLock::new(UeRepository::new()),
            strategy: Mutex::new(strategy),
            sync_point: SchedulerSyncPoint::new(),
            metrics,
        })
    }

    pub fn expert_cfg(&self) -> &SchedulerExpertConfig {
        &self.expert_cfg
    }

    pub fn nof_cells(&self) -> usize {
        self.nof_cells
    }

    pub fn metrics(&self) -> &SchedulerMetricsHandler {
        &self.metrics
    }

    pub fn cell_config(&self, cell_index: CellIndex) -> Option<&CellConfig> {
        self.cell(cell_index).map(|c| &c.cfg)
    }

    fn cell(&self, cell_index: CellIndex) -> Option<&CellContext> {
        self.cells.get(cell_index.as_usize()).and_then(Option::as_ref)
    }

    /// Registers a cell. Every cell added becomes a participant of the sync
    /// point, so all cells must be added before the first slot is run.
    #[instrument(skip_all, fields(cell = %params.cfg.cell_index))]
    pub fn add_cell(&mut self, params: UeSchedulerCellParams) -> Result<(), SchedulerError> {
        let cell_index = params.cfg.cell_index;
        if self.cell(cell_index).is_some() {
            return Err(SchedulerError::CellAlreadyConfigured(cell_index));
        }
        if let Some(expected) = self.numerology {
            if expected != params.cfg.numerology {
                return Err(SchedulerError::NumerologyMismatch {
                    cell_index,
                    expected,
                    actual: params.cfg.numerology,
                });
            }
        }

        let res_alloc = CellResourceAllocator::new(
            params.cfg.clone(),
            self.expert_cfg.history_depth,
            self.expert_cfg.grid_lookahead(),
        );
        self.numerology = Some(params.cfg.numerology);
        self.cells[cell_index.as_usize()] = Some(CellContext {
            cfg: params.cfg,
            res_alloc: Mutex::new(res_alloc),
            uci_sched: Mutex::new(params.uci_sched),
            srb0_sched: Mutex::new(params.srb0_sched),
        });
        self.nof_cells += 1;
        info!(nof_cells = self.nof_cells, "Cell added");
        Ok(())
    }

    /// Queues a UE event. It is applied at the start of the next slot of the
    /// cell it is addressed to.
    pub fn handle_ue_event(&self, event: UeEvent) -> Result<EventId, SchedulerError> {
        if let EventScope::Cell(cell_index) = event.scope() {
            if self.cell(cell_index).is_none() {
                return Err(SchedulerError::CellNotConfigured(cell_index));
            }
        }
        Ok(self.event_mng.enqueue(event)?)
    }

    /// Number of queued UE events.
    pub fn nof_pending_events(&self) -> usize {
        self.event_mng.nof_pending()
    }

    // =========================================================================
    // Slot pipeline
    // =========================================================================

    /// Schedules `slot_tx` in `cell_index`.
    ///
    /// # Panics
    ///
    /// Panics if the cell is not configured, or on any sync point contract
    /// violation.
    pub fn run_slot(&self, slot_tx: SlotPoint, cell_index: CellIndex) {
        let Some(cell) = self.cell(cell_index) else {
            panic!("run_slot called for unconfigured {}", cell_index);
        };

        cell.res_alloc.lock().slot_indication(slot_tx);

        self.event_mng
            .run(slot_tx, cell_index, &self.ue_db, &self.cells, &self.metrics);

        let nof_timeouts = self.ue_db.write().slot_indication(slot_tx);
        if let Some(nof_timeouts) = nof_timeouts.filter(|n| *n > 0) {
            self.metrics
                .record(cell_index, |m| m.nof_harq_timeouts += nof_timeouts as u64);
        }

        {
            let mut uci_sched = cell.uci_sched.lock();
            let ues = self.ue_db.read();
            let mut res_alloc = cell.res_alloc.lock();
            uci_sched.run_slot(&mut res_alloc, &ues);
        }
        {
            let mut srb0_sched = cell.srb0_sched.lock();
            let mut ues = self.ue_db.write();
            let mut res_alloc = cell.res_alloc.lock();
            srb0_sched.run_slot(&mut res_alloc, &mut ues);
        }

        self.sync_point
            .wait(slot_tx, self.nof_cells, || self.run_sched_strategy(slot_tx));

        let slot_ack = slot_tx - self.expert_cfg.harq_ack_slot_delay;
        self.update_harq_pucch_counter(slot_ack, cell_index);
        self.puxch_grant_sanitizer(slot_ack, cell_index);
    }

    /// Runs the strategy over every cell. Called by the last cell to reach
    /// the sync point.
    fn run_sched_strategy(&self, slot_tx: SlotPoint) {
        let mut ues = self.ue_db.write();
        let configured: Vec<&CellContext> = self.cells.iter().flatten().collect();
        let mut grids: Vec<_> = configured.iter().map(|c| c.res_alloc.lock()).collect();
        let mut strategy = self.strategy.lock();

        let view = UeResourceGridView::new(
            slot_tx,
            configured
                .iter()
                .zip(grids.iter())
                .map(|(c, grid)| CellView {
                    cfg: &c.cfg,
                    pdsch_allowed: is_pdsch_allowed(&self.expert_cfg, grid),
                })
                .collect(),
        );
        let mut alloc = UeCellGridAllocator::new(
            &self.expert_cfg,
            slot_tx,
            grids.iter_mut().map(|g| &mut **g).collect(),
        );

        if view.any_pdsch_allowed() {
            strategy.dl_sched(&mut alloc, &view, &mut ues);
        }
        strategy.ul_sched(&mut alloc, &view, &mut ues);

        for (cell_index, stats) in alloc.stats() {
            self.metrics.record(cell_index, |m| {
                m.nof_dl_grants += u64::from(stats.nof_dl_grants);
                m.nof_dl_retxs += u64::from(stats.nof_dl_retxs);
                m.nof_ul_grants += u64::from(stats.nof_ul_grants);
                m.nof_ul_retxs += u64::from(stats.nof_ul_retxs);
            });
        }
        self.metrics.slot_indication(slot_tx, ues.len());
    }

    /// Counts, for every DL HARQ process, the finalized UL control grants
    /// of `slot_ack` that will carry its feedback.
    fn update_harq_pucch_counter(&self, slot_ack: SlotPoint, cell_index: CellIndex) {
        let Some(cell) = self.cell(cell_index) else {
            return;
        };
        let feedback: Vec<(Rnti, u8)> = {
            let res_alloc = cell.res_alloc.lock();
            let Some(alloc) = res_alloc.get_history(slot_ack) else {
                return;
            };
            let ul = &alloc.result.ul;
            ul.pucchs
                .iter()
                .map(|p| (p.crnti, p.harq_ack_nof_bits()))
                .chain(ul.puschs.iter().map(|p| (p.rnti, p.harq_ack_nof_bits())))
                .filter(|(_, nof_bits)| *nof_bits > 0)
                .collect()
        };
        if feedback.is_empty() {
            return;
        }

        let mut ues = self.ue_db.write();
        for (rnti, nof_bits) in feedback {
            let Some(ue_cell) = ues
                .find_by_rnti_mut(rnti)
                .and_then(|ue| ue.find_cell_mut(cell_index))
            else {
                warn!(cell = %cell_index, rnti = %rnti, slot = %slot_ack, "UL control grant for unknown UE");
                continue;
            };
            for bit_idx in 0..nof_bits {
                match ue_cell.harqs.find_dl_harq_waiting_ack_slot(slot_ack, bit_idx) {
                    Some(h) => h.increment_pucch_counter(),
                    None => warn!(
                        cell = %cell_index,
                        rnti = %rnti,
                        slot = %slot_ack,
                        harq_bit_idx = bit_idx,
                        "No DL HARQ process waiting for HARQ-ACK bit"
                    ),
                }
            }
        }
    }

    /// A UE must not have both a PUSCH and a PUCCH in one slot. Checks the
    /// same finalized slot as the HARQ-ACK bookkeeping.
    fn puxch_grant_sanitizer(&self, slot_ack: SlotPoint, cell_index: CellIndex) {
        let Some(cell) = self.cell(cell_index) else {
            return;
        };
        if !cell.cfg.is_ul_enabled(slot_ack) {
            return;
        }
        let res_alloc = cell.res_alloc.lock();
        let Some(alloc) = res_alloc.get_history(slot_ack) else {
            return;
        };
        let result = &alloc.result;
        for pusch in &result.ul.puschs {
            if result.find_pucch(pusch.rnti).is_some() {
                error!(
                    cell = %cell_index,
                    rnti = %pusch.rnti,
                    slot = %slot_ack,
                    "UE has both PUSCH and PUCCH in the same slot"
                );
                self.metrics.record(cell_index, |m| m.nof_puxch_conflicts += 1);
            }
        }
    }

    // =========================================================================
    // Error indication
    // =========================================================================

    /// Rolls back the HARQ processes of grants that the lower layers could
    /// not transmit in `slot`.
    #[instrument(skip_all, fields(cell = %cell_index, slot = %slot))]
    pub fn handle_error_indication(&self, slot: SlotPoint, cell_index: CellIndex, outcome: ErrorOutcome) {
        let Some(cell) = self.cell(cell_index) else {
            error!("Error indication for unconfigured cell");
            return;
        };
        self.metrics.record(cell_index, |m| m.nof_error_indications += 1);
        if outcome.is_empty() {
            return;
        }

        let result = {
            let res_alloc = cell.res_alloc.lock();
            match res_alloc.get_history(slot) {
                Some(alloc) => alloc.result.clone(),
                None => {
                    warn!(slot_tx = ?res_alloc.slot_tx(), "Error indication for a slot no longer in history");
                    self.metrics
                        .record(cell_index, |m| m.nof_stale_error_indications += 1);
                    return;
                }
            }
        };

        let mut ues = self.ue_db.write();
        let mut nof_cancelled = 0usize;

        if outcome.pdcch_discarded {
            for pdcch in &result.dl.dl_pdcchs {
                if let Some(harq_id) = pdcch.dci.harq_id() {
                    nof_cancelled += cancel_dl_harq(&mut ues, cell_index, pdcch.rnti, harq_id, slot);
                }
            }
            for pdcch in &result.dl.ul_pdcchs {
                if let Some(harq_id) = pdcch.dci.ue_harq_id() {
                    nof_cancelled += cancel_ul_harq(&mut ues, cell_index, pdcch.rnti, harq_id, |h| {
                        h.slot_tx() == Some(slot)
                    });
                }
            }
        }

        if outcome.pdsch_discarded {
            for grant in &result.dl.ue_grants {
                nof_cancelled += cancel_dl_harq(&mut ues, cell_index, grant.rnti, grant.harq_id, slot);
            }
        }

        if outcome.pusch_and_pucch_discarded {
            for pusch in &result.ul.puschs {
                nof_cancelled += cancel_ul_harq(&mut ues, cell_index, pusch.rnti, pusch.harq_id, |h| {
                    h.slot_rx() == Some(slot)
                });
                if pusch.harq_ack_nof_bits() > 0 {
                    nof_cancelled += cancel_dl_harqs_at(&mut ues, cell_index, pusch.rnti, slot);
                }
            }
            for pucch in &result.ul.pucchs {
                if pucch.harq_ack_nof_bits() > 0 {
                    nof_cancelled += cancel_dl_harqs_at(&mut ues, cell_index, pucch.crnti, slot);
                }
            }
        }

        info!(nof_cancelled, ?outcome, "Error indication handled");
        self.metrics
            .record(cell_index, |m| m.nof_cancelled_harqs += nof_cancelled as u64);
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Decisions taken for `slot` in `cell_index`, while still in history.
    pub fn get_history(&self, cell_index: CellIndex, slot: SlotPoint) -> Option<SchedResult> {
        let cell = self.cell(cell_index)?;
        let res_alloc = cell.res_alloc.lock();
        res_alloc.get_history(slot).map(|alloc| alloc.result.clone())
    }

    /// Index of the UE currently addressed by `rnti`.
    pub fn find_ue_by_rnti(&self, rnti: Rnti) -> Option<UeIndex> {
        self.ue_db.read().find_by_rnti(rnti).map(|ue| ue.ue_index())
    }

    /// Runs `f` with shared access to the UE repository.
    pub fn with_ue_repository<R>(&self, f: impl FnOnce(&UeRepository) -> R) -> R {
        f(&self.ue_db.read())
    }

    /// Last slot for which every cell completed the sync point.
    pub fn last_completed_slot(&self) -> Option<SlotPoint> {
        self.sync_point.last_completed_slot()
    }
}

fn cancel_dl_harq(
    ues: &mut UeRepository,
    cell_index: CellIndex,
    rnti: Rnti,
    harq_id: HarqId,
    slot: SlotPoint,
) -> usize {
    let Some(h) = ues
        .find_by_rnti_mut(rnti)
        .and_then(|ue| ue.find_cell_mut(cell_index))
        .and_then(|c| c.harqs.dl_harq_mut(harq_id))
    else {
        debug!(rnti = %rnti, harq = %harq_id, "Skipping DL HARQ of unknown UE");
        return 0;
    };
    // The process may have been reused since the discarded grant.
    if h.slot_tx() != Some(slot) {
        return 0;
    }
    let mut cancelled = false;
    for cw in 0..MAX_NOF_CODEWORDS {
        cancelled |= h.cancel(cw);
    }
    if cancelled {
        debug!(rnti = %rnti, harq = %harq_id, "DL HARQ cancelled");
    }
    usize::from(cancelled)
}

fn cancel_ul_harq(
    ues: &mut UeRepository,
    cell_index: CellIndex,
    rnti: Rnti,
    harq_id: HarqId,
    is_same_grant: impl FnOnce(&UlHarqProcess) -> bool,
) -> usize {
    let Some(h) = ues
        .find_by_rnti_mut(rnti)
        .and_then(|ue| ue.find_cell_mut(cell_index))
        .and_then(|c| c.harqs.ul_harq_mut(harq_id))
    else {
        debug!(rnti = %rnti, harq = %harq_id, "Skipping UL HARQ of unknown UE");
        return 0;
    };
    if !is_same_grant(&*h) {
        return 0;
    }
    let cancelled = h.cancel();
    if cancelled {
        debug!(rnti = %rnti, harq = %harq_id, "UL HARQ cancelled");
    }
    usize::from(cancelled)
}

fn cancel_dl_harqs_at(ues: &mut UeRepository, cell_index: CellIndex, rnti: Rnti, slot_ack: SlotPoint) -> usize {
    match ues
        .find_by_rnti_mut(rnti)
        .and_then(|ue| ue.find_cell_mut(cell_index))
    {
        Some(ue_cell) => ue_cell.harqs.cancel_dl_harqs(slot_ack),
        None => 0,
    }
}
