//! Pluggable scheduling strategies.
//!
//! A strategy decides which UEs are served in a round and with how many
//! PRBs. It sees the cells through a [`UeResourceGridView`] and writes
//! grants through the [`UeCellGridAllocator`]; it never touches a grid
//! directly.

use nrsched_id::{CellIndex, UeIndex};
use tracing::debug;

use crate::error::{AllocError, SchedulerError};
use crate::grid_allocator::{UeCellGridAllocator, UeDlGrant, UeResourceGridView, UeUlGrant};
use crate::ue_repository::UeRepository;

/// Name of the round-robin strategy in configuration.
pub const TIME_RR_STRATEGY: &str = "time_rr";

/// Multi-cell grant policy invoked once per slot.
pub trait SchedulerStrategy: Send {
    fn name(&self) -> &'static str;

    /// Allocates DL grants. Only called if some cell allows PDSCH.
    fn dl_sched(
        &mut self,
        alloc: &mut UeCellGridAllocator<'_>,
        view: &UeResourceGridView<'_>,
        ues: &mut UeRepository,
    );

    /// Allocates UL grants. Called after [`SchedulerStrategy::dl_sched`].
    fn ul_sched(
        &mut self,
        alloc: &mut UeCellGridAllocator<'_>,
        view: &UeResourceGridView<'_>,
        ues: &mut UeRepository,
    );
}

/// Creates a strategy by name.
pub fn create_scheduler_strategy(name: &str) -> Result<Box<dyn SchedulerStrategy>, SchedulerError> {
    match name {
        TIME_RR_STRATEGY => Ok(Box::new(TimeRoundRobinStrategy::default())),
        other => Err(SchedulerError::UnknownStrategy(other.to_string())),
    }
}

// =============================================================================
// Round robin
// =============================================================================

/// Serves UEs in index order, starting one UE later every slot.
///
/// Retransmissions go before new data. Every grant uses at most
/// `max_prbs_per_grant` PRBs, sized from the UE's backlog for new data.
#[derive(Debug, Clone)]
pub struct TimeRoundRobinStrategy {
    max_prbs_per_grant: u32,
    bytes_per_prb: u32,
    dl_next: usize,
    ul_next: usize,
}

impl Default for TimeRoundRobinStrategy {
    fn default() -> Self {
        Self::new(16, 32)
    }
}

enum Decision {
    Allocated,
    Skipped,
    CellFull,
}

impl TimeRoundRobinStrategy {
    /// Create a new round-robin strategy.
    pub fn new(max_prbs_per_grant: u32, bytes_per_prb: u32) -> Self {
        Self {
            max_prbs_per_grant: max_prbs_per_grant.max(1),
            bytes_per_prb: bytes_per_prb.max(1),
            dl_next: 0,
            ul_next: 0,
        }
    }

    /// UE indexes rotated so that the round starts at `next`.
    fn rotated(ues: &UeRepository, next: usize) -> Vec<UeIndex> {
        let mut order = ues.ue_indexes();
        if !order.is_empty() {
            let start = next % order.len();
            order.rotate_left(start);
        }
        order
    }

    fn nof_prbs_for(&self, pending_bytes: u32, available: u32) -> u32 {
        pending_bytes
            .div_ceil(self.bytes_per_prb)
            .clamp(1, self.max_prbs_per_grant)
            .min(available)
    }

    fn decide(result: Result<(), AllocError>, cell_index: CellIndex, ue_index: UeIndex) -> Decision {
        match result {
            Ok(()) => Decision::Allocated,
            Err(e) if e.is_cell_exhausted() => {
                debug!(cell = %cell_index, ue = %ue_index, error = %e, "Cell full");
                Decision::CellFull
            }
            Err(e) => {
                debug!(cell = %cell_index, ue = %ue_index, error = %e, "Grant skipped");
                Decision::Skipped
            }
        }
    }

    fn dl_grant_for(
        &self,
        alloc: &UeCellGridAllocator<'_>,
        ues: &UeRepository,
        cell_index: CellIndex,
        ue_index: UeIndex,
    ) -> Option<UeDlGrant> {
        let ue = ues.get(ue_index)?;
        let harqs = &ue.find_cell(cell_index)?.harqs;
        let available = alloc.available_dl_prbs(cell_index);
        if let Some(h) = harqs.find_pending_dl_retx() {
            let nof_prbs = self.max_prbs_per_grant.min(available);
            return Some(UeDlGrant {
                cell_index,
                ue_index,
                harq_id: h.id(),
                nof_prbs,
                tb_size_bytes: nof_prbs * self.bytes_per_prb,
                is_retx: true,
            });
        }
        let pending = ue.pending_dl_newtx_bytes();
        if pending == 0 {
            return None;
        }
        let h = harqs.find_empty_dl_harq()?;
        let nof_prbs = self.nof_prbs_for(pending, available);
        Some(UeDlGrant {
            cell_index,
            ue_index,
            harq_id: h.id(),
            nof_prbs,
            tb_size_bytes: nof_prbs * self.bytes_per_prb,
            is_retx: false,
        })
    }

    fn ul_grant_for(&self, ues: &UeRepository, cell_index: CellIndex, ue_index: UeIndex) -> Option<UeUlGrant> {
        let ue = ues.get(ue_index)?;
        let harqs = &ue.find_cell(cell_index)?.harqs;
        if let Some(h) = harqs.find_pending_ul_retx() {
            return Some(UeUlGrant {
                cell_index,
                ue_index,
                harq_id: h.id(),
                nof_prbs: self.max_prbs_per_grant,
                tb_size_bytes: self.max_prbs_per_grant * self.bytes_per_prb,
                is_retx: true,
            });
        }
        let pending = ue.pending_ul_newtx_bytes();
        if pending == 0 {
            return None;
        }
        let h = harqs.find_empty_ul_harq()?;
        let nof_prbs = self.nof_prbs_for(pending, self.max_prbs_per_grant);
        Some(UeUlGrant {
            cell_index,
            ue_index,
            harq_id: h.id(),
            nof_prbs,
            tb_size_bytes: nof_prbs * self.bytes_per_prb,
            is_retx: false,
        })
    }
}

impl SchedulerStrategy for TimeRoundRobinStrategy {
    fn name(&self) -> &'static str {
        TIME_RR_STRATEGY
    }

    fn dl_sched(
        &mut self,
        alloc: &mut UeCellGridAllocator<'_>,
        view: &UeResourceGridView<'_>,
        ues: &mut UeRepository,
    ) {
        let order = Self::rotated(ues, self.dl_next);
        self.dl_next = self.dl_next.wrapping_add(1);

        let cells: Vec<CellIndex> = view.cell_indexes().collect();
        for cell_index in cells {
            if !view.is_dl_enabled(cell_index) || !view.is_pdsch_allowed(cell_index) {
                continue;
            }
            for &ue_index in &order {
                if alloc.available_dl_prbs(cell_index) == 0 {
                    break;
                }
                let Some(grant) = self.dl_grant_for(alloc, ues, cell_index, ue_index) else {
                    continue;
                };
                let result = alloc.allocate_dl_grant(ues, &grant);
                if let Decision::CellFull = Self::decide(result, cell_index, ue_index) {
                    break;
                }
            }
        }
    }

    fn ul_sched(
        &mut self,
        alloc: &mut UeCellGridAllocator<'_>,
        view: &UeResourceGridView<'_>,
        ues: &mut UeRepository,
    ) {
        let order = Self::rotated(ues, self.ul_next);
        self.ul_next = self.ul_next.wrapping_add(1);

        let cells: Vec<CellIndex> = view.cell_indexes().collect();
        for cell_index in cells {
            // UL grants are signalled on the PDCCH of the current slot.
            if !view.is_dl_enabled(cell_index) {
                continue;
            }
            for &ue_index in &order {
                let Some(grant) = self.ul_grant_for(ues, cell_index, ue_index) else {
                    continue;
                };
                let result = alloc.allocate_ul_grant(ues, &grant);
                if let Decision::CellFull = Self::decide(result, cell_index, ue_index) {
                    break;
                }
            }
        }
    }
}
