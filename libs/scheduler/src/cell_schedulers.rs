//! Cell-specific schedulers that run before the multi-cell strategy.
//!
//! The UCI scheduler books periodic SR/CSI occasions and CSI-RS; the SRB0
//! scheduler serves CCCH traffic of UEs that cannot yet be addressed by the
//! strategy. Both run under the cell's own locks, before the sync point.

use std::collections::VecDeque;

use nrsched_id::UeIndex;
use tracing::debug;

use crate::cell::CellResourceAllocator;
use crate::config::SchedulerExpertConfig;
use crate::grid_allocator::{allocate_dl, DlDciKind, UeDlGrant};
use crate::result::{CsiRsInfo, PucchFormat, PucchInfo, UciInfo};
use crate::ue_repository::UeRepository;

/// Allocates periodic uplink control occasions.
pub trait UciScheduler: Send {
    fn run_slot(&mut self, res_alloc: &mut CellResourceAllocator, ues: &UeRepository);
}

/// Schedules SRB0 (CCCH) DL data.
pub trait Srb0Scheduler: Send {
    /// Updates the SRB0 backlog of a UE. Zero bytes clears it.
    fn handle_dl_buffer_state_indication(&mut self, ue_index: UeIndex, pending_bytes: u32);

    fn run_slot(&mut self, res_alloc: &mut CellResourceAllocator, ues: &mut UeRepository);
}

// =============================================================================
// UCI
// =============================================================================

/// Books SR and CSI on the last slot of the grid lookahead, with a per-UE
/// offset so that UEs are spread over the period.
#[derive(Debug, Clone)]
pub struct PeriodicUciScheduler {
    sr_period_slots: u32,
    csi_period_slots: u32,
    csi_part1_bits: u16,
    max_pucchs_per_slot: usize,
}

impl PeriodicUciScheduler {
    /// Create a new UCI scheduler. A period of zero disables that occasion.
    pub fn new(
        expert_cfg: &SchedulerExpertConfig,
        sr_period_slots: u32,
        csi_period_slots: u32,
    ) -> Self {
        Self {
            sr_period_slots,
            csi_period_slots,
            csi_part1_bits: 4,
            max_pucchs_per_slot: expert_cfg.max_pucchs_per_slot as usize,
        }
    }

    fn is_occasion(period: u32, count: u32, offset: u32) -> bool {
        period > 0 && (count + offset) % period == 0
    }
}

impl UciScheduler for PeriodicUciScheduler {
    fn run_slot(&mut self, res_alloc: &mut CellResourceAllocator, ues: &UeRepository) {
        let cell_index = res_alloc.cell_index();

        let slot_tx = res_alloc.slot_alloc(0).slot();
        if Self::is_occasion(self.csi_period_slots, slot_tx.count(), 0)
            && res_alloc.cfg().is_dl_enabled(slot_tx)
        {
            res_alloc
                .slot_alloc_mut(0)
                .result
                .dl
                .csi_rs
                .push(CsiRsInfo { resource_id: 0 });
        }

        let delay = res_alloc.lookahead();
        let slot = res_alloc.slot_alloc(delay).slot();
        if !res_alloc.cfg().is_ul_enabled(slot) {
            return;
        }

        for ue in ues.iter().filter(|ue| ue.pcell().cell_index() == cell_index) {
            let offset = u32::from(ue.ue_index().value());
            let sr = Self::is_occasion(self.sr_period_slots, slot.count(), offset);
            let csi = Self::is_occasion(self.csi_period_slots, slot.count(), offset);
            if !sr && !csi {
                continue;
            }

            let rnti = ue.crnti();
            let result = &mut res_alloc.slot_alloc_mut(delay).result;
            if let Some(pusch) = result.find_pusch_mut(rnti) {
                if csi {
                    pusch.uci.get_or_insert_with(UciInfo::default).csi_part1_bits =
                        self.csi_part1_bits;
                }
                continue;
            }
            if let Some(pucch) = result.find_pucch_mut(rnti) {
                if sr {
                    pucch.add_sr();
                }
                if csi {
                    pucch.add_csi(self.csi_part1_bits);
                }
                continue;
            }
            if result.ul.pucchs.len() >= self.max_pucchs_per_slot {
                debug!(cell = %cell_index, ue = %ue.ue_index(), slot = %slot, "No PUCCH space for SR/CSI");
                continue;
            }
            let sr_bits = u8::from(sr);
            let format = if csi {
                PucchFormat::Format2 {
                    harq_ack_nof_bits: 0,
                    sr_bits,
                    csi_part1_bits: self.csi_part1_bits,
                }
            } else {
                PucchFormat::Format1 {
                    harq_ack_nof_bits: 0,
                    sr_bits,
                }
            };
            result.ul.pucchs.push(PucchInfo {
                crnti: rnti,
                format,
            });
        }
    }
}

// =============================================================================
// SRB0
// =============================================================================

/// Serves SRB0 backlogs in arrival order, one PDSCH per UE and slot.
#[derive(Debug, Clone)]
pub struct FifoSrb0Scheduler {
    expert_cfg: SchedulerExpertConfig,
    nof_prbs: u32,
    pending: VecDeque<(UeIndex, u32)>,
}

impl FifoSrb0Scheduler {
    pub fn new(expert_cfg: SchedulerExpertConfig, nof_prbs: u32) -> Self {
        Self {
            expert_cfg,
            nof_prbs,
            pending: VecDeque::new(),
        }
    }

    pub fn nof_pending(&self) -> usize {
        self.pending.len()
    }
}

impl Srb0Scheduler for FifoSrb0Scheduler {
    fn handle_dl_buffer_state_indication(&mut self, ue_index: UeIndex, pending_bytes: u32) {
        if pending_bytes == 0 {
            self.pending.retain(|(ue, _)| *ue != ue_index);
            return;
        }
        match self.pending.iter_mut().find(|(ue, _)| *ue == ue_index) {
            Some(entry) => entry.1 = pending_bytes,
            None => self.pending.push_back((ue_index, pending_bytes)),
        }
    }

    fn run_slot(&mut self, res_alloc: &mut CellResourceAllocator, ues: &mut UeRepository) {
        let cell_index = res_alloc.cell_index();
        let mut next = 0;
        while let Some(&(ue_index, pending_bytes)) = self.pending.get(next) {
            let Some(ue) = ues.get_mut(ue_index) else {
                debug!(cell = %cell_index, ue = %ue_index, "Dropping SRB0 backlog of removed UE");
                self.pending.remove(next);
                continue;
            };
            let harq_id = ue
                .find_cell(cell_index)
                .and_then(|c| c.harqs.find_empty_dl_harq())
                .map(|h| h.id());
            let Some(harq_id) = harq_id else {
                next += 1;
                continue;
            };
            let grant = UeDlGrant {
                cell_index,
                ue_index,
                harq_id,
                nof_prbs: self.nof_prbs,
                tb_size_bytes: pending_bytes,
                is_retx: false,
            };
            match allocate_dl(&self.expert_cfg, res_alloc, ue, &grant, DlDciKind::TcRnti) {
                Ok(_) => {
                    debug!(cell = %cell_index, ue = %ue_index, harq = %harq_id, pending_bytes, "SRB0 PDSCH allocated");
                    self.pending.remove(next);
                }
                Err(e) if e.is_cell_exhausted() => break,
                Err(_) => next += 1,
            }
        }
    }
}

/// UCI scheduler that books nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUciScheduler;

impl UciScheduler for NoopUciScheduler {
    fn run_slot(&mut self, _res_alloc: &mut CellResourceAllocator, _ues: &UeRepository) {}
}
