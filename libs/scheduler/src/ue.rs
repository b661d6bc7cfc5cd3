//! Scheduler-side UE context.

use std::collections::BTreeMap;

use nrsched_events::{UeConfig, LCID_SRB0};
use nrsched_id::{CellIndex, Rnti, SlotPoint, UeIndex};
use tracing::debug;

use crate::config::SchedulerExpertConfig;
use crate::harq::HarqEntity;

/// Per serving cell state of a UE.
#[derive(Debug, Clone)]
pub struct UeCell {
    cell_index: CellIndex,
    is_pcell: bool,
    /// HARQ processes of the UE in this cell.
    pub harqs: HarqEntity,
}

impl UeCell {
    fn new(
        cell_index: CellIndex,
        crnti: Rnti,
        config: &UeConfig,
        expert_cfg: &SchedulerExpertConfig,
    ) -> Self {
        Self {
            cell_index,
            is_pcell: cell_index == config.pcell_index,
            harqs: HarqEntity::new(
                crnti,
                usize::from(config.nof_dl_harqs),
                usize::from(config.nof_ul_harqs),
                expert_cfg.max_ack_wait_slots,
            ),
        }
    }

    pub fn cell_index(&self) -> CellIndex {
        self.cell_index
    }

    pub fn is_pcell(&self) -> bool {
        self.is_pcell
    }
}

/// A UE known to the scheduler.
#[derive(Debug, Clone)]
pub struct Ue {
    ue_index: UeIndex,
    crnti: Rnti,
    config: UeConfig,
    cells: Vec<UeCell>,
    dl_pending_bytes: BTreeMap<u8, u32>,
    ul_pending_bytes: u32,
    sr_pending: bool,
}

impl Ue {
    /// Create a new UE with one HARQ entity per serving cell.
    pub fn new(
        ue_index: UeIndex,
        crnti: Rnti,
        config: UeConfig,
        expert_cfg: &SchedulerExpertConfig,
    ) -> Self {
        let cells = config
            .serving_cells()
            .map(|cell_index| UeCell::new(cell_index, crnti, &config, expert_cfg))
            .collect();
        Self {
            ue_index,
            crnti,
            config,
            cells,
            dl_pending_bytes: BTreeMap::new(),
            ul_pending_bytes: 0,
            sr_pending: false,
        }
    }

    pub fn ue_index(&self) -> UeIndex {
        self.ue_index
    }

    pub fn crnti(&self) -> Rnti {
        self.crnti
    }

    pub fn config(&self) -> &UeConfig {
        &self.config
    }

    pub(crate) fn set_crnti(&mut self, crnti: Rnti) {
        self.crnti = crnti;
        for cell in &mut self.cells {
            cell.harqs.set_rnti(crnti);
        }
    }

    /// Applies a new configuration.
    ///
    /// Serving cells that remain keep their HARQ entities, added cells start
    /// with empty ones and removed cells are released with whatever they
    /// still had in flight.
    pub fn handle_reconfiguration(&mut self, config: UeConfig, expert_cfg: &SchedulerExpertConfig) {
        let crnti = self.crnti;
        let mut released = std::mem::take(&mut self.cells);
        self.cells = config
            .serving_cells()
            .map(|cell_index| match released.iter().position(|c| c.cell_index == cell_index) {
                Some(pos) => UeCell {
                    is_pcell: cell_index == config.pcell_index,
                    ..released.swap_remove(pos)
                },
                None => UeCell::new(cell_index, crnti, &config, expert_cfg),
            })
            .collect();
        debug!(
            ue = %self.ue_index,
            pcell = %config.pcell_index,
            nof_cells = self.cells.len(),
            nof_released = released.len(),
            "UE reconfigured"
        );
        self.config = config;
    }

    pub fn pcell(&self) -> &UeCell {
        &self.cells[0]
    }

    pub fn cells(&self) -> &[UeCell] {
        &self.cells
    }

    pub fn find_cell(&self, cell_index: CellIndex) -> Option<&UeCell> {
        self.cells.iter().find(|c| c.cell_index == cell_index)
    }

    pub fn find_cell_mut(&mut self, cell_index: CellIndex) -> Option<&mut UeCell> {
        self.cells.iter_mut().find(|c| c.cell_index == cell_index)
    }

    pub fn is_served_by(&self, cell_index: CellIndex) -> bool {
        self.find_cell(cell_index).is_some()
    }

    pub fn handle_dl_buffer_state(&mut self, lcid: u8, pending_bytes: u32) {
        if pending_bytes == 0 {
            self.dl_pending_bytes.remove(&lcid);
        } else {
            self.dl_pending_bytes.insert(lcid, pending_bytes);
        }
    }

    pub fn handle_bsr(&mut self, reported_bytes: u32) {
        self.ul_pending_bytes = reported_bytes;
    }

    pub fn handle_sr(&mut self) {
        self.sr_pending = true;
    }

    /// DL bytes waiting on data radio bearers and SRB1+.
    pub fn pending_dl_newtx_bytes(&self) -> u32 {
        self.dl_pending_bytes
            .iter()
            .filter(|(lcid, _)| **lcid != LCID_SRB0)
            .map(|(_, bytes)| *bytes)
            .fold(0u32, u32::saturating_add)
    }

    /// UL bytes to grant. A pending SR without BSR asks for a minimal grant.
    pub fn pending_ul_newtx_bytes(&self) -> u32 {
        if self.ul_pending_bytes == 0 && self.sr_pending {
            return 1;
        }
        self.ul_pending_bytes
    }

    pub fn has_pending_sr(&self) -> bool {
        self.sr_pending
    }

    /// Consumes DL bytes after a new transmission, lowest LCID first.
    pub fn consume_dl_bytes(&mut self, mut nof_bytes: u32) {
        let lcids: Vec<u8> = self
            .dl_pending_bytes
            .keys()
            .copied()
            .filter(|lcid| *lcid != LCID_SRB0)
            .collect();
        for lcid in lcids {
            if nof_bytes == 0 {
                break;
            }
            if let Some(bytes) = self.dl_pending_bytes.get_mut(&lcid) {
                let served = (*bytes).min(nof_bytes);
                *bytes -= served;
                nof_bytes -= served;
                if *bytes == 0 {
                    self.dl_pending_bytes.remove(&lcid);
                }
            }
        }
    }

    /// Consumes UL bytes after a new UL grant and clears any pending SR.
    pub fn consume_ul_bytes(&mut self, nof_bytes: u32) {
        self.ul_pending_bytes = self.ul_pending_bytes.saturating_sub(nof_bytes);
        self.sr_pending = false;
    }

    /// Advances HARQ timers of every serving cell. Returns the number of
    /// HARQ processes that timed out.
    pub fn slot_indication(&mut self, slot: SlotPoint) -> usize {
        self.cells
            .iter_mut()
            .map(|c| c.harqs.slot_indication(slot))
            .sum()
    }
}
