//! UE grant allocation on the resource grids of the cells taking part in a
//! scheduling round.
//!
//! Strategies never touch the grids directly: they decide which UE gets
//! which HARQ process and how many PRBs, and the [`UeCellGridAllocator`]
//! writes the resulting control, data and feedback grants and starts the
//! HARQ transmission. A grant that does not fit leaves both the grid and the
//! HARQ process untouched.

use nrsched_id::{CellIndex, HarqId, SlotPoint, UeIndex};
use tracing::debug;

use crate::cell::{CellConfig, CellResourceAllocator};
use crate::config::SchedulerExpertConfig;
use crate::error::AllocError;
use crate::result::{
    Codeword, DlDci, DlMsgAlloc, PdcchDlInformation, PdcchUlInformation, PucchFormat, PucchInfo,
    UciInfo, UlDci, UlSchedInfo,
};
use crate::ue::Ue;
use crate::ue_repository::UeRepository;

/// A DL grant request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UeDlGrant {
    pub cell_index: CellIndex,
    pub ue_index: UeIndex,
    pub harq_id: HarqId,
    pub nof_prbs: u32,
    pub tb_size_bytes: u32,
    /// Retransmission of a process pending retx, rather than new data on an
    /// empty process.
    pub is_retx: bool,
}

/// A UL grant request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UeUlGrant {
    pub cell_index: CellIndex,
    pub ue_index: UeIndex,
    pub harq_id: HarqId,
    pub nof_prbs: u32,
    pub tb_size_bytes: u32,
    pub is_retx: bool,
}

/// Which RNTI the DL assignment is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DlDciKind {
    CRnti,
    TcRnti,
}

/// Grants placed in one cell during one round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocStats {
    pub nof_dl_grants: u32,
    pub nof_dl_retxs: u32,
    pub nof_ul_grants: u32,
    pub nof_ul_retxs: u32,
}

// =============================================================================
// Grid view
// =============================================================================

/// Read-only view of one cell for the current round.
#[derive(Debug, Clone, Copy)]
pub struct CellView<'a> {
    pub cfg: &'a CellConfig,
    pub pdsch_allowed: bool,
}

/// Read-only view of every cell taking part in the round.
#[derive(Debug, Clone)]
pub struct UeResourceGridView<'a> {
    slot_tx: SlotPoint,
    cells: Vec<CellView<'a>>,
}

impl<'a> UeResourceGridView<'a> {
    pub fn new(slot_tx: SlotPoint, cells: Vec<CellView<'a>>) -> Self {
        Self { slot_tx, cells }
    }

    pub fn slot_tx(&self) -> SlotPoint {
        self.slot_tx
    }

    pub fn cell_indexes(&self) -> impl Iterator<Item = CellIndex> + '_ {
        self.cells.iter().map(|c| c.cfg.cell_index)
    }

    fn cell(&self, cell_index: CellIndex) -> Option<&CellView<'a>> {
        self.cells.iter().find(|c| c.cfg.cell_index == cell_index)
    }

    pub fn cell_cfg(&self, cell_index: CellIndex) -> Option<&CellConfig> {
        self.cell(cell_index).map(|c| c.cfg)
    }

    /// True if the cell can send control information in the current slot.
    pub fn is_dl_enabled(&self, cell_index: CellIndex) -> bool {
        self.cell(cell_index)
            .is_some_and(|c| c.cfg.is_dl_enabled(self.slot_tx))
    }

    pub fn is_pdsch_allowed(&self, cell_index: CellIndex) -> bool {
        self.cell(cell_index).is_some_and(|c| c.pdsch_allowed)
    }

    pub fn any_pdsch_allowed(&self) -> bool {
        self.cells.iter().any(|c| c.pdsch_allowed)
    }
}

/// Whether PDSCH may be scheduled in the grid's current slot.
pub fn is_pdsch_allowed(expert_cfg: &SchedulerExpertConfig, res_alloc: &CellResourceAllocator) -> bool {
    let current = res_alloc.slot_alloc(0);
    res_alloc.cfg().is_dl_enabled(current.slot())
        && (expert_cfg.enable_csi_rs_pdsch_multiplexing || current.result.dl.csi_rs.is_empty())
}

// =============================================================================
// Single-cell allocation
// =============================================================================

fn check_pdcch_space(
    expert_cfg: &SchedulerExpertConfig,
    res_alloc: &CellResourceAllocator,
) -> Result<(), AllocError> {
    let dl = &res_alloc.slot_alloc(0).result.dl;
    if dl.dl_pdcchs.len() + dl.ul_pdcchs.len() >= expert_cfg.max_pdcchs_per_slot as usize {
        return Err(AllocError::PdcchExhausted);
    }
    Ok(())
}

/// Places a DL grant in a single cell grid and starts the HARQ transmission.
///
/// Returns the k1 used for HARQ-ACK.
pub fn allocate_dl(
    expert_cfg: &SchedulerExpertConfig,
    res_alloc: &mut CellResourceAllocator,
    ue: &mut Ue,
    grant: &UeDlGrant,
    dci_kind: DlDciKind,
) -> Result<u32, AllocError> {
    let cell_index = res_alloc.cell_index();
    let rnti = ue.crnti();
    let slot_tx = res_alloc.slot_alloc(0).slot();

    if !res_alloc.cfg().is_dl_enabled(slot_tx) {
        return Err(AllocError::DlDisabled);
    }
    if !is_pdsch_allowed(expert_cfg, res_alloc) {
        return Err(AllocError::PdschNotAllowed);
    }
    check_pdcch_space(expert_cfg, res_alloc)?;
    {
        let current = res_alloc.slot_alloc(0);
        let grants = &current.result.dl.ue_grants;
        if grants.len() >= expert_cfg.max_dl_grants_per_slot as usize {
            return Err(AllocError::GrantLimit);
        }
        if grants.iter().any(|g| g.rnti == rnti) {
            return Err(AllocError::UeAlreadyAllocated(ue.ue_index()));
        }
        let available = res_alloc.cfg().nof_dl_prbs.saturating_sub(current.dl_prbs_used);
        if grant.nof_prbs == 0 || grant.nof_prbs > available {
            return Err(AllocError::PrbsExhausted {
                requested: grant.nof_prbs,
                available,
            });
        }
    }

    let k1 = (expert_cfg.default_k1..=expert_cfg.max_k1)
        .find(|k1| res_alloc.cfg().is_ul_enabled(slot_tx + *k1))
        .ok_or(AllocError::NoFeedbackSlot)?;
    let uci_on_pusch = {
        let uci = &res_alloc.slot_alloc(k1).result;
        let on_pusch = uci.ul.puschs.iter().any(|p| p.rnti == rnti);
        if !on_pusch
            && uci.find_pucch(rnti).is_none()
            && uci.ul.pucchs.len() >= expert_cfg.max_pucchs_per_slot as usize
        {
            return Err(AllocError::PucchExhausted);
        }
        on_pusch
    };

    let ue_index = ue.ue_index();
    let h = ue
        .find_cell_mut(cell_index)
        .ok_or(AllocError::CellNotServing {
            ue_index,
            cell_index,
        })?
        .harqs
        .dl_harq_mut(grant.harq_id)
        .ok_or(AllocError::HarqNotAvailable(grant.harq_id))?;
    let harq_ready = if grant.is_retx {
        h.has_pending_retx()
    } else {
        h.is_empty()
    };
    if !harq_ready {
        return Err(AllocError::HarqNotAvailable(grant.harq_id));
    }

    // Everything fits; commit.
    let uci_result = &mut res_alloc.slot_alloc_mut(k1).result;
    let harq_bit_idx = if uci_on_pusch {
        let uci = uci_result
            .find_pusch_mut(rnti)
            .map(|pusch| pusch.uci.get_or_insert_with(UciInfo::default));
        match uci {
            Some(uci) => {
                uci.harq_ack_nof_bits += 1;
                uci.harq_ack_nof_bits - 1
            }
            None => 0,
        }
    } else if let Some(pucch) = uci_result.find_pucch_mut(rnti) {
        pucch.add_harq_ack_bit()
    } else {
        uci_result.ul.pucchs.push(PucchInfo {
            crnti: rnti,
            format: PucchFormat::Format1 {
                harq_ack_nof_bits: 1,
                sr_bits: 0,
            },
        });
        0
    };

    let current = res_alloc.slot_alloc_mut(0);
    let dci = match dci_kind {
        DlDciKind::CRnti => DlDci::CRntiF1_0 {
            harq_id: grant.harq_id,
        },
        DlDciKind::TcRnti => DlDci::TcRntiF1_0 {
            harq_id: grant.harq_id,
        },
    };
    current.result.dl.dl_pdcchs.push(PdcchDlInformation { rnti, dci });
    current.result.dl.ue_grants.push(DlMsgAlloc {
        rnti,
        harq_id: grant.harq_id,
        nof_prbs: grant.nof_prbs,
        codewords: vec![Codeword {
            tb_size_bytes: grant.tb_size_bytes,
            new_data: !grant.is_retx,
        }],
        is_srb0: dci_kind == DlDciKind::TcRnti,
    });
    current.dl_prbs_used += grant.nof_prbs;

    if grant.is_retx {
        h.new_retx(slot_tx, k1, harq_bit_idx);
    } else {
        h.new_tx(slot_tx, k1, expert_cfg.max_nof_dl_harq_retxs, harq_bit_idx, 1);
    }

    debug!(
        cell = %cell_index,
        ue = %ue_index,
        rnti = %rnti,
        harq = %grant.harq_id,
        slot = %slot_tx,
        k1,
        harq_bit_idx,
        nof_prbs = grant.nof_prbs,
        retx = grant.is_retx,
        "DL grant allocated"
    );
    Ok(k1)
}

/// Places a UL grant in a single cell grid and starts the HARQ transmission.
///
/// UCI already scheduled on PUCCH for the PUSCH slot is moved onto the
/// PUSCH. Returns the k2 used.
pub fn allocate_ul(
    expert_cfg: &SchedulerExpertConfig,
    res_alloc: &mut CellResourceAllocator,
    ue: &mut Ue,
    grant: &UeUlGrant,
) -> Result<u32, AllocError> {
    let cell_index = res_alloc.cell_index();
    let rnti = ue.crnti();
    let ue_index = ue.ue_index();
    let slot_tx = res_alloc.slot_alloc(0).slot();

    if !res_alloc.cfg().is_dl_enabled(slot_tx) {
        return Err(AllocError::DlDisabled);
    }
    check_pdcch_space(expert_cfg, res_alloc)?;

    let k2 = (expert_cfg.default_k2..=expert_cfg.max_k1)
        .find(|k2| res_alloc.cfg().is_ul_enabled(slot_tx + *k2))
        .ok_or(AllocError::NoUlSlot)?;
    {
        let pusch_alloc = res_alloc.slot_alloc(k2);
        let puschs = &pusch_alloc.result.ul.puschs;
        if puschs.len() >= expert_cfg.max_ul_grants_per_slot as usize {
            return Err(AllocError::GrantLimit);
        }
        if puschs.iter().any(|p| p.rnti == rnti) {
            return Err(AllocError::UeAlreadyAllocated(ue_index));
        }
        let available = res_alloc.cfg().nof_ul_prbs.saturating_sub(pusch_alloc.ul_prbs_used);
        if grant.nof_prbs == 0 || grant.nof_prbs > available {
            return Err(AllocError::PrbsExhausted {
                requested: grant.nof_prbs,
                available,
            });
        }
    }

    let h = ue
        .find_cell_mut(cell_index)
        .ok_or(AllocError::CellNotServing {
            ue_index,
            cell_index,
        })?
        .harqs
        .ul_harq_mut(grant.harq_id)
        .ok_or(AllocError::HarqNotAvailable(grant.harq_id))?;
    let harq_ready = if grant.is_retx {
        h.has_pending_retx()
    } else {
        h.is_empty()
    };
    if !harq_ready {
        return Err(AllocError::HarqNotAvailable(grant.harq_id));
    }

    // Everything fits; commit.
    res_alloc
        .slot_alloc_mut(0)
        .result
        .dl
        .ul_pdcchs
        .push(PdcchUlInformation {
            rnti,
            dci: UlDci::CRntiF0_1 {
                harq_id: grant.harq_id,
            },
        });

    let pusch_alloc = res_alloc.slot_alloc_mut(k2);
    let uci = pusch_alloc
        .result
        .find_pucch(rnti)
        .map(|pucch| UciInfo {
            harq_ack_nof_bits: pucch.harq_ack_nof_bits(),
            csi_part1_bits: pucch.csi_part1_bits(),
        });
    if uci.is_some() {
        pusch_alloc.result.ul.pucchs.retain(|p| p.crnti != rnti);
    }
    pusch_alloc.result.ul.puschs.push(UlSchedInfo {
        rnti,
        harq_id: grant.harq_id,
        nof_prbs: grant.nof_prbs,
        tb_size_bytes: grant.tb_size_bytes,
        new_data: !grant.is_retx,
        uci,
    });
    pusch_alloc.ul_prbs_used += grant.nof_prbs;

    if grant.is_retx {
        h.new_retx(slot_tx, k2);
    } else {
        h.new_tx(slot_tx, k2, expert_cfg.max_nof_ul_harq_retxs);
    }

    debug!(
        cell = %cell_index,
        ue = %ue_index,
        rnti = %rnti,
        harq = %grant.harq_id,
        slot = %slot_tx,
        k2,
        nof_prbs = grant.nof_prbs,
        retx = grant.is_retx,
        "UL grant allocated"
    );
    Ok(k2)
}

// =============================================================================
// Multi-cell allocator
// =============================================================================

struct CellGrid<'a> {
    res_alloc: &'a mut CellResourceAllocator,
    stats: AllocStats,
}

/// Allocator over the locked grids of every cell taking part in a round.
pub struct UeCellGridAllocator<'a> {
    expert_cfg: &'a SchedulerExpertConfig,
    slot_tx: SlotPoint,
    cells: Vec<CellGrid<'a>>,
}

impl<'a> UeCellGridAllocator<'a> {
    pub fn new(
        expert_cfg: &'a SchedulerExpertConfig,
        slot_tx: SlotPoint,
        grids: Vec<&'a mut CellResourceAllocator>,
    ) -> Self {
        Self {
            expert_cfg,
            slot_tx,
            cells: grids
                .into_iter()
                .map(|res_alloc| CellGrid {
                    res_alloc,
                    stats: AllocStats::default(),
                })
                .collect(),
        }
    }

    pub fn slot_tx(&self) -> SlotPoint {
        self.slot_tx
    }

    fn grid(&self, cell_index: CellIndex) -> Result<&CellGrid<'a>, AllocError> {
        self.cells
            .iter()
            .find(|c| c.res_alloc.cell_index() == cell_index)
            .ok_or(AllocError::CellNotFound(cell_index))
    }

    fn grid_mut(&mut self, cell_index: CellIndex) -> Result<&mut CellGrid<'a>, AllocError> {
        self.cells
            .iter_mut()
            .find(|c| c.res_alloc.cell_index() == cell_index)
            .ok_or(AllocError::CellNotFound(cell_index))
    }

    /// PRBs still free for PDSCH in the current slot.
    pub fn available_dl_prbs(&self, cell_index: CellIndex) -> u32 {
        self.grid(cell_index).map_or(0, |g| {
            g.res_alloc
                .cfg()
                .nof_dl_prbs
                .saturating_sub(g.res_alloc.slot_alloc(0).dl_prbs_used)
        })
    }

    /// Allocates a DL grant and consumes the UE's pending bytes for new data.
    pub fn allocate_dl_grant(
        &mut self,
        ues: &mut UeRepository,
        grant: &UeDlGrant,
    ) -> Result<(), AllocError> {
        let expert_cfg = self.expert_cfg;
        let grid = self.grid_mut(grant.cell_index)?;
        let ue = ues
            .get_mut(grant.ue_index)
            .ok_or(AllocError::UeNotFound(grant.ue_index))?;
        allocate_dl(expert_cfg, grid.res_alloc, ue, grant, DlDciKind::CRnti)?;
        grid.stats.nof_dl_grants += 1;
        if grant.is_retx {
            grid.stats.nof_dl_retxs += 1;
        } else {
            ue.consume_dl_bytes(grant.tb_size_bytes);
        }
        Ok(())
    }

    /// Allocates a UL grant and consumes the UE's reported bytes for new data.
    pub fn allocate_ul_grant(
        &mut self,
        ues: &mut UeRepository,
        grant: &UeUlGrant,
    ) -> Result<(), AllocError> {
        let expert_cfg = self.expert_cfg;
        let grid = self.grid_mut(grant.cell_index)?;
        let ue = ues
            .get_mut(grant.ue_index)
            .ok_or(AllocError::UeNotFound(grant.ue_index))?;
        allocate_ul(expert_cfg, grid.res_alloc, ue, grant)?;
        grid.stats.nof_ul_grants += 1;
        if grant.is_retx {
            grid.stats.nof_ul_retxs += 1;
        } else {
            ue.consume_ul_bytes(grant.tb_size_bytes);
        }
        Ok(())
    }

    /// Grants placed per cell so far.
    pub fn stats(&self) -> Vec<(CellIndex, AllocStats)> {
        self.cells
            .iter()
            .map(|c| (c.res_alloc.cell_index(), c.stats))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{DuplexMode, TddPattern};
    use crate::harq::HarqState;
    use nrsched_events::UeConfig;
    use nrsched_id::Rnti;

    fn cell0() -> CellIndex {
        CellIndex::new(0).unwrap()
    }

    fn slot(count: u32) -> SlotPoint {
        SlotPoint::from_count(0, count).unwrap()
    }

    fn harq(id: u8) -> HarqId {
        HarqId::new(id).unwrap()
    }

    fn ue_index(i: u16) -> UeIndex {
        UeIndex::new(i).unwrap()
    }

    fn setup(cfg: CellConfig) -> (SchedulerExpertConfig, CellResourceAllocator, UeRepository) {
        let expert = SchedulerExpertConfig::default();
        let mut grid = CellResourceAllocator::new(cfg, expert.history_depth, expert.grid_lookahead());
        grid.slot_indication(slot(50));
        let mut ues = UeRepository::new();
        for i in 0..3u16 {
            ues.add_ue(Ue::new(
                ue_index(i),
                Rnti::new_crnti(0x4601 + i).unwrap(),
                UeConfig::single_cell(cell0()),
                &expert,
            ))
            .unwrap();
        }
        (expert, grid, ues)
    }

    fn dl_grant(ue: u16, harq_id: u8) -> UeDlGrant {
        UeDlGrant {
            cell_index: cell0(),
            ue_index: ue_index(ue),
            harq_id: harq(harq_id),
            nof_prbs: 10,
            tb_size_bytes: 320,
            is_retx: false,
        }
    }

    fn ul_grant(ue: u16, harq_id: u8) -> UeUlGrant {
        UeUlGrant {
            cell_index: cell0(),
            ue_index: ue_index(ue),
            harq_id: harq(harq_id),
            nof_prbs: 10,
            tb_size_bytes: 320,
            is_retx: false,
        }
    }

    #[test]
    fn test_dl_grant_writes_pdcch_pdsch_and_pucch() {
        let (expert, mut grid, mut ues) = setup(CellConfig::fdd(cell0(), 0, 52));
        ues.get_mut(ue_index(0)).unwrap().handle_dl_buffer_state(4, 1000);
        {
            let mut alloc = UeCellGridAllocator::new(&expert, slot(50), vec![&mut grid]);
            alloc.allocate_dl_grant(&mut ues, &dl_grant(0, 0)).unwrap();
            assert_eq!(alloc.available_dl_prbs(cell0()), 42);
            assert_eq!(alloc.stats()[0].1.nof_dl_grants, 1);
        }

        let current = &grid.slot_alloc(0).result;
        assert_eq!(current.dl.dl_pdcchs.len(), 1);
        assert_eq!(current.dl.ue_grants[0].harq_id, harq(0));
        let pucch = grid.slot_alloc(4).result.ul.pucchs[0].clone();
        assert_eq!(pucch.harq_ack_nof_bits(), 1);

        let ue = ues.get(ue_index(0)).unwrap();
        let h = ue.pcell().harqs.dl_harq(harq(0)).unwrap();
        assert_eq!(h.state(), HarqState::WaitingAck);
        assert_eq!(h.slot_ack(), Some(slot(54)));
        assert_eq!(h.harq_bit_idx(), 0);
        assert_eq!(ue.pending_dl_newtx_bytes(), 680);
    }

    #[test]
    fn test_second_dl_harq_gets_next_bit() {
        let (expert, mut grid, mut ues) = setup(CellConfig::fdd(cell0(), 0, 52));
        let ue = ues.get_mut(ue_index(0)).unwrap();
        allocate_dl(&expert, &mut grid, ue, &dl_grant(0, 0), DlDciKind::CRnti).unwrap();
        grid.slot_indication(slot(51));
        // k1 = 3 would be needed to share slot 54; default k1 lands on 55.
        let ue = ues.get_mut(ue_index(0)).unwrap();
        allocate_dl(&expert, &mut grid, ue, &dl_grant(0, 1), DlDciKind::CRnti).unwrap();
        let ue = ues.get(ue_index(0)).unwrap();
        assert_eq!(ue.pcell().harqs.dl_harq(harq(1)).unwrap().slot_ack(), Some(slot(55)));
        assert_eq!(ue.pcell().harqs.dl_harq(harq(1)).unwrap().harq_bit_idx(), 0);
    }

    #[test]
    fn test_busy_harq_rejected_without_side_effects() {
        let (expert, mut grid, mut ues) = setup(CellConfig::fdd(cell0(), 0, 52));
        let mut alloc = UeCellGridAllocator::new(&expert, slot(50), vec![&mut grid]);
        alloc.allocate_dl_grant(&mut ues, &dl_grant(0, 0)).unwrap();

        let retx = UeDlGrant {
            is_retx: true,
            ..dl_grant(1, 0)
        };
        assert_eq!(
            alloc.allocate_dl_grant(&mut ues, &retx),
            Err(AllocError::HarqNotAvailable(harq(0)))
        );
        assert_eq!(
            alloc.allocate_dl_grant(&mut ues, &dl_grant(0, 1)),
            Err(AllocError::UeAlreadyAllocated(ue_index(0)))
        );
        assert_eq!(alloc.available_dl_prbs(cell0()), 42);
    }

    #[test]
    fn test_prb_exhaustion() {
        let (expert, mut grid, mut ues) = setup(CellConfig::fdd(cell0(), 0, 15));
        let mut alloc = UeCellGridAllocator::new(&expert, slot(50), vec![&mut grid]);
        alloc.allocate_dl_grant(&mut ues, &dl_grant(0, 0)).unwrap();
        let err = alloc.allocate_dl_grant(&mut ues, &dl_grant(1, 0)).unwrap_err();
        assert_eq!(
            err,
            AllocError::PrbsExhausted {
                requested: 10,
                available: 5
            }
        );
        assert!(err.is_cell_exhausted());
    }

    #[test]
    fn test_unknown_cell_rejected() {
        let (expert, mut grid, mut ues) = setup(CellConfig::fdd(cell0(), 0, 52));
        let mut alloc = UeCellGridAllocator::new(&expert, slot(50), vec![&mut grid]);
        let grant = UeDlGrant {
            cell_index: CellIndex::new(3).unwrap(),
            ..dl_grant(0, 0)
        };
        assert_eq!(
            alloc.allocate_dl_grant(&mut ues, &grant),
            Err(AllocError::CellNotFound(CellIndex::new(3).unwrap()))
        );
    }

    #[test]
    fn test_ul_grant_takes_over_pucch_uci() {
        let (expert, mut grid, mut ues) = setup(CellConfig::fdd(cell0(), 0, 52));
        let mut alloc = UeCellGridAllocator::new(&expert, slot(50), vec![&mut grid]);
        alloc.allocate_dl_grant(&mut ues, &dl_grant(0, 0)).unwrap();
        alloc.allocate_ul_grant(&mut ues, &ul_grant(0, 2)).unwrap();
        drop(alloc);

        let at_54 = &grid.slot_alloc(4).result;
        assert!(at_54.ul.pucchs.is_empty());
        assert_eq!(at_54.ul.puschs.len(), 1);
        assert_eq!(at_54.ul.puschs[0].harq_ack_nof_bits(), 1);
        assert_eq!(grid.slot_alloc(0).result.dl.ul_pdcchs.len(), 1);

        let h = ues.get(ue_index(0)).unwrap().pcell().harqs.ul_harq(harq(2)).unwrap().clone();
        assert!(h.is_waiting_ack());
        assert_eq!(h.slot_rx(), Some(slot(54)));
    }

    #[test]
    fn test_dl_harq_bit_goes_on_existing_pusch() {
        let (expert, mut grid, mut ues) = setup(CellConfig::fdd(cell0(), 0, 52));
        let mut alloc = UeCellGridAllocator::new(&expert, slot(50), vec![&mut grid]);
        alloc.allocate_ul_grant(&mut ues, &ul_grant(0, 0)).unwrap();
        alloc.allocate_dl_grant(&mut ues, &dl_grant(0, 0)).unwrap();
        drop(alloc);

        let at_54 = &grid.slot_alloc(4).result;
        assert!(at_54.ul.pucchs.is_empty());
        assert_eq!(at_54.ul.puschs[0].harq_ack_nof_bits(), 1);
    }

    #[test]
    fn test_tdd_dl_disabled_and_feedback_slot_search() {
        let cfg = CellConfig {
            duplex: DuplexMode::Tdd(TddPattern {
                period_slots: 10,
                nof_dl_slots: 7,
                nof_ul_slots: 2,
            }),
            ..CellConfig::fdd(cell0(), 0, 52)
        };
        let (expert, mut grid, mut ues) = setup(cfg);
        let ue = ues.get_mut(ue_index(0)).unwrap();
        // Slot 50 is DL; first UL slot at or after k1=4 is 58.
        assert_eq!(
            allocate_dl(&expert, &mut grid, ue, &dl_grant(0, 0), DlDciKind::CRnti),
            Ok(8)
        );

        grid.slot_indication(slot(58));
        let ue = ues.get_mut(ue_index(1)).unwrap();
        assert_eq!(
            allocate_dl(&expert, &mut grid, ue, &dl_grant(1, 0), DlDciKind::CRnti),
            Err(AllocError::DlDisabled)
        );
    }

    #[test]
    fn test_csi_rs_blocks_pdsch_without_multiplexing() {
        let (mut expert, mut grid, mut ues) = setup(CellConfig::fdd(cell0(), 0, 52));
        expert.enable_csi_rs_pdsch_multiplexing = false;
        grid.slot_alloc_mut(0)
            .result
            .dl
            .csi_rs
            .push(crate::result::CsiRsInfo { resource_id: 0 });
        assert!(!is_pdsch_allowed(&expert, &grid));
        let ue = ues.get_mut(ue_index(0)).unwrap();
        assert_eq!(
            allocate_dl(&expert, &mut grid, ue, &dl_grant(0, 0), DlDciKind::CRnti),
            Err(AllocError::PdschNotAllowed)
        );
    }

    #[test]
    fn test_grid_view() {
        let cfg = CellConfig::fdd(cell0(), 0, 52);
        let view = UeResourceGridView::new(
            slot(50),
            vec![CellView {
                cfg: &cfg,
                pdsch_allowed: false,
            }],
        );
        assert!(view.is_dl_enabled(cell0()));
        assert!(!view.is_pdsch_allowed(cell0()));
        assert!(!view.any_pdsch_allowed());
        assert!(view.cell_cfg(CellIndex::new(1).unwrap()).is_none());
        assert_eq!(view.cell_indexes().collect::<Vec<_>>(), vec![cell0()]);
    }
}
