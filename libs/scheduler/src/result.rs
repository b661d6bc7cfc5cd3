//! Scheduling decisions of one cell and slot.

use nrsched_id::{HarqId, Rnti, SlotPoint};
use serde::Serialize;

// =============================================================================
// Control channel (PDCCH)
// =============================================================================

/// DL assignment carried by a PDCCH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum DlDci {
    /// UE-dedicated assignment, fallback format.
    CRntiF1_0 { harq_id: HarqId },
    /// Assignment to a UE still addressed by its temporary C-RNTI.
    TcRntiF1_0 { harq_id: HarqId },
    /// System information.
    SiRntiF1_0,
    /// Random access response.
    RaRntiF1_0,
    /// Paging.
    PRntiF1_0,
}

impl DlDci {
    /// HARQ process of a UE-addressed assignment.
    pub fn harq_id(&self) -> Option<HarqId> {
        match self {
            DlDci::CRntiF1_0 { harq_id } | DlDci::TcRntiF1_0 { harq_id } => Some(*harq_id),
            DlDci::SiRntiF1_0 | DlDci::RaRntiF1_0 | DlDci::PRntiF1_0 => None,
        }
    }
}

/// UL grant carried by a PDCCH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum UlDci {
    CRntiF0_0 { harq_id: HarqId },
    CRntiF0_1 { harq_id: HarqId },
    /// Msg3 retransmission, not tracked by UE HARQ entities.
    TcRntiF0_0 { harq_id: HarqId },
}

impl UlDci {
    /// HARQ process of the UE's UL HARQ entity this grant refers to.
    pub fn ue_harq_id(&self) -> Option<HarqId> {
        match self {
            UlDci::CRntiF0_0 { harq_id } | UlDci::CRntiF0_1 { harq_id } => Some(*harq_id),
            UlDci::TcRntiF0_0 { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdcchDlInformation {
    pub rnti: Rnti,
    pub dci: DlDci,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdcchUlInformation {
    pub rnti: Rnti,
    pub dci: UlDci,
}

// =============================================================================
// DL data (PDSCH)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Codeword {
    pub tb_size_bytes: u32,
    pub new_data: bool,
}

/// A UE PDSCH grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DlMsgAlloc {
    pub rnti: Rnti,
    pub harq_id: HarqId,
    pub nof_prbs: u32,
    pub codewords: Vec<Codeword>,
    /// Carries SRB0 (CCCH) data.
    pub is_srb0: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CsiRsInfo {
    pub resource_id: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DlSchedResult {
    pub dl_pdcchs: Vec<PdcchDlInformation>,
    pub ul_pdcchs: Vec<PdcchUlInformation>,
    pub ue_grants: Vec<DlMsgAlloc>,
    pub csi_rs: Vec<CsiRsInfo>,
}

// =============================================================================
// UL data and control (PUSCH / PUCCH)
// =============================================================================

/// UCI multiplexed on a PUSCH.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UciInfo {
    pub harq_ack_nof_bits: u8,
    pub csi_part1_bits: u16,
}

/// A UE PUSCH grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UlSchedInfo {
    pub rnti: Rnti,
    pub harq_id: HarqId,
    pub nof_prbs: u32,
    pub tb_size_bytes: u32,
    pub new_data: bool,
    pub uci: Option<UciInfo>,
}

impl UlSchedInfo {
    pub fn harq_ack_nof_bits(&self) -> u8 {
        self.uci.as_ref().map_or(0, |uci| uci.harq_ack_nof_bits)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum PucchFormat {
    /// Up to two HARQ-ACK bits plus SR.
    Format1 { harq_ack_nof_bits: u8, sr_bits: u8 },
    /// HARQ-ACK, SR and CSI.
    Format2 {
        harq_ack_nof_bits: u8,
        sr_bits: u8,
        csi_part1_bits: u16,
    },
}

/// A UE PUCCH grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PucchInfo {
    pub crnti: Rnti,
    pub format: PucchFormat,
}

impl PucchInfo {
    pub fn harq_ack_nof_bits(&self) -> u8 {
        match self.format {
            PucchFormat::Format1 {
                harq_ack_nof_bits, ..
            }
            | PucchFormat::Format2 {
                harq_ack_nof_bits, ..
            } => harq_ack_nof_bits,
        }
    }

    pub fn sr_bits(&self) -> u8 {
        match self.format {
            PucchFormat::Format1 { sr_bits, .. } | PucchFormat::Format2 { sr_bits, .. } => sr_bits,
        }
    }

    pub fn csi_part1_bits(&self) -> u16 {
        match self.format {
            PucchFormat::Format1 { .. } => 0,
            PucchFormat::Format2 { csi_part1_bits, .. } => csi_part1_bits,
        }
    }

    /// Adds one HARQ-ACK bit and returns its index.
    pub fn add_harq_ack_bit(&mut self) -> u8 {
        let (PucchFormat::Format1 {
            harq_ack_nof_bits, ..
        }
        | PucchFormat::Format2 {
            harq_ack_nof_bits, ..
        }) = &mut self.format;
        let bit_idx = *harq_ack_nof_bits;
        *harq_ack_nof_bits += 1;
        bit_idx
    }

    /// Adds one SR bit.
    pub fn add_sr(&mut self) {
        let (PucchFormat::Format1 { sr_bits, .. } | PucchFormat::Format2 { sr_bits, .. }) =
            &mut self.format;
        *sr_bits = 1;
    }

    /// Adds CSI bits, upgrading to format 2.
    pub fn add_csi(&mut self, csi_part1_bits: u16) {
        self.format = PucchFormat::Format2 {
            harq_ack_nof_bits: self.harq_ack_nof_bits(),
            sr_bits: self.sr_bits(),
            csi_part1_bits,
        };
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UlSchedResult {
    pub puschs: Vec<UlSchedInfo>,
    pub pucchs: Vec<PucchInfo>,
}

/// Everything scheduled in one cell for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedResult {
    pub slot: SlotPoint,
    pub dl: DlSchedResult,
    pub ul: UlSchedResult,
}

impl SchedResult {
    pub fn new(slot: SlotPoint) -> Self {
        Self {
            slot,
            dl: DlSchedResult::default(),
            ul: UlSchedResult::default(),
        }
    }

    pub fn find_pucch(&self, crnti: Rnti) -> Option<&PucchInfo> {
        self.ul.pucchs.iter().find(|p| p.crnti == crnti)
    }

    pub fn find_pucch_mut(&mut self, crnti: Rnti) -> Option<&mut PucchInfo> {
        self.ul.pucchs.iter_mut().find(|p| p.crnti == crnti)
    }

    pub fn find_pusch_mut(&mut self, rnti: Rnti) -> Option<&mut UlSchedInfo> {
        self.ul.puschs.iter_mut().find(|p| p.rnti == rnti)
    }

    /// True if no grant of any kind was scheduled.
    pub fn is_empty(&self) -> bool {
        self.dl == DlSchedResult::default() && self.ul == UlSchedResult::default()
    }
}
