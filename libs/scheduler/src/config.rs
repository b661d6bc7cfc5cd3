//! Expert configuration of the UE scheduler.
//!
//! Protocol bounds such as the maximum number of HARQ retransmissions or the
//! feedback round-trip are injected here rather than hard-coded.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest history the resource grid ring can hold.
pub const MAX_HISTORY_DEPTH: u32 = 1024;

/// Largest supported k1/k2 delay.
pub const MAX_K1: u32 = 32;

/// Errors found while validating a [`SchedulerExpertConfig`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The slot history cannot cover the feedback round-trip.
    #[error("history depth {history_depth} too short, at least {required} slots required")]
    HistoryTooShort { history_depth: u32, required: u32 },

    /// The slot history exceeds what the ring can hold.
    #[error("history depth {0} exceeds maximum of {MAX_HISTORY_DEPTH}")]
    HistoryTooLong(u32),

    /// A k1/k2 delay is outside `1..=max_k1`, or `max_k1` itself is outside
    /// `1..=MAX_K1`.
    #[error("{name}={value} outside 1..={max_k1}")]
    InvalidDelay {
        name: &'static str,
        value: u32,
        max_k1: u32,
    },

    /// A per-slot capacity is zero.
    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),
}

/// Tunables of the UE scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerExpertConfig {
    /// Maximum number of DL HARQ retransmissions before a TB is discarded.
    pub max_nof_dl_harq_retxs: u32,

    /// Maximum number of UL HARQ retransmissions before a TB is discarded.
    pub max_nof_ul_harq_retxs: u32,

    /// Slots a HARQ process may wait past its expected feedback slot before
    /// the feedback is considered lost.
    pub max_ack_wait_slots: u32,

    /// How many slots back from the slot being scheduled the HARQ-ACK
    /// bookkeeping looks for finalized UL control grants.
    pub harq_ack_slot_delay: u32,

    /// Number of finalized slots kept per cell for error-indication rollback.
    pub history_depth: u32,

    /// Largest PDSCH-to-HARQ-ACK (k1) or PDCCH-to-PUSCH (k2) delay.
    pub max_k1: u32,

    /// Preferred PDSCH-to-HARQ-ACK delay.
    pub default_k1: u32,

    /// Preferred PDCCH-to-PUSCH delay.
    pub default_k2: u32,

    /// Allow PDSCH in slots that carry CSI-RS.
    pub enable_csi_rs_pdsch_multiplexing: bool,

    /// Control-channel grants per cell and slot.
    pub max_pdcchs_per_slot: u32,

    /// UL control grants per cell and slot.
    pub max_pucchs_per_slot: u32,

    /// UE DL data grants per cell and slot.
    pub max_dl_grants_per_slot: u32,

    /// UE UL data grants per cell and slot.
    pub max_ul_grants_per_slot: u32,

    /// Slots between two metrics reports.
    pub metrics_report_period_slots: u32,
}

impl Default for SchedulerExpertConfig {
    fn default() -> Self {
        Self {
            max_nof_dl_harq_retxs: 4,
            max_nof_ul_harq_retxs: 4,
            max_ack_wait_slots: 10,
            harq_ack_slot_delay: 0,
            history_depth: 16,
            max_k1: 8,
            default_k1: 4,
            default_k2: 4,
            enable_csi_rs_pdsch_multiplexing: true,
            max_pdcchs_per_slot: 8,
            max_pucchs_per_slot: 16,
            max_dl_grants_per_slot: 4,
            max_ul_grants_per_slot: 4,
            metrics_report_period_slots: 1000,
        }
    }
}

impl SchedulerExpertConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_k1 == 0 || self.max_k1 > MAX_K1 {
            return Err(ConfigError::InvalidDelay {
                name: "max_k1",
                value: self.max_k1,
                max_k1: MAX_K1,
            });
        }
        for (name, value) in [("default_k1", self.default_k1), ("default_k2", self.default_k2)] {
            if value == 0 || value > self.max_k1 {
                return Err(ConfigError::InvalidDelay {
                    name,
                    value,
                    max_k1: self.max_k1,
                });
            }
        }

        let required = self.max_k1 + self.harq_ack_slot_delay + 1;
        if self.history_depth < required {
            return Err(ConfigError::HistoryTooShort {
                history_depth: self.history_depth,
                required,
            });
        }
        if self.history_depth > MAX_HISTORY_DEPTH {
            return Err(ConfigError::HistoryTooLong(self.history_depth));
        }

        for (name, value) in [
            ("max_pdcchs_per_slot", self.max_pdcchs_per_slot),
            ("max_pucchs_per_slot", self.max_pucchs_per_slot),
            ("max_dl_grants_per_slot", self.max_dl_grants_per_slot),
            ("max_ul_grants_per_slot", self.max_ul_grants_per_slot),
            ("metrics_report_period_slots", self.metrics_report_period_slots),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroCapacity(name));
            }
        }
        Ok(())
    }

    /// Number of future slots the resource grid must expose.
    pub fn grid_lookahead(&self) -> u32 {
        self.max_k1
    }
}
