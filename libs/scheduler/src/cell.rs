//! Cell configuration and the per-cell resource grid.
//!
//! The grid is a ring of slot results. It exposes the slot being scheduled,
//! a window of future slots (for HARQ-ACK and PUSCH placement) and a history
//! of finalized slots used to roll back grants on error indications.

use nrsched_id::{CellIndex, SlotPoint};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::result::SchedResult;

/// Ring sizes are powers of two up to this bound so that they divide the
/// slot counter wrap period.
const MAX_RING_SIZE: usize = 2048;

// =============================================================================
// Cell Configuration
// =============================================================================

/// TDD pattern: DL slots at the start of the period, UL slots at its end,
/// flexible slots in between are used for neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TddPattern {
    pub period_slots: u32,
    pub nof_dl_slots: u32,
    pub nof_ul_slots: u32,
}

impl TddPattern {
    fn position(&self, slot: SlotPoint) -> u32 {
        slot.count() % self.period_slots.max(1)
    }

    pub fn is_dl(&self, slot: SlotPoint) -> bool {
        self.position(slot) < self.nof_dl_slots
    }

    pub fn is_ul(&self, slot: SlotPoint) -> bool {
        self.position(slot) >= self.period_slots.saturating_sub(self.nof_ul_slots)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DuplexMode {
    #[default]
    Fdd,
    Tdd(TddPattern),
}

/// Cell-wide configuration relevant to UE scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellConfig {
    pub cell_index: CellIndex,
    pub numerology: u8,
    #[serde(default)]
    pub duplex: DuplexMode,
    pub nof_dl_prbs: u32,
    pub nof_ul_prbs: u32,
}

impl CellConfig {
    /// An FDD cell with the given bandwidth in PRBs.
    pub fn fdd(cell_index: CellIndex, numerology: u8, nof_prbs: u32) -> Self {
        Self {
            cell_index,
            numerology,
            duplex: DuplexMode::Fdd,
            nof_dl_prbs: nof_prbs,
            nof_ul_prbs: nof_prbs,
        }
    }

    pub fn is_dl_enabled(&self, slot: SlotPoint) -> bool {
        match &self.duplex {
            DuplexMode::Fdd => true,
            DuplexMode::Tdd(pattern) => pattern.is_dl(slot),
        }
    }

    pub fn is_ul_enabled(&self, slot: SlotPoint) -> bool {
        match &self.duplex {
            DuplexMode::Fdd => true,
            DuplexMode::Tdd(pattern) => pattern.is_ul(slot),
        }
    }
}

// =============================================================================
// Resource Grid
// =============================================================================

/// Resource usage and decisions of one slot.
#[derive(Debug, Clone)]
pub struct CellSlotResourceAllocator {
    pub result: SchedResult,
    pub dl_prbs_used: u32,
    pub ul_prbs_used: u32,
}

impl CellSlotResourceAllocator {
    fn new(slot: SlotPoint) -> Self {
        Self {
            result: SchedResult::new(slot),
            dl_prbs_used: 0,
            ul_prbs_used: 0,
        }
    }

    pub fn slot(&self) -> SlotPoint {
        self.result.slot
    }
}

/// Ring of per-slot allocations of one cell.
#[derive(Debug)]
pub struct CellResourceAllocator {
    cfg: CellConfig,
    history_depth: u32,
    lookahead: u32,
    ring_size: usize,
    ring: Vec<CellSlotResourceAllocator>,
    last_slot: Option<SlotPoint>,
}

impl CellResourceAllocator {
    /// Create a new grid keeping `history_depth` finalized slots and
    /// exposing `lookahead` future slots.
    ///
    /// # Panics
    ///
    /// Panics if the ring needed for both windows exceeds 2048 slots.
    pub fn new(cfg: CellConfig, history_depth: u32, lookahead: u32) -> Self {
        let ring_size = ((history_depth + lookahead + 1) as usize).next_power_of_two();
        assert!(
            ring_size <= MAX_RING_SIZE,
            "history {} plus lookahead {} exceeds resource grid capacity",
            history_depth,
            lookahead
        );
        Self {
            cfg,
            history_depth,
            lookahead,
            ring_size,
            ring: Vec::new(),
            last_slot: None,
        }
    }

    pub fn cfg(&self) -> &CellConfig {
        &self.cfg
    }

    pub fn cell_index(&self) -> CellIndex {
        self.cfg.cell_index
    }

    pub fn lookahead(&self) -> u32 {
        self.lookahead
    }

    /// The slot currently being scheduled.
    pub fn slot_tx(&self) -> Option<SlotPoint> {
        self.last_slot
    }

    fn ring_index(&self, slot: SlotPoint) -> usize {
        slot.count() as usize % self.ring_size
    }

    fn reset_slot(&mut self, slot: SlotPoint) {
        let idx = self.ring_index(slot);
        self.ring[idx] = CellSlotResourceAllocator::new(slot);
    }

    /// Advances the grid to `slot`, clearing the future slots that enter the
    /// lookahead window.
    pub fn slot_indication(&mut self, slot: SlotPoint) {
        let Some(last) = self.last_slot else {
            let start = slot - (self.ring_size as u32 - self.lookahead - 1);
            let mut ring: Vec<_> = (0..self.ring_size as u32)
                .map(|offset| CellSlotResourceAllocator::new(start + offset))
                .collect();
            ring.sort_by_key(|alloc| self.ring_index(alloc.slot()));
            self.ring = ring;
            self.last_slot = Some(slot);
            return;
        };

        let gap = slot - last;
        if gap <= 0 {
            warn!(cell = %self.cfg.cell_index, slot = %slot, last = %last, "Slot indication not newer than last slot");
            return;
        }
        if gap > 1 {
            warn!(cell = %self.cfg.cell_index, slot = %slot, last = %last, nof_skipped = gap - 1, "Slots skipped");
        }

        // Slots (last + lookahead, slot + lookahead] enter the window.
        let nof_new = (gap as u32).min(self.ring_size as u32);
        let first_new = slot + (self.lookahead + 1) - nof_new;
        for offset in 0..nof_new {
            self.reset_slot(first_new + offset);
        }
        self.last_slot = Some(slot);
    }

    /// Allocation of `slot_tx + delay`.
    ///
    /// # Panics
    ///
    /// Panics if no slot was indicated yet or `delay` exceeds the lookahead.
    pub fn slot_alloc(&self, delay: u32) -> &CellSlotResourceAllocator {
        let slot = self.future_slot(delay);
        &self.ring[self.ring_index(slot)]
    }

    /// Mutable allocation of `slot_tx + delay`.
    ///
    /// # Panics
    ///
    /// Panics if no slot was indicated yet or `delay` exceeds the lookahead.
    pub fn slot_alloc_mut(&mut self, delay: u32) -> &mut CellSlotResourceAllocator {
        let slot = self.future_slot(delay);
        let idx = self.ring_index(slot);
        &mut self.ring[idx]
    }

    fn future_slot(&self, delay: u32) -> SlotPoint {
        assert!(
            delay <= self.lookahead,
            "delay {} beyond grid lookahead {}",
            delay,
            self.lookahead
        );
        let Some(slot_tx) = self.last_slot else {
            panic!("{}: resource grid accessed before first slot indication", self.cfg.cell_index);
        };
        slot_tx + delay
    }

    /// Finalized (or current) allocation of a past slot.
    ///
    /// Returns `None` if the slot is in the future or no longer retained.
    pub fn get_history(&self, slot: SlotPoint) -> Option<&CellSlotResourceAllocator> {
        let slot_tx = self.last_slot?;
        if slot.numerology() != slot_tx.numerology() {
            return None;
        }
        let age = slot_tx - slot;
        if age < 0 || age > self.history_depth as i32 {
            return None;
        }
        self.ring
            .get(self.ring_index(slot))
            .filter(|alloc| alloc.slot() == slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn slot(count: u32) -> SlotPoint {
        SlotPoint::from_count(0, count).unwrap()
    }

    fn grid() -> CellResourceAllocator {
        CellResourceAllocator::new(CellConfig::fdd(CellIndex::new(0).unwrap(), 0, 52), 16, 8)
    }

    #[rstest]
    #[case(0, true, false)]
    #[case(6, true, false)]
    #[case(7, false, false)]
    #[case(8, false, true)]
    #[case(9, false, true)]
    #[case(10, true, false)]
    fn test_tdd_pattern(#[case] count: u32, #[case] dl: bool, #[case] ul: bool) {
        let cfg = CellConfig {
            duplex: DuplexMode::Tdd(TddPattern {
                period_slots: 10,
                nof_dl_slots: 7,
                nof_ul_slots: 2,
            }),
            ..CellConfig::fdd(CellIndex::new(0).unwrap(), 1, 51)
        };
        assert_eq!(cfg.is_dl_enabled(slot(count)), dl);
        assert_eq!(cfg.is_ul_enabled(slot(count)), ul);
    }

    #[test]
    fn test_future_slots_are_fresh() {
        let mut g = grid();
        g.slot_indication(slot(50));
        assert_eq!(g.slot_alloc(0).slot(), slot(50));
        assert_eq!(g.slot_alloc(8).slot(), slot(58));

        g.slot_alloc_mut(4).dl_prbs_used = 10;
        g.slot_indication(slot(51));
        assert_eq!(g.slot_alloc(3).dl_prbs_used, 10);
        assert_eq!(g.slot_alloc(8).slot(), slot(59));
        assert_eq!(g.slot_alloc(8).dl_prbs_used, 0);
    }

    #[test]
    fn test_history_window() {
        let mut g = grid();
        for count in 40..=60 {
            g.slot_indication(slot(count));
        }
        assert_eq!(g.get_history(slot(60)).map(|a| a.slot()), Some(slot(60)));
        assert_eq!(g.get_history(slot(44)).map(|a| a.slot()), Some(slot(44)));
        assert!(g.get_history(slot(43)).is_none());
        assert!(g.get_history(slot(61)).is_none());
    }

    #[test]
    fn test_history_survives_wraparound() {
        let mut g = grid();
        for count in 10230..10240 {
            g.slot_indication(slot(count));
        }
        for count in 0..5 {
            g.slot_indication(slot(count));
        }
        assert_eq!(g.get_history(slot(10238)).map(|a| a.slot()), Some(slot(10238)));
        assert_eq!(g.slot_alloc(8).slot(), slot(12));
    }

    #[test]
    fn test_skipped_slots_are_reset() {
        let mut g = grid();
        g.slot_indication(slot(50));
        g.slot_alloc_mut(8).ul_prbs_used = 7;
        g.slot_indication(slot(60));
        assert_eq!(g.slot_alloc(0).slot(), slot(60));
        assert_eq!(g.slot_alloc(8).slot(), slot(68));
        assert_eq!(g.get_history(slot(58)).map(|a| a.ul_prbs_used), Some(7));
    }

    #[test]
    #[should_panic(expected = "beyond grid lookahead")]
    fn test_delay_beyond_lookahead_panics() {
        let mut g = grid();
        g.slot_indication(slot(0));
        let _ = g.slot_alloc(9);
    }
}
