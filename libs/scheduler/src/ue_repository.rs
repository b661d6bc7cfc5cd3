//! Directory of UEs known to the scheduler.
//!
//! UEs are stored in a dense table addressed by [`UeIndex`]; a secondary map
//! resolves the volatile C-RNTI to the stable index.

use std::collections::HashMap;

use nrsched_id::{Rnti, SlotPoint, UeIndex, MAX_NOF_UES};
use tracing::{debug, info};

use crate::error::SchedulerError;
use crate::ue::Ue;

/// The UE directory.
#[derive(Debug)]
pub struct UeRepository {
    ues: Vec<Option<Ue>>,
    rnti_to_ue_index: HashMap<Rnti, UeIndex>,
    nof_ues: usize,
    last_slot: Option<SlotPoint>,
}

impl Default for UeRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl UeRepository {
    pub fn new() -> Self {
        Self {
            ues: (0..MAX_NOF_UES).map(|_| None).collect(),
            rnti_to_ue_index: HashMap::new(),
            nof_ues: 0,
            last_slot: None,
        }
    }

    /// Adds a UE. Fails if its index or its C-RNTI is already in use.
    pub fn add_ue(&mut self, ue: Ue) -> Result<(), SchedulerError> {
        let ue_index = ue.ue_index();
        if self.contains(ue_index) {
            return Err(SchedulerError::UeIndexInUse(ue_index));
        }
        if let Some(owner) = self.rnti_to_ue_index.get(&ue.crnti()) {
            return Err(SchedulerError::RntiInUse {
                rnti: ue.crnti(),
                ue_index: *owner,
            });
        }
        info!(ue = %ue_index, rnti = %ue.crnti(), "UE added");
        self.rnti_to_ue_index.insert(ue.crnti(), ue_index);
        self.ues[ue_index.as_usize()] = Some(ue);
        self.nof_ues += 1;
        Ok(())
    }

    /// Removes a UE and releases its C-RNTI.
    pub fn remove_ue(&mut self, ue_index: UeIndex) -> Result<Ue, SchedulerError> {
        let ue = self.ues[ue_index.as_usize()]
            .take()
            .ok_or(SchedulerError::UeNotFound(ue_index))?;
        self.rnti_to_ue_index.remove(&ue.crnti());
        self.nof_ues -= 1;
        info!(ue = %ue_index, rnti = %ue.crnti(), "UE removed");
        Ok(ue)
    }

    /// Reassigns the C-RNTI of a UE. The UE index stays the same.
    pub fn update_crnti(&mut self, ue_index: UeIndex, crnti: Rnti) -> Result<(), SchedulerError> {
        match self.rnti_to_ue_index.get(&crnti) {
            Some(owner) if *owner == ue_index => return Ok(()),
            Some(owner) => {
                return Err(SchedulerError::RntiInUse {
                    rnti: crnti,
                    ue_index: *owner,
                })
            }
            None => {}
        }
        let ue = self.ues[ue_index.as_usize()]
            .as_mut()
            .ok_or(SchedulerError::UeNotFound(ue_index))?;
        let old = ue.crnti();
        ue.set_crnti(crnti);
        self.rnti_to_ue_index.remove(&old);
        self.rnti_to_ue_index.insert(crnti, ue_index);
        debug!(ue = %ue_index, old_rnti = %old, rnti = %crnti, "C-RNTI reassigned");
        Ok(())
    }

    pub fn contains(&self, ue_index: UeIndex) -> bool {
        self.ues[ue_index.as_usize()].is_some()
    }

    pub fn get(&self, ue_index: UeIndex) -> Option<&Ue> {
        self.ues[ue_index.as_usize()].as_ref()
    }

    pub fn get_mut(&mut self, ue_index: UeIndex) -> Option<&mut Ue> {
        self.ues[ue_index.as_usize()].as_mut()
    }

    pub fn find_by_rnti(&self, rnti: Rnti) -> Option<&Ue> {
        let ue_index = *self.rnti_to_ue_index.get(&rnti)?;
        self.get(ue_index)
    }

    pub fn find_by_rnti_mut(&mut self, rnti: Rnti) -> Option<&mut Ue> {
        let ue_index = *self.rnti_to_ue_index.get(&rnti)?;
        self.get_mut(ue_index)
    }

    /// Iterates over all UEs in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = &Ue> {
        self.ues.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Ue> {
        self.ues.iter_mut().flatten()
    }

    pub fn ue_indexes(&self) -> Vec<UeIndex> {
        self.iter().map(Ue::ue_index).collect()
    }

    pub fn len(&self) -> usize {
        self.nof_ues
    }

    pub fn is_empty(&self) -> bool {
        self.nof_ues == 0
    }

    pub fn last_slot(&self) -> Option<SlotPoint> {
        self.last_slot
    }

    /// Advances per-UE timers once per slot, however many cells call it.
    ///
    /// Returns `None` if the slot was already processed, otherwise the
    /// number of HARQ processes that timed out.
    pub fn slot_indication(&mut self, slot: SlotPoint) -> Option<usize> {
        if self.last_slot == Some(slot) {
            return None;
        }
        self.last_slot = Some(slot);
        Some(self.iter_mut().map(|ue| ue.slot_indication(slot)).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerExpertConfig;
    use nrsched_events::UeConfig;
    use nrsched_id::CellIndex;

    fn make_ue(index: u16, rnti: u16) -> Ue {
        Ue::new(
            UeIndex::new(index).unwrap(),
            Rnti::new_crnti(rnti).unwrap(),
            UeConfig::single_cell(CellIndex::new(0).unwrap()),
            &SchedulerExpertConfig::default(),
        )
    }

    #[test]
    fn test_add_and_find() {
        let mut repo = UeRepository::new();
        repo.add_ue(make_ue(3, 0x4601)).unwrap();
        assert_eq!(repo.len(), 1);
        let ue = repo.find_by_rnti(Rnti::new_crnti(0x4601).unwrap()).unwrap();
        assert_eq!(ue.ue_index().value(), 3);
        assert!(repo.find_by_rnti(Rnti::new_crnti(0x4602).unwrap()).is_none());
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut repo = UeRepository::new();
        repo.add_ue(make_ue(3, 0x4601)).unwrap();
        assert_eq!(
            repo.add_ue(make_ue(3, 0x4602)),
            Err(SchedulerError::UeIndexInUse(UeIndex::new(3).unwrap()))
        );
        assert!(matches!(
            repo.add_ue(make_ue(4, 0x4601)),
            Err(SchedulerError::RntiInUse { .. })
        ));
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_remove_releases_rnti() {
        let mut repo = UeRepository::new();
        repo.add_ue(make_ue(3, 0x4601)).unwrap();
        repo.remove_ue(UeIndex::new(3).unwrap()).unwrap();
        assert!(repo.is_empty());
        assert!(repo.find_by_rnti(Rnti::new_crnti(0x4601).unwrap()).is_none());
        assert!(repo.remove_ue(UeIndex::new(3).unwrap()).unwrap_err().is_not_found());
        repo.add_ue(make_ue(4, 0x4601)).unwrap();
    }

    #[test]
    fn test_crnti_reassignment_keeps_index() {
        let mut repo = UeRepository::new();
        repo.add_ue(make_ue(3, 0x4601)).unwrap();
        repo.add_ue(make_ue(4, 0x4602)).unwrap();
        let ue3 = UeIndex::new(3).unwrap();
        let new_rnti = Rnti::new_crnti(0x4700).unwrap();

        repo.update_crnti(ue3, new_rnti).unwrap();
        assert_eq!(repo.find_by_rnti(new_rnti).unwrap().ue_index(), ue3);
        assert_eq!(repo.get(ue3).unwrap().pcell().harqs.rnti(), new_rnti);
        assert!(repo.find_by_rnti(Rnti::new_crnti(0x4601).unwrap()).is_none());
        assert!(matches!(
            repo.update_crnti(ue3, Rnti::new_crnti(0x4602).unwrap()),
            Err(SchedulerError::RntiInUse { .. })
        ));
    }

    #[test]
    fn test_slot_indication_once_per_slot() {
        let mut repo = UeRepository::new();
        let slot = SlotPoint::from_count(0, 10).unwrap();
        assert_eq!(repo.slot_indication(slot), Some(0));
        assert_eq!(repo.slot_indication(slot), None);
        assert_eq!(repo.slot_indication(slot + 1), Some(0));
    }
}
