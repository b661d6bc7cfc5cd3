//! Logical slot time with wraparound.

use serde::{Deserialize, Serialize};

use crate::IdError;

/// Number of system frame numbers before the slot counter wraps.
pub const NOF_SFNS: u32 = 1024;

/// Number of subframes in a radio frame.
pub const NOF_SUBFRAMES_PER_FRAME: u32 = 10;

/// Highest supported numerology (240 kHz subcarrier spacing).
pub const MAX_NUMEROLOGY: u8 = 4;

/// A point in slot time, relative to a numerology.
///
/// The counter wraps every 1024 frames. Comparison between two slot points is
/// defined by their signed distance, so a slot shortly after the wrap compares
/// greater than a slot shortly before it. Slot points of different
/// numerologies are not comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawSlotPoint", into = "RawSlotPoint")]
pub struct SlotPoint {
    numerology: u8,
    count: u32,
}

impl SlotPoint {
    /// Creates a slot point from a system frame number and a slot index.
    pub fn new(numerology: u8, sfn: u32, slot_index: u32) -> Result<Self, IdError> {
        let slots_per_frame = Self::checked_slots_per_frame(numerology)?;
        if sfn >= NOF_SFNS {
            return Err(IdError::OutOfRange {
                kind: "sfn",
                value: u64::from(sfn),
                max: u64::from(NOF_SFNS),
            });
        }
        if slot_index >= slots_per_frame {
            return Err(IdError::OutOfRange {
                kind: "slot",
                value: u64::from(slot_index),
                max: u64::from(slots_per_frame),
            });
        }
        Ok(Self {
            numerology,
            count: sfn * slots_per_frame + slot_index,
        })
    }

    /// Creates a slot point from an absolute slot count; the count is reduced
    /// modulo the wrap period.
    pub fn from_count(numerology: u8, count: u32) -> Result<Self, IdError> {
        let slots_per_frame = Self::checked_slots_per_frame(numerology)?;
        Ok(Self {
            numerology,
            count: count % (NOF_SFNS * slots_per_frame),
        })
    }

    fn checked_slots_per_frame(numerology: u8) -> Result<u32, IdError> {
        if numerology > MAX_NUMEROLOGY {
            return Err(IdError::InvalidNumerology(numerology));
        }
        Ok(NOF_SUBFRAMES_PER_FRAME << numerology)
    }

    /// Returns the numerology of this slot point.
    #[must_use]
    pub const fn numerology(&self) -> u8 {
        self.numerology
    }

    /// Returns the slot count since SFN 0, slot 0.
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Number of slots in a radio frame for this numerology.
    #[must_use]
    pub const fn nof_slots_per_frame(&self) -> u32 {
        NOF_SUBFRAMES_PER_FRAME << self.numerology
    }

    /// Number of slots before the counter wraps.
    #[must_use]
    pub const fn period(&self) -> u32 {
        NOF_SFNS * self.nof_slots_per_frame()
    }

    /// System frame number.
    #[must_use]
    pub const fn sfn(&self) -> u32 {
        self.count / self.nof_slots_per_frame()
    }

    /// Slot index within the frame.
    #[must_use]
    pub const fn slot_index(&self) -> u32 {
        self.count % self.nof_slots_per_frame()
    }

    /// Signed distance `self - other` in slots, in `[-period/2, period/2)`.
    ///
    /// # Panics
    ///
    /// Panics if the numerologies differ.
    #[must_use]
    pub fn distance(&self, other: SlotPoint) -> i32 {
        assert_eq!(
            self.numerology, other.numerology,
            "comparing slot points of different numerologies"
        );
        let period = self.period() as i64;
        let diff = (i64::from(self.count) - i64::from(other.count)).rem_euclid(period);
        if diff >= period / 2 {
            (diff - period) as i32
        } else {
            diff as i32
        }
    }

    fn offset(&self, delta: i64) -> Self {
        let period = i64::from(self.period());
        Self {
            numerology: self.numerology,
            count: (i64::from(self.count) + delta).rem_euclid(period) as u32,
        }
    }
}

impl std::fmt::Display for SlotPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.sfn(), self.slot_index())
    }
}

impl PartialOrd for SlotPoint {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        if self.numerology != other.numerology {
            return None;
        }
        Some(self.distance(*other).cmp(&0))
    }
}

impl std::ops::Add<u32> for SlotPoint {
    type Output = SlotPoint;

    fn add(self, rhs: u32) -> Self::Output {
        self.offset(i64::from(rhs))
    }
}

impl std::ops::Sub<u32> for SlotPoint {
    type Output = SlotPoint;

    fn sub(self, rhs: u32) -> Self::Output {
        self.offset(-i64::from(rhs))
    }
}

impl std::ops::AddAssign<u32> for SlotPoint {
    fn add_assign(&mut self, rhs: u32) {
        *self = *self + rhs;
    }
}

impl std::ops::Sub<SlotPoint> for SlotPoint {
    type Output = i32;

    fn sub(self, rhs: SlotPoint) -> Self::Output {
        self.distance(rhs)
    }
}

/// Wire form of a slot point, validated on deserialization.
#[derive(Serialize, Deserialize)]
struct RawSlotPoint {
    numerology: u8,
    count: u32,
}

impl TryFrom<RawSlotPoint> for SlotPoint {
    type Error = IdError;

    fn try_from(raw: RawSlotPoint) -> Result<Self, Self::Error> {
        let slot = SlotPoint::from_count(raw.numerology, raw.count)?;
        if slot.count != raw.count {
            return Err(IdError::OutOfRange {
                kind: "slot count",
                value: u64::from(raw.count),
                max: u64::from(slot.period()),
            });
        }
        Ok(slot)
    }
}

impl From<SlotPoint> for RawSlotPoint {
    fn from(slot: SlotPoint) -> Self {
        Self {
            numerology: slot.numerology,
            count: slot.count,
        }
    }
}
