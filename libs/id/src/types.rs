//! Typed index definitions for scheduler entities.
//!
//! Each index type has a unique prefix that identifies the entity type and
//! an exclusive upper bound matching the dimensioning of the scheduler.

use crate::define_index;
use crate::IdError;

// =============================================================================
// Cells and UEs
// =============================================================================

define_index!(
    /// Index of a serving cell within the DU.
    CellIndex,
    u8,
    "cell",
    16
);

define_index!(
    /// Stable internal index of a UE, valid for the UE's whole lifetime.
    UeIndex,
    u16,
    "ue",
    1024
);

// =============================================================================
// HARQ
// =============================================================================

define_index!(
    /// HARQ process number.
    HarqId,
    u8,
    "harq",
    16
);

/// Maximum number of serving cells a scheduler instance can manage.
pub const MAX_NOF_CELLS: usize = CellIndex::MAX as usize;

/// Maximum number of UEs a scheduler instance can manage.
pub const MAX_NOF_UES: usize = UeIndex::MAX as usize;

/// Maximum number of HARQ processes per UE, per cell and per direction.
pub const MAX_NOF_HARQS: usize = HarqId::MAX as usize;

// =============================================================================
// Radio Network Temporary Identifier
// =============================================================================

/// Radio identifier of a UE (or a broadcast/paging destination).
///
/// RNTIs are volatile: a UE keeps its [`UeIndex`] for its lifetime, but the
/// C-RNTI that addresses it over the air can be reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rnti(u16);

impl Rnti {
    /// Lowest value assignable as C-RNTI.
    pub const MIN_CRNTI: u16 = 0x0001;

    /// Highest value assignable as C-RNTI.
    pub const MAX_CRNTI: u16 = 0xFFEF;

    /// Paging RNTI.
    pub const P_RNTI: Rnti = Rnti(0xFFFE);

    /// System information RNTI.
    pub const SI_RNTI: Rnti = Rnti(0xFFFF);

    /// Creates a C-RNTI, validating that it is inside the assignable range.
    pub fn new_crnti(value: u16) -> Result<Self, IdError> {
        if !(Self::MIN_CRNTI..=Self::MAX_CRNTI).contains(&value) {
            return Err(IdError::InvalidCrnti(value));
        }
        Ok(Self(value))
    }

    /// Creates an RNTI from a raw value without range checks.
    #[must_use]
    pub const fn from_raw(value: u16) -> Self {
        Self(value)
    }

    /// Returns the underlying value.
    #[must_use]
    pub const fn value(&self) -> u16 {
        self.0
    }

    /// Returns true if this RNTI lies inside the C-RNTI range.
    #[must_use]
    pub const fn is_crnti(&self) -> bool {
        self.0 >= Self::MIN_CRNTI && self.0 <= Self::MAX_CRNTI
    }

    /// Parses an RNTI from either hexadecimal (`0x4601`) or decimal form.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u16::from_str_radix(hex, 16),
            None => s.parse::<u16>(),
        }
        .map_err(|e| IdError::InvalidNumber(e.to_string()))?;
        Ok(Self(value))
    }
}

impl std::fmt::Display for Rnti {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

impl std::str::FromStr for Rnti {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Rnti> for u16 {
    fn from(rnti: Rnti) -> Self {
        rnti.0
    }
}

impl serde::Serialize for Rnti {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u16(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for Rnti {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = u16::deserialize(deserializer)?;
        Ok(Self(value))
    }
}

// =============================================================================
// Events
// =============================================================================

/// Event ID is a simple monotonic integer assigned on enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u64);

impl EventId {
    /// Creates a new EventId from a u64.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying u64 value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Returns the next event ID.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EventId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl serde::Serialize for EventId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for EventId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let id = u64::deserialize(deserializer)?;
        Ok(Self(id))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_cell_index_roundtrip() {
        let id = CellIndex::new(3).unwrap();
        let s = id.to_string();
        assert_eq!(s, "cell_3");
        let parsed: CellIndex = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_cell_index_out_of_range() {
        let err = CellIndex::new(16).unwrap_err();
        assert!(err.is_range_error());
        assert!(matches!(
            err,
            IdError::OutOfRange {
                kind: "cell",
                value: 16,
                max: 16
            }
        ));
    }

    #[rstest]
    #[case("", IdError::Empty)]
    #[case("cell3", IdError::MissingSeparator)]
    #[case("ue_3", IdError::InvalidPrefix { expected: "cell", actual: "ue".to_string() })]
    fn test_cell_index_parse_errors(#[case] input: &str, #[case] expected: IdError) {
        assert_eq!(CellIndex::parse(input).unwrap_err(), expected);
    }

    #[test]
    fn test_ue_index_invalid_number() {
        let result: Result<UeIndex, _> = "ue_abc".parse();
        assert!(matches!(result.unwrap_err(), IdError::InvalidNumber(_)));
    }

    #[test]
    fn test_harq_id_try_from_usize() {
        assert_eq!(HarqId::try_from(5usize).unwrap().value(), 5);
        assert!(HarqId::try_from(16usize).is_err());
        assert!(HarqId::try_from(1000usize).is_err());
    }

    #[test]
    fn test_index_json_is_plain_integer() {
        let id = UeIndex::new(17).unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "17");
        let parsed: UeIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
        assert!(serde_json::from_str::<UeIndex>("5000").is_err());
    }

    #[test]
    fn test_all_iterates_full_range() {
        assert_eq!(CellIndex::all().count(), MAX_NOF_CELLS);
        assert_eq!(HarqId::all().last().unwrap().value(), 15);
    }

    #[rstest]
    #[case(0x0000, false)]
    #[case(0x0001, true)]
    #[case(0x4601, true)]
    #[case(0xFFEF, true)]
    #[case(0xFFF0, false)]
    #[case(0xFFFF, false)]
    fn test_crnti_range(#[case] value: u16, #[case] valid: bool) {
        assert_eq!(Rnti::new_crnti(value).is_ok(), valid);
        assert_eq!(Rnti::from_raw(value).is_crnti(), valid);
    }

    #[test]
    fn test_rnti_display_and_parse() {
        let rnti = Rnti::new_crnti(0x4601).unwrap();
        assert_eq!(rnti.to_string(), "0x4601");
        assert_eq!("0x4601".parse::<Rnti>().unwrap(), rnti);
        assert_eq!("17921".parse::<Rnti>().unwrap(), rnti);
        assert!("0xZZ".parse::<Rnti>().is_err());
    }

    #[test]
    fn test_event_id_roundtrip() {
        let id = EventId::new(12345);
        let json = serde_json::to_string(&id).unwrap();
        let parsed: EventId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
        assert_eq!(id.next().value(), 12346);
    }

    #[test]
    fn test_all_index_prefixes_unique() {
        let prefixes = vec![CellIndex::PREFIX, UeIndex::PREFIX, HarqId::PREFIX];
        let unique: std::collections::HashSet<_> = prefixes.iter().collect();
        assert_eq!(prefixes.len(), unique.len(), "Duplicate index prefixes found!");
    }
}
