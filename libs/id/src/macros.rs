//! Macros for defining typed index types.

/// Macro to define a bounded, typed index with a specific prefix.
///
/// This generates a newtype wrapper around an unsigned integer with:
/// - `PREFIX` and `MAX` (exclusive upper bound) constants
/// - `new()` that validates the bound
/// - `parse()` to parse from the `{prefix}_{value}` string form
/// - `Display` and `FromStr` implementations
/// - `Serialize` and `Deserialize` implementations (as a plain integer)
/// - `Ord`, `Hash`, and other standard traits
///
/// # Example
///
/// ```ignore
/// define_index!(CellIndex, u8, "cell", 16);
///
/// let cell = CellIndex::new(3)?;
/// let parsed: CellIndex = "cell_3".parse()?;
/// ```
#[macro_export]
macro_rules! define_index {
    ($(#[$meta:meta])* $name:ident, $repr:ty, $prefix:literal, $max:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name($repr);

        impl $name {
            /// The prefix for this index type.
            pub const PREFIX: &'static str = $prefix;

            /// Exclusive upper bound of valid values.
            pub const MAX: $repr = $max;

            /// Creates an index, validating the upper bound.
            pub fn new(value: $repr) -> Result<Self, $crate::IdError> {
                if value >= Self::MAX {
                    return Err($crate::IdError::OutOfRange {
                        kind: Self::PREFIX,
                        value: u64::from(value),
                        max: u64::from(Self::MAX),
                    });
                }
                Ok(Self(value))
            }

            /// Returns the underlying integer.
            #[must_use]
            pub const fn value(&self) -> $repr {
                self.0
            }

            /// Returns the index as a `usize`, for addressing dense tables.
            #[must_use]
            pub const fn as_usize(&self) -> usize {
                self.0 as usize
            }

            /// Iterates over every valid index in ascending order.
            pub fn all() -> impl Iterator<Item = Self> {
                (0..Self::MAX).map(Self)
            }

            /// Parses an index from a string.
            ///
            /// The string must be in the format `{prefix}_{value}`.
            pub fn parse(s: &str) -> Result<Self, $crate::IdError> {
                if s.is_empty() {
                    return Err($crate::IdError::Empty);
                }

                let Some((prefix, value_str)) = s.split_once('_') else {
                    return Err($crate::IdError::MissingSeparator);
                };

                if prefix != Self::PREFIX {
                    return Err($crate::IdError::InvalidPrefix {
                        expected: Self::PREFIX,
                        actual: prefix.to_string(),
                    });
                }

                let value = value_str
                    .parse::<$repr>()
                    .map_err(|e| $crate::IdError::InvalidNumber(e.to_string()))?;

                Self::new(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}_{}", Self::PREFIX, self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<usize> for $name {
            type Error = $crate::IdError;

            fn try_from(value: usize) -> Result<Self, Self::Error> {
                let narrowed = <$repr>::try_from(value).map_err(|_| $crate::IdError::OutOfRange {
                    kind: Self::PREFIX,
                    value: value as u64,
                    max: u64::from(Self::MAX),
                })?;
                Self::new(narrowed)
            }
        }

        impl From<$name> for usize {
            fn from(index: $name) -> Self {
                index.as_usize()
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_u64(u64::from(self.0))
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let value = <$repr>::deserialize(deserializer)?;
                Self::new(value).map_err(serde::de::Error::custom)
            }
        }
    };
}
