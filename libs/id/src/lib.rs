//! # nrsched-id
//!
//! Typed identifiers and logical time for the nrsched MAC scheduler.
//!
//! ## Design Principles
//!
//! - Indices are small, bounded integers; construction validates the bound
//! - Radio identifiers (RNTIs) are volatile and never double as internal indices
//! - Indices are typed to prevent mixing cells, UEs and HARQ processes
//! - Slot points wrap around; ordering is defined by signed distance
//!
//! ## Index Format
//!
//! All bounded indices render as `{prefix}_{value}`:
//!
//! - `cell_0`
//! - `ue_17`
//! - `harq_3`
//!
//! RNTIs render in hexadecimal (`0x4601`) and slot points as `{sfn}.{slot}`.

mod error;
mod macros;
mod slot;
mod types;

pub use error::IdError;
pub use slot::{SlotPoint, MAX_NUMEROLOGY, NOF_SFNS};
pub use types::*;
