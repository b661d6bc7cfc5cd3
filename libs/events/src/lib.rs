//! # nrsched-events
//!
//! Events consumed by the nrsched UE scheduler.
//!
//! ## Design Principles
//!
//! - Events are immutable records queued by the MAC and applied at a slot boundary
//! - Every event is either common to the UE (configuration, buffer state) or
//!   scoped to the cell that produced it (feedback indications)
//! - Events are never applied in the middle of a slot's grant computation
//!
//! ## Event Envelope
//!
//! All events share a common envelope with:
//! - Enqueue ordering (`event_id`)
//! - Routing scope (`EventScope::Common` or `EventScope::Cell`)
//! - Enqueue timestamp (`occurred_at`)
//!
//! ## Event Types
//!
//! - UE lifecycle (`ue.created`, `ue.reconfigured`, `ue.removed`)
//! - Buffer state (`ue.dl_buffer_state`, `ue.ul_bsr`)
//! - Lower-layer feedback (`ue.uci_indication`, `ue.crc_indication`)
//!
//! Lower-layer error indications ([`ErrorOutcome`]) bypass the queue and are
//! handled directly by the scheduler's rollback path.

mod envelope;
mod error;
mod types;

pub use envelope::*;
pub use error::EventError;
pub use types::*;
