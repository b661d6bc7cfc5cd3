//! # nrsched-slot-driver
//!
//! Runs the UE scheduler in real time: one thread per cell paced by a
//! shared slot clock, an emulated PHY feeding back HARQ-ACK, CRC and
//! error indications, a DL traffic generator and a metrics reporter.

pub mod cell_runner;
pub mod config;
pub mod lower_layer;
pub mod reporter;
pub mod setup;
pub mod slot_clock;
pub mod traffic;

pub use config::Config;
