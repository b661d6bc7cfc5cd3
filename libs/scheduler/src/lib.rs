//! # nrsched-scheduler
//!
//! Per-slot UE scheduling core of a base-station MAC.
//!
//! ## Design Principles
//!
//! - Every cell is driven by its own thread; cells meet once per slot at a
//!   sync point where a single thread takes the multi-cell decision
//! - UE events are queued and only applied at a slot boundary
//! - HARQ processes are never left half-updated: a grant that does not fit
//!   leaves both the grid and the process untouched
//! - Lower-layer error indications roll back the HARQ state of grants that
//!   were never transmitted
//!
//! ## Layout
//!
//! - [`harq`]: DL/UL HARQ state machines and the per-cell HARQ entity
//! - [`ue`], [`ue_repository`]: UEs and their directory
//! - [`cell`], [`result`]: cell configuration, resource grid ring and
//!   per-slot decisions
//! - [`grid_allocator`]: grant placement used by strategies and cell
//!   schedulers
//! - [`strategy`]: pluggable multi-cell policies
//! - [`sync_point`]: the multi-cell barrier
//! - [`event_manager`]: queued UE events
//! - [`ue_scheduler`]: the slot pipeline and error-indication rollback

pub mod cell;
pub mod cell_schedulers;
pub mod config;
pub mod error;
pub mod event_manager;
pub mod grid_allocator;
pub mod harq;
pub mod metrics;
pub mod notifier;
pub mod result;
pub mod strategy;
pub mod sync_point;
pub mod ue;
pub mod ue_repository;
pub mod ue_scheduler;

pub use cell::{CellConfig, CellResourceAllocator, DuplexMode, TddPattern};
pub use cell_schedulers::{
    FifoSrb0Scheduler, NoopUciScheduler, PeriodicUciScheduler, Srb0Scheduler, UciScheduler,
};
pub use config::{ConfigError, SchedulerExpertConfig};
pub use error::{AllocError, SchedulerError};
pub use harq::{HarqEntity, HarqOutcome, HarqState};
pub use metrics::{CellMetrics, SchedulerMetricsHandler, SchedulerMetricsReport};
pub use notifier::{LoggingNotifier, SchedConfigurationNotifier};
pub use result::SchedResult;
pub use strategy::{
    create_scheduler_strategy, SchedulerStrategy, TimeRoundRobinStrategy, TIME_RR_STRATEGY,
};
pub use sync_point::SchedulerSyncPoint;
pub use ue_repository::UeRepository;
pub use ue_scheduler::{UeScheduler, UeSchedulerCellParams};
