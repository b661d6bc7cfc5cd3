//! Completion notifications for UE configuration procedures.

use nrsched_id::UeIndex;
use tracing::info;

/// Receives the outcome of UE creation, reconfiguration and removal once
/// the scheduler has applied them.
pub trait SchedConfigurationNotifier: Send + Sync {
    fn on_ue_config_complete(&self, ue_index: UeIndex, success: bool);

    fn on_ue_delete_response(&self, ue_index: UeIndex);
}

/// Notifier that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

impl SchedConfigurationNotifier for LoggingNotifier {
    fn on_ue_config_complete(&self, ue_index: UeIndex, success: bool) {
        info!(ue = %ue_index, success, "UE configuration complete");
    }

    fn on_ue_delete_response(&self, ue_index: UeIndex) {
        info!(ue = %ue_index, "UE deletion complete");
    }
}
