//! Status - queue depth and outcome counters of a pipeline.

use serde::Serialize;

use crate::observability::QueueStatus;

/// Snapshot of both queues. A disabled queue reports all zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStatus {
    pub uploads: QueueStatus,
    pub notifications: QueueStatus,
}

impl PipelineStatus {
    pub fn is_idle(&self) -> bool {
        self.uploads.is_idle() && self.notifications.is_idle()
    }
}
