use serde::{Deserialize, Serialize};

/// Point-in-time view of one delivery queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Tasks waiting in the queue (the one being attempted is not counted).
    pub pending: usize,
    /// A drain loop is active.
    pub draining: bool,
    pub delivered: u64,
    pub abandoned: u64,
}

impl QueueStatus {
    /// No outstanding work: safe to return from a drain-and-wait.
    pub fn is_idle(&self) -> bool {
        self.pending == 0 && !self.draining
    }
}
