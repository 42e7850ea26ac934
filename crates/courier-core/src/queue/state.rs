//! What happens to a task after an attempt.

use std::time::Duration;

/// Outcome of one delivery attempt, from the queue's point of view.
///
/// - Delivered: dropped from the queue.
/// - Retry: re-appended to the tail, gated by `delay`.
/// - Abandoned: dropped for good; the payload is left as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Delivered,
    Retry { delay: Duration },
    Abandoned,
}
