//! Delivery task: payload + retry bookkeeping.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::Disposition;
use crate::domain::TaskId;

/// One pending delivery.
///
/// The payload sits behind an `Arc` so an attempt can run on its own tokio
/// task while the record stays owned by the drain loop.
#[derive(Debug)]
pub struct DeliveryTask<P> {
    pub id: TaskId,
    pub payload: Arc<P>,

    /// Failed attempts that led to a retry. Never exceeds `max_attempts`.
    pub attempts: u32,

    pub max_attempts: u32,

    /// Backoff gate.
    pub next_eligible_at: Instant,

    pub last_error: Option<String>,
}

impl<P> DeliveryTask<P> {
    pub fn new(payload: P, max_attempts: u32) -> Self {
        Self {
            id: TaskId::generate(),
            payload: Arc::new(payload),
            attempts: 0,
            max_attempts,
            next_eligible_at: Instant::now(),
            last_error: None,
        }
    }

    pub fn is_eligible(&self, now: Instant) -> bool {
        now >= self.next_eligible_at
    }

    /// Record a failed attempt.
    ///
    /// At the ceiling the task is abandoned and the counter is left alone;
    /// otherwise the counter goes up and `delay_for(attempts)` gates the retry.
    pub fn fail(
        &mut self,
        error: String,
        now: Instant,
        delay_for: impl FnOnce(u32) -> Duration,
    ) -> Disposition {
        self.last_error = Some(error);
        if self.attempts >= self.max_attempts {
            return Disposition::Abandoned;
        }
        self.attempts += 1;
        let delay = delay_for(self.attempts);
        self.next_eligible_at = now + delay;
        Disposition::Retry { delay }
    }
}
