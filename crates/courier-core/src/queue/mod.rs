//! Queue module: retry policy, task bookkeeping and the in-memory delivery queue.

mod memory;
mod record;
mod retry;
mod state;

pub use memory::DeliveryQueue;
pub use record::DeliveryTask;
pub use retry::{RetryMode, RetryPolicy};
pub use state::Disposition;

use async_trait::async_trait;

use crate::error::CourierError;

/// One delivery attempt for a payload of type `P`.
///
/// The queue owns retry and backoff; an implementation performs exactly one
/// attempt and reports the result. It must not retry internally in a way the
/// queue could observe.
#[async_trait]
pub trait Deliver<P>: Send + Sync + 'static {
    async fn deliver(&self, payload: &P) -> Result<(), CourierError>;

    /// Called once when the queue gives up on a payload.
    async fn abandoned(&self, _payload: &P, _error: &str) {}
}
