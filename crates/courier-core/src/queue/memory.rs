//! In-memory delivery queue.
//!
//! # Lifecycle of a task
//! 1. `enqueue` appends it with `attempts = 0` and starts a drain loop if none
//!    is running.
//! 2. The loop pops the head. A task still inside its backoff window goes back
//!    to the tail and the loop sleeps for `poll_interval`.
//! 3. An eligible task gets one attempt on a separate tokio task.
//! 4. On failure the task is either rescheduled (`attempts + 1`, next delay from
//!    the policy) or, once `attempts == max_attempts`, abandoned and handed to
//!    the sink's `abandoned` hook.
//!
//! # Concurrency
//! - `draining` is claimed and released only under the state lock, so there is
//!   never more than one loop per queue.
//! - The lock is released before any attempt, hook or sleep.
//! - Attempts and hooks run under `tokio::spawn`; a panic in either is logged
//!   and the loop keeps going.
//!
//! # Shutdown
//! `drain` polls `status` every 100 ms and returns once nothing is pending and
//! the loop has stopped. Nothing is persisted: tasks still queued when the
//! process exits are lost.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, warn};

use super::{Deliver, DeliveryTask, Disposition, RetryMode, RetryPolicy};
use crate::domain::TaskId;
use crate::error::CourierError;
use crate::observability::QueueStatus;

/// How often `drain` re-checks the queue.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

struct QueueState<P> {
    /// FIFO with requeue: failed tasks go back to the tail.
    tasks: VecDeque<DeliveryTask<P>>,

    /// Set when a drain loop is claimed, cleared by that loop when it
    /// observes an empty queue. Only touched under the lock.
    draining: bool,

    delivered: u64,
    abandoned: u64,
}

struct QueueInner<P> {
    name: String,
    policy: RetryPolicy,
    deliverer: Arc<dyn Deliver<P>>,
    state: Mutex<QueueState<P>>,
}

/// Reliable in-process delivery queue.
///
/// Design:
/// - One drain loop at most, spawned on demand by `enqueue`.
/// - The lock is never held across a delivery attempt or a sleep.
/// - Every task ends up delivered or abandoned; nothing is dropped silently.
///
/// Cloning yields another handle to the same queue.
pub struct DeliveryQueue<P> {
    inner: Arc<QueueInner<P>>,
}

impl<P> Clone for DeliveryQueue<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Send + Sync + 'static> DeliveryQueue<P> {
    pub fn new(name: impl Into<String>, policy: RetryPolicy, deliverer: Arc<dyn Deliver<P>>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                name: name.into(),
                policy,
                deliverer,
                state: Mutex::new(QueueState {
                    tasks: VecDeque::new(),
                    draining: false,
                    delivered: 0,
                    abandoned: 0,
                }),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.inner.policy
    }

    /// Append a task and make sure a drain loop is running.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn enqueue(&self, payload: P) -> TaskId {
        let task = DeliveryTask::new(payload, self.inner.policy.max_attempts);
        let id = task.id;

        let start_drain = {
            let mut state = self.inner.state.lock().await;
            state.tasks.push_back(task);
            !std::mem::replace(&mut state.draining, true)
        };

        debug!(queue = %self.inner.name, task = %id, "enqueued");
        if start_drain {
            tokio::spawn(drain_loop(Arc::clone(&self.inner)));
        }
        id
    }

    pub async fn status(&self) -> QueueStatus {
        let state = self.inner.state.lock().await;
        QueueStatus {
            pending: state.tasks.len(),
            draining: state.draining,
            delivered: state.delivered,
            abandoned: state.abandoned,
        }
    }

    /// Wait until nothing is pending and no drain loop is active.
    pub async fn drain(&self) {
        loop {
            if self.status().await.is_idle() {
                return;
            }
            sleep(DRAIN_POLL_INTERVAL).await;
        }
    }

    /// (attempts, max_attempts) of every queued task.
    #[cfg(test)]
    pub(crate) async fn attempts_snapshot(&self) -> Vec<(u32, u32)> {
        let state = self.inner.state.lock().await;
        state
            .tasks
            .iter()
            .map(|t| (t.attempts, t.max_attempts))
            .collect()
    }
}

async fn drain_loop<P: Send + Sync + 'static>(inner: Arc<QueueInner<P>>) {
    debug!(queue = %inner.name, "drain loop started");

    loop {
        let mut task = {
            let mut state = inner.state.lock().await;
            match state.tasks.pop_front() {
                Some(task) => task,
                None => {
                    state.draining = false;
                    debug!(queue = %inner.name, "queue empty, drain loop stopped");
                    return;
                }
            }
        };

        if !task.is_eligible(Instant::now()) {
            inner.state.lock().await.tasks.push_back(task);
            sleep(inner.policy.poll_interval).await;
            continue;
        }

        let disposition = match attempt(&inner, &task).await {
            Ok(()) => Disposition::Delivered,
            Err(err) => {
                let policy = &inner.policy;
                task.fail(err.to_string(), Instant::now(), |n| policy.next_delay(n))
            }
        };

        match disposition {
            Disposition::Delivered => {
                debug!(queue = %inner.name, task = %task.id, retries = task.attempts, "delivered");
                inner.state.lock().await.delivered += 1;
            }
            Disposition::Retry { delay } => {
                warn!(
                    queue = %inner.name,
                    task = %task.id,
                    attempt = task.attempts,
                    max_attempts = task.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = task.last_error.as_deref().unwrap_or_default(),
                    "delivery attempt failed, retry scheduled"
                );
                inner.state.lock().await.tasks.push_back(task);
                if inner.policy.mode == RetryMode::Serial {
                    sleep(delay).await;
                }
            }
            Disposition::Abandoned => {
                let reason = task.last_error.clone().unwrap_or_default();
                error!(
                    queue = %inner.name,
                    task = %task.id,
                    attempts = task.attempts + 1,
                    error = %reason,
                    "delivery abandoned"
                );
                inner.state.lock().await.abandoned += 1;
                report_abandoned(&inner, &task, reason).await;
            }
        }
    }
}

/// Run one attempt on its own task so a panicking sink counts as a failure
/// instead of killing the drain loop with `draining` still set.
async fn attempt<P: Send + Sync + 'static>(
    inner: &QueueInner<P>,
    task: &DeliveryTask<P>,
) -> Result<(), CourierError> {
    let deliverer = Arc::clone(&inner.deliverer);
    let payload = Arc::clone(&task.payload);
    match tokio::spawn(async move { deliverer.deliver(&payload).await }).await {
        Ok(result) => result,
        Err(join_err) => Err(CourierError::Other(format!(
            "delivery attempt panicked: {join_err}"
        ))),
    }
}

/// The abandoned hook runs under the same guard as an attempt.
async fn report_abandoned<P: Send + Sync + 'static>(
    inner: &QueueInner<P>,
    task: &DeliveryTask<P>,
    reason: String,
) {
    let deliverer = Arc::clone(&inner.deliverer);
    let payload = Arc::clone(&task.payload);
    if let Err(join_err) =
        tokio::spawn(async move { deliverer.abandoned(&payload, &reason).await }).await
    {
        error!(queue = %inner.name, task = %task.id, error = %join_err, "abandoned hook panicked");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    /// Fails the first `failures` calls, then succeeds.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        abandoned: AtomicU32,
    }

    impl Flaky {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: AtomicU32::new(0),
                abandoned: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Deliver<u32> for Flaky {
        async fn deliver(&self, _payload: &u32) -> Result<(), CourierError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(CourierError::Other(format!("intentional failure #{n}")));
            }
            Ok(())
        }

        async fn abandoned(&self, _payload: &u32, _error: &str) {
            self.abandoned.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn policy(max_attempts: u32, mode: RetryMode) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            poll_interval: Duration::from_secs(1),
            mode,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn upload_recovers_after_two_failures() {
        let sink = Flaky::new(2);
        let queue = DeliveryQueue::<u32>::new("uploads", policy(3, RetryMode::Serial), sink.clone());

        queue.enqueue(7).await;
        queue.drain().await;

        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        assert_eq!(sink.abandoned.load(Ordering::SeqCst), 0);
        let status = queue.status().await;
        assert_eq!(status.pending, 0);
        assert_eq!(status.delivered, 1);
        assert_eq!(status.abandoned, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn notification_is_abandoned_after_initial_plus_retries() {
        let sink = Flaky::new(u32::MAX);
        let queue = DeliveryQueue::<u32>::new(
            "notifications",
            policy(2, RetryMode::Requeue),
            sink.clone(),
        );

        queue.enqueue(1).await;
        queue.drain().await;

        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        assert_eq!(sink.abandoned.load(Ordering::SeqCst), 1);
        let status = queue.status().await;
        assert!(status.is_idle());
        assert_eq!(status.delivered, 0);
        assert_eq!(status.abandoned, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_never_exceed_ceiling() {
        let sink = Flaky::new(u32::MAX);
        let queue = DeliveryQueue::<u32>::new("uploads", policy(3, RetryMode::Requeue), sink);

        for i in 0..4 {
            queue.enqueue(i).await;
        }

        while !queue.status().await.is_idle() {
            for (attempts, max) in queue.attempts_snapshot().await {
                assert!(attempts <= max, "attempts {attempts} > max {max}");
            }
            sleep(Duration::from_millis(250)).await;
        }
        assert_eq!(queue.status().await.abandoned, 4);
        assert!(queue.attempts_snapshot().await.is_empty());
    }

    /// Tracks how many attempts run at once, and in which order payloads arrive.
    struct Slow {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        order: StdMutex<Vec<u32>>,
    }

    #[async_trait]
    impl Deliver<u32> for Slow {
        async fn deliver(&self, payload: &u32) -> Result<(), CourierError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            sleep(Duration::from_millis(10)).await;
            self.order.lock().unwrap().push(*payload);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_during_drain_does_not_start_second_loop() {
        let sink = Arc::new(Slow {
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            order: StdMutex::new(Vec::new()),
        });
        let queue = DeliveryQueue::<u32>::new("notifications", policy(3, RetryMode::Requeue), sink.clone());

        for i in 0..5 {
            queue.enqueue(i).await;
        }
        sleep(Duration::from_millis(15)).await;
        assert!(queue.status().await.draining);
        for i in 5..10 {
            queue.enqueue(i).await;
        }
        queue.drain().await;

        assert_eq!(sink.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(*sink.order.lock().unwrap(), (0..10).collect::<Vec<_>>());
        assert_eq!(queue.status().await.delivered, 10);
    }

    /// Fails each listed payload once; logs when every attempt happened.
    struct FailOnce {
        start: Instant,
        pending_failures: StdMutex<HashSet<u32>>,
        log: StdMutex<Vec<(u32, Duration)>>,
    }

    impl FailOnce {
        fn new(fail: &[u32]) -> Arc<Self> {
            Arc::new(Self {
                start: Instant::now(),
                pending_failures: StdMutex::new(fail.iter().copied().collect()),
                log: StdMutex::new(Vec::new()),
            })
        }

        fn first_attempt_of(&self, payload: u32) -> Duration {
            self.log
                .lock()
                .unwrap()
                .iter()
                .find(|(p, _)| *p == payload)
                .map(|(_, at)| *at)
                .expect("payload was attempted")
        }
    }

    #[async_trait]
    impl Deliver<u32> for FailOnce {
        async fn deliver(&self, payload: &u32) -> Result<(), CourierError> {
            self.log.lock().unwrap().push((*payload, self.start.elapsed()));
            if self.pending_failures.lock().unwrap().remove(payload) {
                return Err(CourierError::Other("first attempt fails".into()));
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn serial_mode_holds_the_queue_for_the_backoff() {
        let sink = FailOnce::new(&[1]);
        let queue = DeliveryQueue::<u32>::new("uploads", policy(3, RetryMode::Serial), sink.clone());

        queue.enqueue(1).await;
        queue.enqueue(2).await;
        queue.drain().await;

        // first retry waits base * 2^1 = 2s, and task 2 waits with it
        assert!(sink.first_attempt_of(2) >= Duration::from_secs(2));
        assert_eq!(queue.status().await.delivered, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn requeue_mode_lets_other_tasks_through() {
        let sink = FailOnce::new(&[1]);
        let queue = DeliveryQueue::<u32>::new("notifications", policy(3, RetryMode::Requeue), sink.clone());

        queue.enqueue(1).await;
        queue.enqueue(2).await;
        queue.drain().await;

        assert!(sink.first_attempt_of(2) < Duration::from_secs(1));
        let order: Vec<u32> = sink.log.lock().unwrap().iter().map(|(p, _)| *p).collect();
        assert_eq!(order, vec![1, 2, 1]);
        assert_eq!(queue.status().await.delivered, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_returns_only_when_idle() {
        let sink = Flaky::new(1);
        let queue = DeliveryQueue::<u32>::new("uploads", policy(3, RetryMode::Serial), sink);

        let started = Instant::now();
        queue.enqueue(9).await;
        queue.drain().await;

        assert!(queue.status().await.is_idle());
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    struct Panics;

    #[async_trait]
    impl Deliver<u32> for Panics {
        async fn deliver(&self, _payload: &u32) -> Result<(), CourierError> {
            panic!("sink bug");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_sink_counts_as_failed_attempt() {
        let queue = DeliveryQueue::<u32>::new("uploads", policy(1, RetryMode::Requeue), Arc::new(Panics));

        queue.enqueue(3).await;
        queue.drain().await;

        let status = queue.status().await;
        assert!(status.is_idle());
        assert_eq!(status.abandoned, 1);
    }

    /// Always fails, and its abandoned hook panics too.
    struct HookPanics;

    #[async_trait]
    impl Deliver<u32> for HookPanics {
        async fn deliver(&self, _payload: &u32) -> Result<(), CourierError> {
            Err(CourierError::Other("down".into()))
        }

        async fn abandoned(&self, _payload: &u32, _error: &str) {
            panic!("hook bug");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_abandoned_hook_keeps_loop_alive() {
        let queue =
            DeliveryQueue::<u32>::new("notifications", policy(0, RetryMode::Requeue), Arc::new(HookPanics));

        queue.enqueue(1).await;
        queue.enqueue(2).await;
        queue.drain().await;

        let status = queue.status().await;
        assert!(status.is_idle());
        assert_eq!(status.abandoned, 2);
    }

    #[tokio::test]
    async fn status_of_fresh_queue_is_idle() {
        let queue = DeliveryQueue::<u32>::new("uploads", RetryPolicy::uploads(), Flaky::new(0));
        assert_eq!(queue.status().await, QueueStatus::default());
        queue.drain().await;
    }
}
