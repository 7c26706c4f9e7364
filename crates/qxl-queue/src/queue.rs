//! Fixed-capacity FIFO command ring.
//!
//! Design:
//! - One producer pushes command handles, one consumer pulls them; the two may live on different
//!   threads.
//! - `head` (consumer) and `tail` (producer) are monotonically increasing `u64` counters. Storage is
//!   addressed with `cursor % capacity`, so occupancy is always `tail - head` and never needs
//!   re-normalizing.
//! - Occupancy check, slot access and cursor update happen under one lock, so no observer can see
//!   `tail - head` outside `0..=capacity`.
//! - A push into a full ring waits according to a [`RetryPolicy`] and then hands the command back
//!   as [`PushError::Overloaded`]. Nothing is dropped silently.
//! - [`CommandQueue::teardown`] closes the ring and drains it under the same lock. Every later push
//!   is handed back as [`PushError::Closed`], so no command can slip in behind the drain.
//! - The ring stores handles, not payload copies; the handle's owner decides what a command holds.

use std::fmt;

use crate::backoff::{Delay, RetryPolicy, ThreadSleep};
use crate::error::{QueueError, Result};
use crate::sync::{lock, Mutex};

/// Returned by a push that did not enqueue the command.
///
/// The rejected command is always handed back so the caller can decide whether to drop it, retry
/// it later, or release its resources.
#[derive(Debug, PartialEq, Eq)]
pub enum PushError<T> {
    /// No room within the retry budget.
    Overloaded(T),
    /// The queue was torn down and accepts nothing anymore.
    Closed(T),
}

impl<T> PushError<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Overloaded(cmd) | Self::Closed(cmd) => cmd,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overloaded(_) => f.write_str("command queue overloaded"),
            Self::Closed(_) => f.write_str("command queue closed"),
        }
    }
}

/// Forced retirement of a command that will never be executed.
pub trait Retire {
    fn retire(self);
}

struct Ring<T> {
    slots: Box<[Option<T>]>,
    head: u64,
    tail: u64,
    closed: bool,
}

impl<T> Ring<T> {
    fn capacity(&self) -> u64 {
        self.slots.len() as u64
    }

    fn len(&self) -> u64 {
        self.tail - self.head
    }

    fn index(&self, cursor: u64) -> usize {
        (cursor % self.capacity()) as usize
    }

    fn check_occupancy(&self) {
        debug_assert!(self.head <= self.tail);
        debug_assert!(self.len() <= self.capacity());
    }

    fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len() as usize);
        while self.head < self.tail {
            let idx = self.index(self.head);
            if let Some(cmd) = self.slots[idx].take() {
                out.push(cmd);
            }
            self.head += 1;
        }
        self.check_occupancy();
        out
    }
}

pub struct CommandQueue<T> {
    ring: Mutex<Ring<T>>,
    capacity: usize,
    policy: RetryPolicy,
    delay: Box<dyn Delay>,
}

impl<T> CommandQueue<T> {
    /// Queue with the default [`RetryPolicy`], waiting on the real clock.
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_policy(capacity, RetryPolicy::default())
    }

    pub fn with_policy(capacity: usize, policy: RetryPolicy) -> Result<Self> {
        Self::with_delay(capacity, policy, ThreadSleep)
    }

    pub fn with_delay<D>(capacity: usize, policy: RetryPolicy, delay: D) -> Result<Self>
    where
        D: Delay + 'static,
    {
        if capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }
        let slots: Box<[Option<T>]> = (0..capacity).map(|_| None).collect();
        Ok(Self {
            ring: Mutex::new(Ring {
                slots,
                head: 0,
                tail: 0,
                closed: false,
            }),
            capacity,
            policy,
            delay: Box::new(delay),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        lock(&self.ring).len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.ring).closed
    }

    /// Snapshot of the `(head, tail)` cursors.
    pub fn cursors(&self) -> (u64, u64) {
        let ring = lock(&self.ring);
        (ring.head, ring.tail)
    }

    /// Push without waiting.
    pub fn try_push(&self, cmd: T) -> std::result::Result<(), PushError<T>> {
        let mut ring = lock(&self.ring);
        if ring.closed {
            return Err(PushError::Closed(cmd));
        }
        ring.check_occupancy();
        if ring.len() == ring.capacity() {
            return Err(PushError::Overloaded(cmd));
        }

        let idx = ring.index(ring.tail);
        debug_assert!(ring.slots[idx].is_none(), "tail slot still occupied");
        ring.slots[idx] = Some(cmd);
        ring.tail += 1;
        ring.check_occupancy();
        Ok(())
    }

    /// Push, waiting out a full queue for at most `retry_limit` delays.
    ///
    /// The lock is not held while waiting, so the consumer can drain in the meantime. A closed
    /// queue rejects immediately without waiting.
    pub fn push(&self, cmd: T) -> std::result::Result<(), PushError<T>> {
        let mut cmd = cmd;
        let mut retries = 0u32;
        loop {
            match self.try_push(cmd) {
                Ok(()) => return Ok(()),
                Err(PushError::Closed(rejected)) => {
                    tracing::debug!("push into closed command queue");
                    return Err(PushError::Closed(rejected));
                }
                Err(PushError::Overloaded(rejected)) => {
                    if retries >= self.policy.retry_limit {
                        tracing::warn!(
                            capacity = self.capacity,
                            retries,
                            "command queue overload"
                        );
                        return Err(PushError::Overloaded(rejected));
                    }
                    cmd = rejected;
                    retries += 1;
                    self.delay.delay(self.policy.retry_delay);
                }
            }
        }
    }

    /// Take the oldest command, if any. Never blocks.
    ///
    /// After this returns `Some`, the queue holds no reference to the command.
    pub fn pull(&self) -> Option<T> {
        let mut ring = lock(&self.ring);
        ring.check_occupancy();
        if ring.head == ring.tail {
            return None;
        }

        let idx = ring.index(ring.head);
        let cmd = ring.slots[idx].take();
        debug_assert!(cmd.is_some(), "head slot empty while queue is non-empty");
        ring.head += 1;
        ring.check_occupancy();
        cmd
    }

    /// The consumer always wants to be woken for new commands.
    pub fn notify_requested(&self) -> bool {
        true
    }

    /// Remove every queued command in FIFO order, leaving the queue empty and open.
    pub fn drain(&self) -> Vec<T> {
        lock(&self.ring).drain()
    }

    /// Close the queue, then force-retire every queued command in push order.
    ///
    /// Closing and draining happen under one lock, so a concurrent push either lands before the
    /// drain (and is retired here) or is handed back as [`PushError::Closed`]. Commands are retired
    /// after the lock is dropped, so release callbacks may touch the queue. Returns the number of
    /// commands retired.
    pub fn teardown(&self) -> usize
    where
        T: Retire,
    {
        let pending = {
            let mut ring = lock(&self.ring);
            ring.closed = true;
            ring.drain()
        };
        let count = pending.len();
        for cmd in pending {
            cmd.retire();
        }
        if count > 0 {
            tracing::debug!(count, "force-retired queued commands");
        }
        count
    }
}

impl<T> fmt::Debug for CommandQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (head, tail) = self.cursors();
        f.debug_struct("CommandQueue")
            .field("capacity", &self.capacity)
            .field("head", &head)
            .field("tail", &tail)
            .field("policy", &self.policy)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;

    use crate::backoff::NoDelay;

    #[derive(Debug)]
    struct Tracked {
        id: u32,
        log: Arc<StdMutex<Vec<u32>>>,
    }

    impl Retire for Tracked {
        fn retire(self) {
            self.log.lock().unwrap().push(self.id);
        }
    }

    fn queue(capacity: usize, retry_limit: u32) -> CommandQueue<u32> {
        CommandQueue::with_delay(capacity, RetryPolicy::new(retry_limit, Duration::ZERO), NoDelay)
            .unwrap()
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = CommandQueue::<u32>::new(0).unwrap_err();
        assert_eq!(err, QueueError::ZeroCapacity);
    }

    #[test]
    fn pull_on_empty_returns_none() {
        let q = queue(4, 0);
        assert_eq!(q.pull(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn commands_come_out_in_push_order() {
        let q = queue(8, 0);
        for i in 0..5 {
            q.push(i).unwrap();
        }
        let out: Vec<u32> = std::iter::from_fn(|| q.pull()).collect();
        assert_eq!(out, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn full_queue_reports_overload_and_returns_command() {
        let q = queue(2, 0);
        q.push(1).unwrap();
        q.push(2).unwrap();

        assert_eq!(q.push(3), Err(PushError::Overloaded(3)));
        assert_eq!(q.len(), 2);
        assert!(q.is_full());

        assert_eq!(q.pull(), Some(1));
        assert_eq!(q.pull(), Some(2));
        assert_eq!(q.pull(), None);
    }

    #[test]
    fn push_waits_exactly_retry_limit_times_before_overload() {
        let waits = Arc::new(AtomicU32::new(0));
        let counter = waits.clone();
        let q = CommandQueue::with_delay(
            1,
            RetryPolicy::new(3, Duration::from_micros(100)),
            move |d: Duration| {
                assert_eq!(d, Duration::from_micros(100));
                counter.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();

        q.push(0u32).unwrap();
        assert_eq!(waits.load(Ordering::SeqCst), 0);

        assert_eq!(q.push(1), Err(PushError::Overloaded(1)));
        assert_eq!(waits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn push_succeeds_when_consumer_drains_during_backoff() {
        let q: Arc<StdMutex<Option<Arc<CommandQueue<u32>>>>> = Arc::new(StdMutex::new(None));
        let handle = q.clone();
        let queue = Arc::new(
            CommandQueue::with_delay(
                1,
                RetryPolicy::new(5, Duration::from_micros(1)),
                move |_d: Duration| {
                    // Simulate the consumer catching up while the producer waits.
                    if let Some(queue) = handle.lock().unwrap().as_ref() {
                        queue.pull();
                    }
                },
            )
            .unwrap(),
        );
        *q.lock().unwrap() = Some(queue.clone());

        queue.push(10).unwrap();
        queue.push(11).unwrap();
        assert_eq!(queue.pull(), Some(11));

        // Break the Arc cycle.
        q.lock().unwrap().take();
    }

    #[test]
    fn cursors_keep_increasing_across_wraparound() {
        let q = queue(3, 0);
        for round in 0..10u32 {
            q.push(round * 2).unwrap();
            q.push(round * 2 + 1).unwrap();
            assert_eq!(q.pull(), Some(round * 2));
            assert_eq!(q.pull(), Some(round * 2 + 1));
        }
        let (head, tail) = q.cursors();
        assert_eq!((head, tail), (20, 20));
        assert!(q.is_empty());
    }

    #[test]
    fn fill_then_drain_capacity_loses_nothing() {
        let q = queue(16, 0);
        // Offset the cursors so the run straddles the storage boundary.
        for i in 0..7 {
            q.push(i).unwrap();
            q.pull();
        }
        for i in 0..16 {
            q.push(100 + i).unwrap();
        }
        assert_eq!(q.push(999), Err(PushError::Overloaded(999)));
        let out: Vec<u32> = std::iter::from_fn(|| q.pull()).collect();
        assert_eq!(out, (100..116).collect::<Vec<_>>());
    }

    #[test]
    fn notify_is_always_requested() {
        assert!(queue(1, 0).notify_requested());
    }

    #[test]
    fn teardown_retires_in_push_order_and_empties() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let q = CommandQueue::with_delay(4, RetryPolicy::fail_fast(), NoDelay).unwrap();
        for id in [3, 1, 2] {
            q.push(Tracked {
                id,
                log: log.clone(),
            })
            .unwrap();
        }

        assert_eq!(q.teardown(), 3);
        assert_eq!(*log.lock().unwrap(), vec![3, 1, 2]);
        assert_eq!(q.len(), 0);
        assert!(q.pull().is_none());
    }

    #[test]
    fn teardown_skips_already_pulled_commands() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let q = CommandQueue::with_delay(4, RetryPolicy::fail_fast(), NoDelay).unwrap();
        for id in 0..3 {
            q.push(Tracked {
                id,
                log: log.clone(),
            })
            .unwrap();
        }
        let first = q.pull().unwrap();
        assert_eq!(q.teardown(), 2);
        assert_eq!(*log.lock().unwrap(), vec![1, 2]);

        first.retire();
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 0]);
    }

    #[test]
    fn push_after_teardown_is_handed_back_without_waiting() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let waits = Arc::new(AtomicU32::new(0));
        let counter = waits.clone();
        let q = CommandQueue::with_delay(
            1,
            RetryPolicy::new(5, Duration::ZERO),
            move |_d: Duration| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();
        q.push(Tracked {
            id: 7,
            log: log.clone(),
        })
        .unwrap();
        assert!(!q.is_closed());

        assert_eq!(q.teardown(), 1);
        assert!(q.is_closed());

        let late = Tracked {
            id: 8,
            log: log.clone(),
        };
        match q.push(late) {
            Err(PushError::Closed(rejected)) => assert_eq!(rejected.id, 8),
            other => panic!("expected closed queue, got {other:?}"),
        }
        assert_eq!(waits.load(Ordering::SeqCst), 0);
        assert!(q.is_empty());
        assert!(q.pull().is_none());
        assert_eq!(*log.lock().unwrap(), vec![7]);
    }

    #[test]
    fn drain_leaves_the_queue_open() {
        let q = queue(2, 0);
        q.push(1).unwrap();
        assert_eq!(q.drain(), vec![1]);
        assert!(!q.is_closed());
        q.push(2).unwrap();
        assert_eq!(q.pull(), Some(2));
    }

    #[test]
    fn teardown_closes_the_queue_for_retired_command_types() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let q = CommandQueue::with_delay(4, RetryPolicy::fail_fast(), NoDelay).unwrap();
        q.push(Tracked {
            id: 1,
            log: log.clone(),
        })
        .unwrap();
        assert_eq!(q.teardown(), 1);

        let late = q
            .push(Tracked {
                id: 2,
                log: log.clone(),
            })
            .unwrap_err();
        assert!(late.is_closed());
        assert_eq!(late.to_string(), "command queue closed");

        // The caller owns the rejected command and releases it itself.
        late.into_inner().retire();
        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
        assert_eq!(q.teardown(), 0);
    }
}
