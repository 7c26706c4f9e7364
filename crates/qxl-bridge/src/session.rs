//! Session lifecycle: one queue, one cursor slot, one worker adapter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use qxl_queue::{
    CommandQueue, CursorChannel, Delay, PushError, ReleaseId, ReleaseIdAllocator, ReleaseToken,
    Retire, ThreadSleep, MEMSLOT_GROUP,
};

use crate::adapter::{TeardownCounts, WorkerAdapter};
use crate::command::{Command, CommandType};
use crate::config::BridgeConfig;
use crate::cursor::{CursorCommand, CursorKind, CursorTracker, Point};
use crate::error::{BridgeError, Result};

/// Owner of the "at most one live session" rule.
///
/// Opening a second session from the same slot while the first is alive fails; dropping (or
/// tearing down) the live session frees the slot. Independent slots do not interact.
#[derive(Debug, Default)]
pub struct SessionSlot {
    active: Arc<AtomicBool>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn open(&self, config: BridgeConfig) -> Result<Session> {
        self.open_with_delay(config, ThreadSleep)
    }

    /// Like [`SessionSlot::open`], with a custom wait used for push back-pressure.
    pub fn open_with_delay<D>(&self, config: BridgeConfig, delay: D) -> Result<Session>
    where
        D: Delay + 'static,
    {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(BridgeError::SessionActive);
        }

        let queue = match CommandQueue::with_delay(config.capacity, config.retry, delay) {
            Ok(queue) => Arc::new(queue),
            Err(err) => {
                self.active.store(false, Ordering::Release);
                return Err(err.into());
            }
        };
        let cursor = Arc::new(CursorChannel::new());
        let adapter = Arc::new(WorkerAdapter::new(queue.clone(), cursor.clone()));
        let ids = Arc::new(ReleaseIdAllocator::new());

        tracing::debug!(
            capacity = config.capacity,
            retry_limit = config.retry.retry_limit,
            retry_delay_us = config.retry.retry_delay.as_micros() as u64,
            "qxl session opened"
        );

        Ok(Session {
            config,
            producer: Producer { queue, ids },
            cursor,
            cursor_tracker: CursorTracker::new(),
            adapter,
            active: self.active.clone(),
            closed: false,
        })
    }
}

/// Cloneable push handle for the producer context.
#[derive(Clone)]
pub struct Producer {
    queue: Arc<CommandQueue<Command>>,
    ids: Arc<ReleaseIdAllocator>,
}

impl Producer {
    /// Allocate a command record in the session's resource group.
    ///
    /// Once the command is accepted by [`Producer::push`], `on_release` runs exactly once: when the
    /// worker releases it, or when the session tears down with it still queued. A rejected command
    /// is handed back and its release is up to the caller.
    pub fn command<F>(&self, ty: CommandType, payload: impl Into<Arc<[u8]>>, on_release: F) -> Command
    where
        F: FnOnce(ReleaseId) + Send + 'static,
    {
        let token = ReleaseToken::new(self.ids.allocate(), MEMSLOT_GROUP, on_release);
        Command::new(ty, payload, token)
    }

    /// Enqueue `cmd`, waiting out a full queue within the configured retry budget.
    ///
    /// On overload, or once the session has been torn down, the command is handed back untouched.
    pub fn push(&self, cmd: Command) -> std::result::Result<(), PushError<Command>> {
        self.queue.push(cmd)
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer").field("queue", &self.queue).finish()
    }
}

pub struct Session {
    config: BridgeConfig,
    producer: Producer,
    cursor: Arc<CursorChannel<CursorCommand>>,
    cursor_tracker: CursorTracker,
    adapter: Arc<WorkerAdapter>,
    active: Arc<AtomicBool>,
    closed: bool,
}

impl Session {
    pub fn config(&self) -> BridgeConfig {
        self.config
    }

    pub fn producer(&self) -> Producer {
        self.producer.clone()
    }

    /// The worker-facing interface, shareable with the worker's thread.
    pub fn adapter(&self) -> Arc<WorkerAdapter> {
        self.adapter.clone()
    }

    pub fn new_command<F>(
        &self,
        ty: CommandType,
        payload: impl Into<Arc<[u8]>>,
        on_release: F,
    ) -> Command
    where
        F: FnOnce(ReleaseId) + Send + 'static,
    {
        self.producer.command(ty, payload, on_release)
    }

    pub fn push(&self, cmd: Command) -> std::result::Result<(), PushError<Command>> {
        self.producer.push(cmd)
    }

    pub fn new_cursor_command<F>(&self, kind: CursorKind, on_release: F) -> CursorCommand
    where
        F: FnOnce(ReleaseId) + Send + 'static,
    {
        let token = ReleaseToken::new(self.producer.ids.allocate(), MEMSLOT_GROUP, on_release);
        CursorCommand::new(kind, token)
    }

    /// Publish a cursor update. An unread previous update is released immediately since the worker
    /// will never see it; so is `cmd` itself after teardown.
    pub fn push_cursor(&self, cmd: CursorCommand) {
        if let Some(displaced) = self.cursor.push(cmd) {
            tracing::trace!(
                release_id = displaced.release_info().id.0,
                "cursor update not delivered"
            );
            displaced.retire();
        }
    }

    /// Translate a pointer position into a cursor update, if it changed.
    ///
    /// Returns `true` when an update was published.
    pub fn update_cursor<F>(&mut self, position: Point, on_release: F) -> bool
    where
        F: FnOnce(ReleaseId) + Send + 'static,
    {
        match self.cursor_tracker.update(position) {
            Some(kind) => {
                let cmd = self.new_cursor_command(kind, on_release);
                self.push_cursor(cmd);
                true
            }
            None => false,
        }
    }

    /// Close the queue, force-release every command the worker never pulled and free the session
    /// slot.
    ///
    /// Pushes through any [`Producer`] clone are rejected from here on. Commands the worker already
    /// pulled are still released by the worker. Idempotent; also run on drop.
    pub fn teardown(&mut self) -> TeardownCounts {
        if self.closed {
            return TeardownCounts::default();
        }
        self.closed = true;

        let counts = self.adapter.teardown();
        self.cursor_tracker.reset();
        if counts.force_released() > 0 || counts.in_flight > 0 {
            tracing::warn!(
                queued = counts.queued,
                in_flight = counts.in_flight,
                cursor = counts.cursor,
                "qxl session torn down with outstanding commands"
            );
        }
        self.active.store(false, Ordering::Release);
        counts
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("adapter", &self.adapter)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
