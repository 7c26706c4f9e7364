//! Single-slot cursor update channel.
//!
//! Cursor updates are state, not a stream: only the newest one matters. A push overwrites whatever
//! the consumer has not picked up yet and hands the displaced update back so its resources can be
//! retired. Pushes never block and never overload. After [`CursorChannel::teardown`] the channel
//! is closed and hands every new update straight back.

use std::fmt;

use crate::queue::Retire;
use crate::sync::{lock, Mutex};

struct Slot<T> {
    pending: Option<T>,
    pushed: u64,
    coalesced: u64,
    closed: bool,
}

pub struct CursorChannel<T> {
    slot: Mutex<Slot<T>>,
}

impl<T> CursorChannel<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                pending: None,
                pushed: 0,
                coalesced: 0,
                closed: false,
            }),
        }
    }

    /// Publish `update`, returning the unread update it replaced (if any).
    ///
    /// On a closed channel `update` itself is returned, since no consumer will ever see it.
    #[must_use = "a displaced cursor update still owns resources that must be retired"]
    pub fn push(&self, update: T) -> Option<T> {
        let mut slot = lock(&self.slot);
        if slot.closed {
            return Some(update);
        }
        slot.pushed += 1;
        let displaced = slot.pending.replace(update);
        if displaced.is_some() {
            slot.coalesced += 1;
        }
        displaced
    }

    /// Take the pending update. Returns `None` when nothing changed since the last pull.
    pub fn pull(&self) -> Option<T> {
        lock(&self.slot).pending.take()
    }

    pub fn has_pending(&self) -> bool {
        lock(&self.slot).pending.is_some()
    }

    pub fn notify_requested(&self) -> bool {
        true
    }

    /// Total pushes since construction.
    pub fn pushed(&self) -> u64 {
        lock(&self.slot).pushed
    }

    /// Pushes that overwrote an unread update.
    pub fn coalesced(&self) -> u64 {
        lock(&self.slot).coalesced
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.slot).closed
    }

    /// Close the channel and retire the pending update, if any. Returns how many were retired
    /// (0 or 1).
    pub fn teardown(&self) -> usize
    where
        T: Retire,
    {
        let pending = {
            let mut slot = lock(&self.slot);
            slot.closed = true;
            slot.pending.take()
        };
        match pending {
            Some(update) => {
                update.retire();
                1
            }
            None => 0,
        }
    }
}

impl<T> Default for CursorChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for CursorChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = lock(&self.slot);
        f.debug_struct("CursorChannel")
            .field("pending", &slot.pending.is_some())
            .field("pushed", &slot.pushed)
            .field("coalesced", &slot.coalesced)
            .field("closed", &slot.closed)
            .finish()
    }
}
