//! Release handles attached to every command.
//!
//! A producer allocates a command record, attaches a [`ReleaseToken`] describing how to reclaim
//! it, and hands the record to the queue. Whichever side retires the record last (the consumer
//! after execution, or session teardown for commands the consumer never saw) fires the token.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a command record, as echoed back by the consumer on release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReleaseId(pub u64);

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Resource group (memslot group) that a command's memory belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId(pub u32);

/// The only resource group this bridge registers with the consumer.
pub const MEMSLOT_GROUP: GroupId = GroupId(0);

/// What the consumer hands back when it is done with a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReleaseInfo {
    pub id: ReleaseId,
    pub group_id: GroupId,
}

type ReleaseFn = Box<dyn FnOnce(ReleaseId) + Send + 'static>;

/// Ownership handle carrying a typed release callback.
///
/// [`ReleaseToken::release`] consumes the token, so a single token can fire at most once. Dropping
/// a token that never fired does not run the callback; it is logged because it means a command's
/// resources were leaked rather than reclaimed.
pub struct ReleaseToken {
    info: ReleaseInfo,
    release: Option<ReleaseFn>,
}

impl ReleaseToken {
    pub fn new<F>(id: ReleaseId, group_id: GroupId, release: F) -> Self
    where
        F: FnOnce(ReleaseId) + Send + 'static,
    {
        Self {
            info: ReleaseInfo { id, group_id },
            release: Some(Box::new(release)),
        }
    }

    pub fn id(&self) -> ReleaseId {
        self.info.id
    }

    pub fn group_id(&self) -> GroupId {
        self.info.group_id
    }

    pub fn info(&self) -> ReleaseInfo {
        self.info
    }

    /// Fire the release callback.
    pub fn release(mut self) {
        if let Some(release) = self.release.take() {
            release(self.info.id);
        }
    }
}

impl Drop for ReleaseToken {
    fn drop(&mut self) {
        if self.release.is_some() {
            tracing::warn!(
                release_id = self.info.id.0,
                group_id = self.info.group_id.0,
                "release token dropped without being released"
            );
        }
    }
}

impl fmt::Debug for ReleaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseToken")
            .field("info", &self.info)
            .field("armed", &self.release.is_some())
            .finish()
    }
}

/// Monotonic source of [`ReleaseId`]s for one session.
#[derive(Debug, Default)]
pub struct ReleaseIdAllocator {
    next: AtomicU64,
}

impl ReleaseIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self) -> ReleaseId {
        ReleaseId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}
