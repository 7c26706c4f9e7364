//! Bounded command transport between a display producer and a single polling consumer.
//!
//! The pieces here are deliberately independent of what a command *is*:
//! - [`CommandQueue`]: fixed-capacity FIFO ring with bounded back-pressure on push and a
//!   non-blocking pull.
//! - [`CursorChannel`]: single-slot, last-write-wins variant of the same push/pull shape.
//! - [`ReleaseToken`]: the handle that hands a command's backing resources back to their owner,
//!   exactly once.
//! - [`RetryPolicy`] / [`Delay`]: the back-pressure budget, with an injectable wait so tests never
//!   sleep.
#![forbid(unsafe_code)]

pub mod backoff;
pub mod cursor;
mod error;
pub mod queue;
pub mod release;
pub mod sync;

pub use backoff::{Delay, NoDelay, RetryPolicy, ThreadSleep};
pub use cursor::CursorChannel;
pub use error::{QueueError, Result};
pub use queue::{CommandQueue, PushError, Retire};
pub use release::{GroupId, ReleaseId, ReleaseIdAllocator, ReleaseInfo, ReleaseToken, MEMSLOT_GROUP};
