//! Synchronization primitives shared by the queue, the cursor slot and the bridge built on them.
//!
//! Under `--features loom` this crate's own unit tests run against loom's model-checked mutex
//! instead of std's. Dependents always see std's.

#[cfg(all(feature = "loom", test))]
pub use loom::sync::{Mutex, MutexGuard};
#[cfg(not(all(feature = "loom", test)))]
pub use std::sync::{Mutex, MutexGuard};

/// Lock `mutex`, recovering the guard if a previous holder panicked.
///
/// A panicking release callback must not wedge the producer/consumer pair; the protected state is
/// only mutated through short critical sections that leave it consistent.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}
