//! Display-side QXL bridge.
//!
//! A frame producer pushes display [`Command`]s into a bounded queue; an external rendering worker
//! polls them through the [`QxlInterface`] implemented by [`WorkerAdapter`] and hands each one back
//! via `release_resource` once executed, which fires the command's release token.
//!
//! [`SessionSlot`] owns the "one active session" policy and [`Session`] ties the queue, the cursor
//! slot and the adapter to a single init/teardown lifecycle.
#![forbid(unsafe_code)]

pub mod adapter;
pub mod command;
pub mod config;
pub mod cursor;
mod error;
pub mod session;

pub use adapter::{
    AttachOutcome, InitInfo, MemSlot, QxlInterface, TeardownCounts, WorkerAdapter, WorkerId,
};
pub use command::{Command, CommandExt, CommandHeader, CommandType};
pub use config::{BridgeConfig, ConfigError};
pub use cursor::{CursorCommand, CursorCommandExt, CursorKind, CursorShape, CursorTracker, Point};
pub use error::{BridgeError, Result};
pub use session::{Producer, Session, SessionSlot};

pub use qxl_queue::{
    GroupId, PushError, ReleaseId, ReleaseInfo, ReleaseToken, Retire, RetryPolicy, MEMSLOT_GROUP,
};
