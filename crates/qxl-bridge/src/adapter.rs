//! Worker-facing side of the bridge.
//!
//! The external rendering worker drives everything from its own thread by polling: it asks for the
//! next command, executes it, and later reports the command as released. [`QxlInterface`] is that
//! contract; [`WorkerAdapter`] implements it on top of the session's command queue and cursor slot.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use qxl_queue::sync::lock;
use qxl_queue::{
    CommandQueue, CursorChannel, GroupId, ReleaseId, ReleaseInfo, Retire, MEMSLOT_GROUP,
};

use crate::command::{Command, CommandExt};
use crate::cursor::{CursorCommand, CursorCommandExt};

pub const NUM_MEMSLOTS: u32 = 1;
pub const NUM_MEMSLOTS_GROUPS: u32 = 1;
pub const MEMSLOT_ID_BITS: u8 = 1;
pub const MEMSLOT_GEN_BITS: u8 = 1;
pub const NUM_SURFACES: u32 = 1024;

/// Identity of the worker driving the interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// The worker is now the session's consumer.
    Attached,
    /// The same worker was already attached; nothing changed.
    AlreadyAttached,
    /// A different worker is attached; it stays in place.
    Rejected,
}

/// Memory slot registered with the worker on attach (`QXLDevMemSlot`).
///
/// Commands reference host memory directly, so the single slot spans the whole address space with
/// no translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemSlot {
    pub slot_group_id: GroupId,
    pub slot_id: u32,
    pub generation: u32,
    pub virt_start: u64,
    pub virt_end: u64,
    pub addr_delta: u64,
    pub qxl_ram_size: u32,
}

impl MemSlot {
    pub const fn identity() -> Self {
        Self {
            slot_group_id: MEMSLOT_GROUP,
            slot_id: 0,
            generation: 0,
            virt_start: 0,
            virt_end: u64::MAX,
            addr_delta: 0,
            qxl_ram_size: u32::MAX,
        }
    }
}

/// Device parameters reported to the worker (`QXLDevInitInfo`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitInfo {
    pub num_memslots: u32,
    pub num_memslots_groups: u32,
    pub memslot_id_bits: u8,
    pub memslot_gen_bits: u8,
    pub n_surfaces: u32,
}

impl Default for InitInfo {
    fn default() -> Self {
        Self {
            num_memslots: NUM_MEMSLOTS,
            num_memslots_groups: NUM_MEMSLOTS_GROUPS,
            memslot_id_bits: MEMSLOT_ID_BITS,
            memslot_gen_bits: MEMSLOT_GEN_BITS,
            n_surfaces: NUM_SURFACES,
        }
    }
}

/// Polling contract between the bridge and the external rendering worker.
///
/// Methods with default bodies are extension points the bridge does not act on yet
/// (compression tuning, update notification, resource flushing).
pub trait QxlInterface: Send + Sync {
    fn attach_worker(&self, worker: WorkerId) -> AttachOutcome;

    fn set_compression_level(&self, _level: i32) {}

    fn set_mm_time(&self, mm_time: u32);

    fn get_init_info(&self) -> InitInfo;

    /// Next display command, or `None` when the queue is empty. Never blocks.
    fn get_command(&self) -> Option<CommandExt>;

    /// Whether the worker should keep waking up for new commands.
    fn req_cmd_notification(&self) -> bool;

    /// Hand a command's resources back once the worker is done with it.
    ///
    /// # Panics
    ///
    /// Releasing a resource from a foreign group, one that was never handed out, or one that was
    /// already released is a contract violation and panics.
    fn release_resource(&self, info: ReleaseInfo);

    fn get_cursor_command(&self) -> Option<CursorCommandExt>;

    fn req_cursor_notification(&self) -> bool;

    fn notify_update(&self, _update_id: u32) {}

    /// Returns the number of resources released by the flush.
    fn flush_resources(&self) -> u32 {
        0
    }
}

/// Commands handed out to the worker and not yet released.
enum InFlight {
    Command(Command),
    Cursor(CursorCommand),
}

impl InFlight {
    fn release_info(&self) -> ReleaseInfo {
        match self {
            Self::Command(cmd) => cmd.release_info(),
            Self::Cursor(cmd) => cmd.release_info(),
        }
    }
}

impl Retire for InFlight {
    fn retire(self) {
        match self {
            Self::Command(cmd) => cmd.retire(),
            Self::Cursor(cmd) => cmd.retire(),
        }
    }
}

/// What [`WorkerAdapter::teardown`] found outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TeardownCounts {
    /// Commands still queued (never seen by the worker), force-released.
    pub queued: usize,
    /// Pending cursor update, if any, force-released.
    pub cursor: usize,
    /// Commands the worker pulled and has not released yet. These are left to the worker.
    pub in_flight: usize,
}

impl TeardownCounts {
    /// Records the teardown itself released.
    pub fn force_released(&self) -> usize {
        self.queued + self.cursor
    }
}

pub struct WorkerAdapter {
    queue: Arc<CommandQueue<Command>>,
    cursor: Arc<CursorChannel<CursorCommand>>,
    worker: Mutex<Option<WorkerId>>,
    memslots: Mutex<Vec<MemSlot>>,
    in_flight: Mutex<BTreeMap<ReleaseId, InFlight>>,
    mm_time: AtomicU32,
}

impl WorkerAdapter {
    pub fn new(
        queue: Arc<CommandQueue<Command>>,
        cursor: Arc<CursorChannel<CursorCommand>>,
    ) -> Self {
        Self {
            queue,
            cursor,
            worker: Mutex::new(None),
            memslots: Mutex::new(Vec::new()),
            in_flight: Mutex::new(BTreeMap::new()),
            mm_time: AtomicU32::new(0),
        }
    }

    pub fn attached_worker(&self) -> Option<WorkerId> {
        *lock(&self.worker)
    }

    pub fn memslots(&self) -> Vec<MemSlot> {
        lock(&self.memslots).clone()
    }

    /// Last multimedia time reported by the worker.
    pub fn mm_time(&self) -> u32 {
        self.mm_time.load(Ordering::Relaxed)
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Close the queue and the cursor slot and force-release what the worker never got to.
    ///
    /// Queued commands are released in push order, then the pending cursor update. Commands the
    /// worker already pulled stay in flight: the worker still owns them and releases them through
    /// [`QxlInterface::release_resource`] once it is done, even after teardown. The worker is
    /// detached afterwards.
    pub fn teardown(&self) -> TeardownCounts {
        let queued = self.queue.teardown();
        let cursor = self.cursor.teardown();
        let in_flight = self.in_flight();
        if in_flight > 0 {
            tracing::debug!(in_flight, "leaving pulled commands to the worker");
        }

        *lock(&self.worker) = None;
        lock(&self.memslots).clear();

        TeardownCounts {
            queued,
            cursor,
            in_flight,
        }
    }
}

fn track(table: &mut BTreeMap<ReleaseId, InFlight>, record: InFlight) {
    let info = record.release_info();
    if table.insert(info.id, record).is_some() {
        panic!("release id {} handed to the worker twice", info.id);
    }
}

impl QxlInterface for WorkerAdapter {
    fn attach_worker(&self, worker: WorkerId) -> AttachOutcome {
        let mut attached = lock(&self.worker);
        match *attached {
            Some(current) if current == worker => {
                tracing::warn!(worker = worker.0, "superfluous attach_worker ignored");
                AttachOutcome::AlreadyAttached
            }
            Some(current) => {
                tracing::warn!(
                    worker = worker.0,
                    current = current.0,
                    "superfluous attach_worker with different worker ignored"
                );
                AttachOutcome::Rejected
            }
            None => {
                lock(&self.memslots).push(MemSlot::identity());
                *attached = Some(worker);
                tracing::debug!(worker = worker.0, "worker attached");
                AttachOutcome::Attached
            }
        }
    }

    fn set_mm_time(&self, mm_time: u32) {
        self.mm_time.store(mm_time, Ordering::Relaxed);
    }

    fn get_init_info(&self) -> InitInfo {
        InitInfo::default()
    }

    fn get_command(&self) -> Option<CommandExt> {
        // Held across the pull so a command is never outside both the queue and the table.
        let mut in_flight = lock(&self.in_flight);
        let cmd = self.queue.pull()?;
        let ext = cmd.ext();
        track(&mut in_flight, InFlight::Command(cmd));
        Some(ext)
    }

    fn req_cmd_notification(&self) -> bool {
        self.queue.notify_requested()
    }

    fn release_resource(&self, info: ReleaseInfo) {
        assert_eq!(
            info.group_id, MEMSLOT_GROUP,
            "release_resource for unsupported resource group"
        );
        let record = lock(&self.in_flight).remove(&info.id);
        match record {
            Some(record) => {
                tracing::trace!(release_id = info.id.0, "releasing resource");
                record.retire();
            }
            None => panic!(
                "release_resource for {} which is not in flight (unknown or already released)",
                info.id
            ),
        }
    }

    fn get_cursor_command(&self) -> Option<CursorCommandExt> {
        let mut in_flight = lock(&self.in_flight);
        let cmd = self.cursor.pull()?;
        let ext = cmd.ext();
        track(&mut in_flight, InFlight::Cursor(cmd));
        Some(ext)
    }

    fn req_cursor_notification(&self) -> bool {
        self.cursor.notify_requested()
    }
}

impl std::fmt::Debug for WorkerAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerAdapter")
            .field("queue", &self.queue)
            .field("cursor", &self.cursor)
            .field("worker", &self.attached_worker())
            .field("in_flight", &self.in_flight())
            .field("mm_time", &self.mm_time())
            .finish()
    }
}

impl Drop for WorkerAdapter {
    /// Last handle gone: nobody can release the remaining in-flight records anymore.
    fn drop(&mut self) {
        let leftover = std::mem::take(&mut *lock(&self.in_flight));
        for (id, record) in leftover {
            tracing::warn!(release_id = id.0, "worker never released command, releasing on drop");
            record.retire();
        }
    }
}
