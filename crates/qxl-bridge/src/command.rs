//! Display command records as seen by the producer and by the worker.

use std::fmt;
use std::sync::Arc;

use qxl_queue::{GroupId, ReleaseInfo, ReleaseToken, Retire};

/// QXL command kinds (`QXL_CMD_*`).
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandType {
    Nop = 0,
    Draw = 1,
    Update = 2,
    Cursor = 3,
    Message = 4,
    Surface = 5,
}

impl CommandType {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn from_u32(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::Nop,
            1 => Self::Draw,
            2 => Self::Update,
            3 => Self::Cursor,
            4 => Self::Message,
            5 => Self::Surface,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    pub ty: CommandType,
    pub group_id: GroupId,
    pub flags: u32,
}

/// A producer-allocated command record.
///
/// The payload is shared, never copied, between the producer, the queue and the worker. The record
/// itself (and with it the release token) lives until the worker releases it or the session tears
/// down.
pub struct Command {
    header: CommandHeader,
    payload: Arc<[u8]>,
    token: ReleaseToken,
}

impl Command {
    pub fn new(ty: CommandType, payload: impl Into<Arc<[u8]>>, token: ReleaseToken) -> Self {
        Self {
            header: CommandHeader {
                ty,
                group_id: token.group_id(),
                flags: 0,
            },
            payload: payload.into(),
            token,
        }
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.header.flags = flags;
        self
    }

    pub fn header(&self) -> CommandHeader {
        self.header
    }

    pub fn payload(&self) -> &Arc<[u8]> {
        &self.payload
    }

    pub fn release_info(&self) -> ReleaseInfo {
        self.token.info()
    }

    /// The view handed to the worker on pull.
    pub fn ext(&self) -> CommandExt {
        CommandExt {
            header: self.header,
            payload: self.payload.clone(),
            release_info: self.release_info(),
        }
    }
}

impl Retire for Command {
    fn retire(self) {
        self.token.release();
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("header", &self.header)
            .field("payload_len", &self.payload.len())
            .field("release", &self.token)
            .finish()
    }
}

/// Worker-side view of a pulled command (`QXLCommandExt`).
///
/// `release_info` is what the worker passes back to
/// [`QxlInterface::release_resource`](crate::QxlInterface::release_resource).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandExt {
    pub header: CommandHeader,
    pub payload: Arc<[u8]>,
    pub release_info: ReleaseInfo,
}
