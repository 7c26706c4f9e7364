use qxl_queue::QueueError;
use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid queue configuration: {0}")]
    Queue(#[from] QueueError),

    #[error("only one QXL session may be active per slot")]
    SessionActive,

    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),

    #[error("cursor pixel data is {actual} bytes, shape needs {expected}")]
    CursorDataLength { expected: u64, actual: usize },

    #[error("cursor shape {width}x{height} does not fit a 32-bit data size")]
    CursorTooLarge { width: u16, height: u16 },
}
