//! Errors raised while packing, unpacking, or memory-syncing a call. These
//! fold into `BridgeError` (spec.md §7) at the client/server boundary.

use thiserror::Error;

use dllbridge_protocol::BridgeError;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("argument count mismatch: expected {expected}, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("value shape did not match its schema: {0}")]
    TypeMismatch(String),

    #[error("invalid memsync path: {0}")]
    InvalidPath(String),

    #[error("memsync pointer is null but length is {length} > 0")]
    NullPointerWithLength { length: usize },

    #[error(
        "memory sync length mismatch: request snapshot was {request_len} bytes, reply was {reply_len} bytes"
    )]
    MemorySyncLengthMismatch { request_len: usize, reply_len: usize },
}

impl From<PackError> for BridgeError {
    fn from(e: PackError) -> Self {
        match e {
            PackError::ArityMismatch { expected, actual } => {
                BridgeError::ArityMismatch { expected, actual }
            }
            PackError::NullPointerWithLength { length } => {
                BridgeError::NullPointerWithLength { length }
            }
            PackError::MemorySyncLengthMismatch {
                request_len,
                reply_len,
            } => BridgeError::MemorySyncLengthMismatch {
                request_len,
                reply_len,
            },
            PackError::TypeMismatch(msg) => BridgeError::UnsupportedType(msg),
            PackError::InvalidPath(msg) => BridgeError::UnsupportedType(msg),
        }
    }
}
