//! The error taxonomy from spec.md §7, wire-serialisable so it can cross
//! the RPC boundary as data (§7: "The server logs diagnostics locally and
//! returns a structured error; the client re-raises it at the call site").

use serde::{Deserialize, Serialize};
use thiserror::Error;

use dllbridge_schema::SchemaError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum BridgeError {
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("routine invoked before argument/return types were configured")]
    NotConfigured,

    #[error("argument count mismatch: expected {expected}, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    #[error(
        "memory sync length mismatch: request snapshot was {request_len} bytes, reply was {reply_len} bytes"
    )]
    MemorySyncLengthMismatch { request_len: usize, reply_len: usize },

    #[error("memsync pointer is null but length is {length} > 0")]
    NullPointerWithLength { length: usize },

    #[error("native invocation failed: {0}")]
    NativeInvocationFailed(String),

    #[error("unsupported ABI flavor: {0}")]
    UnsupportedAbi(String),

    #[error("transport failure: {0}")]
    TransportFailure(String),
}

impl From<SchemaError> for BridgeError {
    fn from(e: SchemaError) -> Self {
        BridgeError::UnsupportedType(e.to_string())
    }
}
