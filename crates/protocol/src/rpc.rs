//! The RPC Contract (spec.md §6): the narrow set of request/response shapes
//! the boundary must support. The transport itself lives in
//! `dllbridge-transport` and is pluggable — this module only defines the
//! values that cross it.

use serde::{Deserialize, Serialize};

use dllbridge_schema::TypeNode;

use crate::error::BridgeError;
use crate::memsync::MemSyncSpec;
use crate::value::{ArgTree, ByteBlock, Scalar};

/// Calling convention a native routine expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbiFlavor {
    Cdecl,
    Stdcall,
    /// Platform-default Windows convention.
    Windows,
}

/// `"up"` | `"down"` from spec.md §6's `get_status` table, as an enum rather
/// than magic strings on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Up,
    Down,
}

/// The result payload of a successful `call_routine`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    pub args: ArgTree,
    pub return_value: Option<Scalar>,
    pub memory: Vec<ByteBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BridgeRequest {
    AccessLibrary {
        library_path_native: String,
        library_path_local: String,
        library_name: String,
        abi_flavor: AbiFlavor,
    },
    RegisterRoutine {
        library_id: String,
        symbol_name: String,
    },
    RegisterArgtypeAndRestype {
        library_id: String,
        symbol_name: String,
        arg_schemas: Vec<TypeNode>,
        ret_schema: TypeNode,
        memsync: Vec<MemSyncSpec>,
    },
    CallRoutine {
        library_id: String,
        symbol_name: String,
        args: ArgTree,
        memory: Vec<ByteBlock>,
    },
    GetStatus,
    Terminate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BridgeResponse {
    /// The 1/0 "ok" acknowledgement used by `access_library`,
    /// `register_routine`, and `register_argtype_and_restype`.
    Ack(bool),
    Call(CallResult),
    Status(SessionStatus),
    Terminated,
    Error(BridgeError),
}

impl BridgeResponse {
    pub fn is_ok(&self) -> bool {
        !matches!(self, BridgeResponse::Error(_))
    }
}
