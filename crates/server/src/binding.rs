//! Server-side `RoutineBinding` state machine (spec.md §3/§4.6):
//! `Unregistered -> Registered -> Configured`, with an `AbiTypeCache` shared
//! by every routine in the owning library so struct types are only ever
//! built once.

use dllbridge_protocol::MemSyncSpec;
use dllbridge_schema::TypeNode;
use libffi::middle::CodePtr;

use crate::error::ServerError;

enum State {
    Registered,
    Configured {
        arg_schemas: Vec<TypeNode>,
        ret_schema: TypeNode,
        memsync: Vec<MemSyncSpec>,
    },
}

/// One resolved symbol plus whatever schema the client has pushed for it so
/// far. `Unregistered` isn't its own variant here — a binding only exists in
/// the routine table once `register_routine` has resolved the symbol, so the
/// type itself encodes `Registered`/`Configured` only (spec.md §4.6: a
/// binding that was never registered simply isn't present in the table).
pub struct RoutineBinding {
    code: CodePtr,
    state: State,
}

impl RoutineBinding {
    pub fn registered(code: CodePtr) -> Self {
        RoutineBinding {
            code,
            state: State::Registered,
        }
    }

    pub fn code(&self) -> CodePtr {
        self.code
    }

    pub fn is_configured(&self) -> bool {
        matches!(self.state, State::Configured { .. })
    }

    /// `register_argtype_and_restype` (spec.md §4.6): idempotent — a later
    /// call simply replaces the cached schema, the same way re-declaring a
    /// ctypes function's `argtypes` does.
    pub fn configure(
        &mut self,
        arg_schemas: Vec<TypeNode>,
        ret_schema: TypeNode,
        memsync: Vec<MemSyncSpec>,
    ) {
        self.state = State::Configured {
            arg_schemas,
            ret_schema,
            memsync,
        };
    }

    /// The cached schema, or `NotConfigured` if `invoke` is attempted before
    /// `configure` (spec.md §4.6's state-machine guard).
    pub fn schema(&self) -> Result<(&[TypeNode], &TypeNode, &[MemSyncSpec]), ServerError> {
        match &self.state {
            State::Configured {
                arg_schemas,
                ret_schema,
                memsync,
            } => Ok((arg_schemas, ret_schema, memsync)),
            State::Registered => Err(ServerError::NotConfigured),
        }
    }
}
