//! Client-side `RoutineBinding` (spec.md §3/§4.6): cached type schemas, the
//! lazy `configure` step, and `invoke`.

use std::sync::OnceLock;

use dllbridge_pack::{pack_args, pack_memory, unpack_memory, unpack_return_args, LiveValue, PointerHandle};
use dllbridge_protocol::{
    pack_memsync, BridgeError, BridgeRequest, BridgeResponse, CallResult, MemSyncSpec, Scalar,
};
use dllbridge_schema::{pack_argtypes, pack_returntype, Declared, TypeNode};
use tracing::{debug, instrument, warn};

use crate::session::{unexpected_response, Session};
use crate::transport::Transport;

/// The schema pushed to the server during `configure`, cached so a second
/// `call` never re-sends it (spec.md §8's idempotence property).
struct ConfiguredSchema {
    arg_schemas: Vec<TypeNode>,
    ret_schema: TypeNode,
    memsync: Vec<MemSyncSpec>,
}

pub struct Routine<T> {
    session: Session<T>,
    library_id: String,
    symbol_name: String,
    arg_types: Vec<(String, Declared)>,
    ret_type: Declared,
    memsync: Vec<MemSyncSpec>,
    schema: OnceLock<ConfiguredSchema>,
}

/// The result of a successful `call`: the scalar return value (`None` for a
/// `void` routine) plus whatever arguments/memory the native call mutated
/// have already been written back into the caller's own `values`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub return_value: Option<Scalar>,
}

impl<T: Transport> Routine<T> {
    pub(crate) fn new(
        session: Session<T>,
        library_id: String,
        symbol_name: String,
        arg_types: Vec<(String, Declared)>,
        ret_type: Declared,
        memsync: Vec<MemSyncSpec>,
    ) -> Self {
        Routine {
            session,
            library_id,
            symbol_name,
            arg_types,
            ret_type,
            memsync,
            schema: OnceLock::new(),
        }
    }

    /// `call` (spec.md §4.6 "invoke"): pack arguments and memory, make the
    /// RPC round trip, and unpack the reply back into `values` in place.
    #[instrument(skip(self, values), fields(symbol = %self.symbol_name))]
    pub fn call(&self, values: &[LiveValue]) -> Result<CallOutcome, BridgeError> {
        let schema = self.ensure_configured()?;

        let args = pack_args(&schema.arg_schemas, values).map_err(BridgeError::from)?;
        let (memory, handles): (Vec<_>, Vec<PointerHandle>) =
            pack_memory(&schema.memsync, values).map_err(BridgeError::from)?;

        let response = self.session.send(BridgeRequest::CallRoutine {
            library_id: self.library_id.clone(),
            symbol_name: self.symbol_name.clone(),
            args,
            memory,
        })?;

        let CallResult {
            args: reply_args,
            return_value,
            memory: reply_memory,
        } = match response {
            BridgeResponse::Call(result) => result,
            BridgeResponse::Error(e) => {
                warn!(error = %e, "call_routine failed");
                return Err(e);
            }
            other => return Err(unexpected_response("call_routine", &other)),
        };

        unpack_return_args(&schema.arg_schemas, values, &reply_args).map_err(BridgeError::from)?;
        unpack_memory(&handles, &reply_memory).map_err(BridgeError::from)?;

        Ok(CallOutcome { return_value })
    }

    /// `configure` (spec.md §4.6), run at most once per routine. A second
    /// call to `call` finds `schema` already populated and skips the RPC
    /// entirely — the idempotence property from spec.md §8.6.
    fn ensure_configured(&self) -> Result<&ConfiguredSchema, BridgeError> {
        if let Some(schema) = self.schema.get() {
            return Ok(schema);
        }

        let mut structs = self
            .session
            .struct_registry()
            .write()
            .unwrap_or_else(|poison| poison.into_inner());
        let arg_schemas = pack_argtypes(&self.arg_types, &mut structs)?;
        let ret_schema = pack_returntype(&self.ret_type, &mut structs)?;
        drop(structs);
        let memsync = pack_memsync(self.memsync.clone());

        let response = self.session.send(BridgeRequest::RegisterArgtypeAndRestype {
            library_id: self.library_id.clone(),
            symbol_name: self.symbol_name.clone(),
            arg_schemas: arg_schemas.clone(),
            ret_schema: ret_schema.clone(),
            memsync: memsync.clone(),
        })?;

        match response {
            BridgeResponse::Ack(true) => {
                debug!("routine configured");
                Ok(self.schema.get_or_init(|| ConfiguredSchema {
                    arg_schemas,
                    ret_schema,
                    memsync,
                }))
            }
            BridgeResponse::Ack(false) => Err(BridgeError::NotConfigured),
            BridgeResponse::Error(e) => Err(e),
            other => Err(unexpected_response(
                "register_argtype_and_restype",
                &other,
            )),
        }
    }
}
