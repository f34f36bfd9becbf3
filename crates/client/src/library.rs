//! Client-side half of a loaded library: just an identifier plus the
//! session it was resolved against. `register_routine` is the other half
//! of the lifecycle spec.md §4.6 describes.

use dllbridge_protocol::{BridgeError, BridgeRequest, BridgeResponse};
use dllbridge_schema::Declared;
use tracing::instrument;

use crate::routine::Routine;
use crate::session::{unexpected_response, Session};
use crate::transport::Transport;

pub struct Library<T> {
    session: Session<T>,
    library_id: String,
}

impl<T: Transport> Library<T> {
    pub(crate) fn new(session: Session<T>, library_id: String) -> Self {
        Library {
            session,
            library_id,
        }
    }

    pub fn library_id(&self) -> &str {
        &self.library_id
    }

    /// `register_routine` (spec.md §4.6, idempotent): resolve `symbol_name`
    /// on the server and bind it to its declared Rust-side types.
    ///
    /// Declaring `arg_types`/`ret_type`/`memsync` here (rather than as a
    /// separate later call) mirrors how a caller typically sets
    /// `argtypes`/`restype` on a bound symbol immediately after looking it
    /// up; the RPC that actually pushes the schema to the server
    /// (`register_argtype_and_restype`) is still deferred until the
    /// routine's first call, per spec.md §4.6's "configure (lazy, on first
    /// call)".
    #[instrument(skip(self, arg_types, ret_type, memsync), fields(symbol = %symbol_name))]
    pub fn register_routine(
        &self,
        symbol_name: impl Into<String>,
        arg_types: Vec<(String, Declared)>,
        ret_type: Declared,
        memsync: Vec<dllbridge_protocol::MemSyncSpec>,
    ) -> Result<Routine<T>, BridgeError> {
        let symbol_name = symbol_name.into();
        let response = self.session.send(BridgeRequest::RegisterRoutine {
            library_id: self.library_id.clone(),
            symbol_name: symbol_name.clone(),
        })?;
        match response {
            BridgeResponse::Ack(true) => Ok(Routine::new(
                self.session.clone(),
                self.library_id.clone(),
                symbol_name,
                arg_types,
                ret_type,
                memsync,
            )),
            BridgeResponse::Ack(false) => Err(BridgeError::SymbolNotFound(symbol_name)),
            BridgeResponse::Error(e) => Err(e),
            other => Err(unexpected_response("register_routine", &other)),
        }
    }
}
