//! Client-side Session Coordinator (spec.md §4.6): the entry point that
//! registers libraries and hands out [`Library`]/[`Routine`] handles, all
//! sharing one struct registry for the lifetime of the session (spec.md
//! §3: "Struct identifiers are globally unique per session").

use std::sync::{Arc, Mutex, RwLock};

use dllbridge_protocol::{AbiFlavor, BridgeError, BridgeRequest, BridgeResponse, SessionStatus};
use dllbridge_schema::StructRegistry;
use tracing::{debug, instrument, warn};

use crate::library::Library;
use crate::transport::Transport;

struct SessionInner<T> {
    transport: Mutex<T>,
    structs: RwLock<StructRegistry>,
}

/// A session is cheap to clone: every [`Library`]/[`Routine`] handle it
/// hands out shares the same transport and struct registry through an
/// `Arc`, the way `tower_lsp::Client` or `reqwest::Client` are cloned
/// around rather than threaded through as a reference.
pub struct Session<T> {
    inner: Arc<SessionInner<T>>,
}

impl<T> Clone for Session<T> {
    fn clone(&self) -> Self {
        Session {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T) -> Self {
        Session {
            inner: Arc::new(SessionInner {
                transport: Mutex::new(transport),
                structs: RwLock::new(StructRegistry::new()),
            }),
        }
    }

    pub(crate) fn struct_registry(&self) -> &RwLock<StructRegistry> {
        &self.inner.structs
    }

    pub(crate) fn send(&self, request: BridgeRequest) -> Result<BridgeResponse, BridgeError> {
        let mut transport = self
            .inner
            .transport
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        transport.send(request)
    }

    /// `access_library` (spec.md §6): resolve a DLL on the server and get
    /// back a handle to register routines against.
    ///
    /// `library_path_native` is how Wine sees the file (typically a `Z:\...`
    /// UNC rewrite); `library_path_local` is how the Unix caller names it.
    /// Both are threaded through per SPEC_FULL.md §4.7.
    #[instrument(skip(self), fields(library_name))]
    pub fn access_library(
        &self,
        library_path_native: impl Into<String>,
        library_path_local: impl Into<String>,
        library_name: impl Into<String>,
        abi_flavor: AbiFlavor,
    ) -> Result<Library<T>, BridgeError> {
        let library_name = library_name.into();
        let response = self.send(BridgeRequest::AccessLibrary {
            library_path_native: library_path_native.into(),
            library_path_local: library_path_local.into(),
            library_name: library_name.clone(),
            abi_flavor,
        })?;
        match response {
            BridgeResponse::Ack(true) => {
                debug!("library resolved");
                Ok(Library::new(self.clone(), library_name))
            }
            BridgeResponse::Ack(false) => Err(BridgeError::SymbolNotFound(library_name)),
            BridgeResponse::Error(e) => {
                warn!(error = %e, "access_library failed");
                Err(e)
            }
            other => Err(unexpected_response("access_library", &other)),
        }
    }

    /// `get_status` (spec.md §6).
    pub fn status(&self) -> Result<SessionStatus, BridgeError> {
        match self.send(BridgeRequest::GetStatus)? {
            BridgeResponse::Status(s) => Ok(s),
            BridgeResponse::Error(e) => Err(e),
            other => Err(unexpected_response("get_status", &other)),
        }
    }

    /// `terminate` (spec.md §6): release every server-owned resource for
    /// this session deterministically (spec.md §5).
    #[instrument(skip(self))]
    pub fn terminate(&self) -> Result<(), BridgeError> {
        match self.send(BridgeRequest::Terminate)? {
            BridgeResponse::Terminated => {
                debug!("session terminated");
                Ok(())
            }
            BridgeResponse::Error(e) => Err(e),
            other => Err(unexpected_response("terminate", &other)),
        }
    }
}

pub(crate) fn unexpected_response(op: &str, response: &BridgeResponse) -> BridgeError {
    BridgeError::TransportFailure(format!("unexpected response to {op}: {response:?}"))
}
