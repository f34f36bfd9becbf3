//! The Session Coordinator (spec.md §4.6): the server-side handler for every
//! [`BridgeRequest`] a connected client sends. One `Coordinator` backs one
//! transport session; `library_table`/`routine_table` are plain `HashMap`s
//! guarded by a `std::sync::RwLock`, not an actor or channel-based design —
//! readers (routine lookups during a call) vastly outnumber writers
//! (library/routine registration), so a shared-read lock is the natural fit.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use dllbridge_pack::{hydrate_memory, pack_memory, unpack_args, LiveValue};
use dllbridge_protocol::{
    AbiFlavor, BridgeRequest, BridgeResponse, CallResult, SessionStatus,
};

use crate::abi::AbiTypeCache;
use crate::binding::RoutineBinding;
use crate::config::BridgeConfig;
use crate::error::ServerError;
use crate::invoke::invoke;
use crate::native::{LoadedLibrary, NativeLibrary};

struct LibraryEntry {
    library: Box<dyn NativeLibrary>,
    abi_flavor: AbiFlavor,
    abi_cache: Mutex<AbiTypeCache>,
}

/// Handles one client session's worth of `BridgeRequest`s against the native
/// libraries it has accessed so far (spec.md §4.6/§5: one coordinator per
/// session, torn down on `Terminate` or idle timeout).
pub struct Coordinator {
    config: BridgeConfig,
    libraries: RwLock<HashMap<String, LibraryEntry>>,
    routines: RwLock<HashMap<(String, String), RoutineBinding>>,
}

impl Coordinator {
    pub fn new(config: BridgeConfig) -> Self {
        Coordinator {
            config,
            libraries: RwLock::new(HashMap::new()),
            routines: RwLock::new(HashMap::new()),
        }
    }

    /// Inject a native library directly, bypassing `AccessLibrary`'s path
    /// resolution — lets `tests/scenarios.rs` drive the coordinator against
    /// a `FakeLibrary` or a `LoadedLibrary` pointed at the fixture cdylib
    /// without needing a config file's search path to line up.
    #[cfg(feature = "test-support")]
    pub fn insert_library_for_testing(
        &self,
        library_name: impl Into<String>,
        library: Box<dyn NativeLibrary>,
        abi_flavor: AbiFlavor,
    ) {
        self.libraries.write().unwrap().insert(
            library_name.into(),
            LibraryEntry {
                library,
                abi_flavor,
                abi_cache: Mutex::new(AbiTypeCache::new()),
            },
        );
    }

    /// Dispatch one request to completion. Never panics on a malformed
    /// request — every failure mode becomes a `BridgeResponse::Error`
    /// (spec.md §6: errors are data, not transport failures).
    pub fn handle(&self, request: BridgeRequest) -> BridgeResponse {
        let result = match request {
            BridgeRequest::AccessLibrary {
                library_path_native,
                library_path_local,
                library_name,
                abi_flavor,
            } => self
                .access_library(&library_path_native, &library_path_local, &library_name, abi_flavor)
                .map(|()| BridgeResponse::Ack(true)),
            BridgeRequest::RegisterRoutine {
                library_id,
                symbol_name,
            } => self
                .register_routine(&library_id, &symbol_name)
                .map(|()| BridgeResponse::Ack(true)),
            BridgeRequest::RegisterArgtypeAndRestype {
                library_id,
                symbol_name,
                arg_schemas,
                ret_schema,
                memsync,
            } => self
                .register_argtype_and_restype(&library_id, &symbol_name, arg_schemas, ret_schema, memsync)
                .map(|()| BridgeResponse::Ack(true)),
            BridgeRequest::CallRoutine {
                library_id,
                symbol_name,
                args,
                memory,
            } => self
                .call_routine(&library_id, &symbol_name, args, memory)
                .map(BridgeResponse::Call),
            BridgeRequest::GetStatus => Ok(BridgeResponse::Status(SessionStatus::Up)),
            BridgeRequest::Terminate => {
                self.libraries.write().unwrap().clear();
                self.routines.write().unwrap().clear();
                Ok(BridgeResponse::Terminated)
            }
        };
        result.unwrap_or_else(|e: ServerError| BridgeResponse::Error(e.into()))
    }

    /// spec.md §4.7: prefer the client's own native-visible path; fall back
    /// to translating its local path through the server's configured table
    /// when no native hint was given. `library_id` is the client-supplied
    /// `library_name` verbatim — the server never mints its own id.
    fn access_library(
        &self,
        library_path_native: &str,
        library_path_local: &str,
        library_name: &str,
        abi_flavor: AbiFlavor,
    ) -> Result<(), ServerError> {
        let resolved_path = if !library_path_native.is_empty() {
            library_path_native.to_string()
        } else if !library_path_local.is_empty() {
            self.config.translate_path(library_path_local).to_string()
        } else {
            self.resolve_by_search_path(library_name)?
        };

        let library = LoadedLibrary::open(&resolved_path)?;
        self.libraries.write().unwrap().insert(
            library_name.to_string(),
            LibraryEntry {
                library: Box::new(library),
                abi_flavor,
                abi_cache: Mutex::new(AbiTypeCache::new()),
            },
        );
        tracing::info!(library = %library_name, path = %resolved_path, "library accessed");
        Ok(())
    }

    fn resolve_by_search_path(&self, library_name: &str) -> Result<String, ServerError> {
        for dir in &self.config.dll_search_paths {
            let candidate = dir.join(library_name);
            if candidate.is_file() {
                return Ok(candidate.to_string_lossy().into_owned());
            }
        }
        Err(ServerError::LibraryNotFound(library_name.to_string()))
    }

    /// `register_routine` (spec.md §4.6): resolve the symbol and park it in
    /// the routine table, unconfigured. Idempotent — re-registering the same
    /// symbol simply re-resolves it.
    fn register_routine(&self, library_id: &str, symbol_name: &str) -> Result<(), ServerError> {
        let libraries = self.libraries.read().unwrap();
        let entry = libraries
            .get(library_id)
            .ok_or_else(|| ServerError::LibraryNotFound(library_id.to_string()))?;
        let code = entry.library.resolve(symbol_name)?;
        drop(libraries);

        self.routines.write().unwrap().insert(
            (library_id.to_string(), symbol_name.to_string()),
            RoutineBinding::registered(code),
        );
        Ok(())
    }

    fn register_argtype_and_restype(
        &self,
        library_id: &str,
        symbol_name: &str,
        arg_schemas: Vec<dllbridge_schema::TypeNode>,
        ret_schema: dllbridge_schema::TypeNode,
        memsync: Vec<dllbridge_protocol::MemSyncSpec>,
    ) -> Result<(), ServerError> {
        let mut routines = self.routines.write().unwrap();
        let key = (library_id.to_string(), symbol_name.to_string());
        let binding = routines.get_mut(&key).ok_or_else(|| {
            ServerError::SymbolNotFound(format!("{symbol_name} was never registered"))
        })?;
        binding.configure(arg_schemas, ret_schema, memsync);
        Ok(())
    }

    /// `call_routine` (spec.md §4.6/§4.2-4.5): unpack the wire args into a
    /// live value tree, hydrate the memsync snapshot, call through, then
    /// repack the post-call state — the server's half of the round trip
    /// `dllbridge_client::routine::Routine::call` drives from the other side.
    fn call_routine(
        &self,
        library_id: &str,
        symbol_name: &str,
        args: dllbridge_protocol::ArgTree,
        memory: Vec<dllbridge_protocol::ByteBlock>,
    ) -> Result<CallResult, ServerError> {
        let libraries = self.libraries.read().unwrap();
        let entry = libraries
            .get(library_id)
            .ok_or_else(|| ServerError::LibraryNotFound(library_id.to_string()))?;

        let routines = self.routines.read().unwrap();
        let binding = routines
            .get(&(library_id.to_string(), symbol_name.to_string()))
            .ok_or_else(|| ServerError::SymbolNotFound(symbol_name.to_string()))?;
        let (arg_schemas, ret_schema, memsync) = binding.schema()?;

        let values: Vec<LiveValue> = unpack_args(arg_schemas, &args)?;
        hydrate_memory(memsync, &values, &memory)?;

        let mut cache = entry.abi_cache.lock().unwrap();
        let return_value = invoke(binding.code(), arg_schemas, ret_schema, &values, &mut cache)?;

        let reply_args = dllbridge_pack::pack_return_args(arg_schemas, &values)?;
        let (reply_memory, _handles) = pack_memory(memsync, &values)?;

        Ok(CallResult {
            args: reply_args,
            return_value,
            memory: reply_memory,
        })
    }
}

impl dllbridge_transport::RequestHandler for Coordinator {
    fn handle(&self, request: BridgeRequest) -> BridgeResponse {
        Coordinator::handle(self, request)
    }
}
