//! Native symbol resolution: `libloading::Library::new` plus a narrow,
//! documented `unsafe` boundary for turning a resolved symbol into the
//! `libffi::middle::CodePtr` the invocation layer calls through.
//!
//! Split behind a trait ([`NativeLibrary`]) so `dllbridge-server`'s own
//! tests can exercise the call-marshalling pipeline against plain Rust
//! `extern "C" fn`s without needing an actual DLL on disk or a Wine
//! install — only `dllbridge-serverd` (the real binary) uses
//! [`LoadedLibrary`].

use libffi::middle::CodePtr;

use crate::error::ServerError;

pub trait NativeLibrary: Send + Sync {
    /// Resolve an exported symbol to a callable address.
    ///
    /// Spec.md §4.6: "Server resolves the symbol; failure to resolve ⇒
    /// `SymbolNotFound`."
    fn resolve(&self, symbol_name: &str) -> Result<CodePtr, ServerError>;
}

/// A DLL loaded through `libloading`, kept alive for the life of the
/// session so resolved symbol addresses stay valid.
pub struct LoadedLibrary {
    // Never read directly again after `open`; its only job is to keep the
    // mapping alive so addresses handed out by `resolve` remain valid.
    _handle: libloading::Library,
    path: String,
}

impl LoadedLibrary {
    /// # Safety
    /// Loading and running arbitrary native code is inherently unsafe; the
    /// caller is trusted to only ever point this at the DLL it means to
    /// bridge into, same as any other dynamic loader API.
    pub fn open(path: &str) -> Result<Self, ServerError> {
        let handle = unsafe { libloading::Library::new(path) }
            .map_err(|e| ServerError::LibraryNotFound(format!("{path}: {e}")))?;
        Ok(LoadedLibrary {
            _handle: handle,
            path: path.to_string(),
        })
    }
}

impl NativeLibrary for LoadedLibrary {
    fn resolve(&self, symbol_name: &str) -> Result<CodePtr, ServerError> {
        // The `Symbol` guard borrows from `_handle`; we only need the raw
        // address it wraps, which stays valid as long as `_handle` is
        // alive, so it's safe to let the guard drop immediately after.
        let ptr = unsafe {
            let symbol = self
                ._handle
                .get::<unsafe extern "C" fn()>(symbol_name.as_bytes())
                .map_err(|_| ServerError::SymbolNotFound(symbol_name.to_string()))?;
            *symbol as *const ()
        };
        tracing::debug!(library = %self.path, symbol = %symbol_name, "resolved native symbol");
        Ok(CodePtr::from_ptr(ptr as *const _))
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use std::collections::HashMap;

    /// A library double backed by Rust function pointers, used by this
    /// crate's own integration tests (and by `dllbridge_server`'s
    /// scenario tests) to drive the marshalling pipeline without a real
    /// dlopen.
    #[derive(Default)]
    pub struct FakeLibrary {
        symbols: HashMap<String, CodePtr>,
    }

    impl FakeLibrary {
        pub fn new() -> Self {
            Self::default()
        }

        /// # Safety
        /// `ptr` must be a valid function pointer matching the CIF the
        /// caller will later build for this symbol.
        pub unsafe fn register(&mut self, name: &str, ptr: *mut std::ffi::c_void) {
            self.symbols.insert(name.to_string(), CodePtr::from_ptr(ptr as *const _));
        }
    }

    impl NativeLibrary for FakeLibrary {
        fn resolve(&self, symbol_name: &str) -> Result<CodePtr, ServerError> {
            self.symbols
                .get(symbol_name)
                .copied()
                .ok_or_else(|| ServerError::SymbolNotFound(symbol_name.to_string()))
        }
    }
}
