use thiserror::Error;

use dllbridge_protocol::BridgeError;

/// Server-local errors, folded into `BridgeError` (spec.md §7) at the RPC
/// boundary. Kept distinct from `BridgeError` so the native-invocation and
/// symbol-resolution code can be specific about what failed before it's
/// flattened into the wire taxonomy.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("library not found: {0}")]
    LibraryNotFound(String),

    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("unsupported ABI flavor: {0}")]
    UnsupportedAbi(String),

    #[error("routine invoked before argument/return types were configured")]
    NotConfigured,

    #[error("native invocation failed: {0}")]
    NativeInvocationFailed(String),

    #[error(transparent)]
    Pack(#[from] dllbridge_pack::PackError),

    #[error(transparent)]
    Schema(#[from] dllbridge_schema::SchemaError),
}

impl From<ServerError> for BridgeError {
    fn from(e: ServerError) -> Self {
        match e {
            ServerError::LibraryNotFound(name) => BridgeError::SymbolNotFound(name),
            ServerError::SymbolNotFound(name) => BridgeError::SymbolNotFound(name),
            ServerError::UnsupportedAbi(flavor) => BridgeError::UnsupportedAbi(flavor),
            ServerError::NotConfigured => BridgeError::NotConfigured,
            ServerError::NativeInvocationFailed(msg) => BridgeError::NativeInvocationFailed(msg),
            ServerError::Pack(e) => e.into(),
            ServerError::Schema(e) => e.into(),
        }
    }
}
