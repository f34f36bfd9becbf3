use thiserror::Error;

/// Errors raised while building or registering a type schema.
///
/// This is the local half of `dllbridge_protocol::BridgeError`'s
/// `UnsupportedType` variant; `dllbridge-protocol` wraps it for the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    #[error("struct '{name}' redefined with a different layout: {reason}")]
    StructRedefinition { name: String, reason: String },

    #[error("unknown struct identifier: {0}")]
    UnknownStruct(String),
}
