//! Portable C type schema for dllbridge.
//!
//! This crate is the "Type Schema" component from spec.md §2/§4.1: a
//! discriminated, serialisable description of C types that both the client
//! and the server can build independently and compare for equality. It has
//! no knowledge of RPC, transport, or live values — see `dllbridge-protocol`
//! and `dllbridge-pack` for those.

mod base_type;
mod declared;
mod error;
mod struct_registry;
mod type_node;

pub use base_type::BaseType;
pub use declared::{pack_argtypes, pack_returntype, Declared};
pub use error::SchemaError;
pub use struct_registry::StructRegistry;
pub use type_node::{Group, Modifier, TypeNode};
