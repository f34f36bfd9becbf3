//! Per-session struct identity.
//!
//! Struct identifiers are globally unique per session and, once registered,
//! a struct identifier's layout is immutable (spec.md §3). SPEC_FULL.md §9
//! notes a content hash of the field schema is an acceptable implementation
//! of the stable token; this registry compares field lists directly instead
//! (cheaper to reason about than hashing, and gives a precise mismatch
//! error), which is equivalent for the purposes of the invariant.

use std::collections::HashMap;

use crate::error::SchemaError;
use crate::type_node::TypeNode;

/// Materialises struct layouts lazily and rejects redefinition with a
/// different layout, on both the client and the server side of a session.
#[derive(Debug, Default)]
pub struct StructRegistry {
    structs: HashMap<String, Vec<TypeNode>>,
}

impl StructRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or re-register with an identical layout) a struct type.
    pub fn register(
        &mut self,
        struct_name: &str,
        fields: &[TypeNode],
    ) -> Result<(), SchemaError> {
        match self.structs.get(struct_name) {
            None => {
                self.structs.insert(struct_name.to_string(), fields.to_vec());
                Ok(())
            }
            Some(existing) if existing == fields => Ok(()),
            Some(_) => Err(SchemaError::StructRedefinition {
                name: struct_name.to_string(),
                reason: "field schema differs from the first registration".to_string(),
            }),
        }
    }

    pub fn fields(&self, struct_name: &str) -> Result<&[TypeNode], SchemaError> {
        self.structs
            .get(struct_name)
            .map(Vec::as_slice)
            .ok_or_else(|| SchemaError::UnknownStruct(struct_name.to_string()))
    }

    pub fn is_registered(&self, struct_name: &str) -> bool {
        self.structs.contains_key(struct_name)
    }
}
