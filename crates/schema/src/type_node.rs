//! `TypeNode`: a portable, serialisable description of a C type.
//!
//! See SPEC_FULL.md §3 for the data model and §4.1 for the construction
//! operations (`pack_argtypes`, `pack_returntype`, `pack_memsync`).

use serde::{Deserialize, Serialize};

use crate::base_type::BaseType;
use crate::error::SchemaError;

/// How a `TypeNode`'s base is wrapped.
///
/// Order is innermost-to-outermost, matching the original's single flags
/// list (`[POINTER, 4]` reads as "array of 4 pointers to base" — spec.md
/// §3 and §9's "Pointer/array modifier composition" note).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modifier {
    Pointer,
    Array(u32),
}

/// The coarse kind of a `TypeNode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Group {
    Fundamental,
    Struct,
    Void,
}

/// A node in a type schema tree.
///
/// Field names mirror spec.md §3 exactly: `name`, `group`, `base_type` (only
/// meaningful for `Group::Fundamental`), `struct_name` (only meaningful for
/// `Group::Struct`), `modifiers`, `fields` (only meaningful for
/// `Group::Struct`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeNode {
    pub name: String,
    pub group: Group,
    pub base_type: Option<BaseType>,
    pub struct_name: Option<String>,
    pub modifiers: Vec<Modifier>,
    pub fields: Vec<TypeNode>,
}

impl TypeNode {
    /// A named fundamental scalar, optionally wrapped in pointer/array
    /// modifiers.
    pub fn fundamental(
        name: impl Into<String>,
        base_type: BaseType,
        modifiers: Vec<Modifier>,
    ) -> Result<Self, SchemaError> {
        let node = TypeNode {
            name: name.into(),
            group: Group::Fundamental,
            base_type: Some(base_type),
            struct_name: None,
            modifiers,
            fields: Vec::new(),
        };
        node.validate()?;
        Ok(node)
    }

    /// A named struct reference; `fields` is the ordered member list.
    pub fn struct_ref(
        name: impl Into<String>,
        struct_name: impl Into<String>,
        fields: Vec<TypeNode>,
        modifiers: Vec<Modifier>,
    ) -> Result<Self, SchemaError> {
        let node = TypeNode {
            name: name.into(),
            group: Group::Struct,
            base_type: None,
            struct_name: Some(struct_name.into()),
            modifiers,
            fields,
        };
        node.validate()?;
        Ok(node)
    }

    /// The `void`/opaque escape hatch used by memsync-covered arguments.
    pub fn void(name: impl Into<String>) -> Self {
        TypeNode {
            name: name.into(),
            group: Group::Void,
            base_type: None,
            struct_name: None,
            modifiers: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// True if this node's outermost modifier is `Pointer` — the condition
    /// spec.md §4.3/§4.4 use to decide whether a position can carry mutation
    /// back to the caller.
    pub fn is_outer_pointer(&self) -> bool {
        matches!(self.modifiers.last(), Some(Modifier::Pointer))
    }

    /// Re-check the invariants from spec.md §3 and the open-question
    /// resolution in SPEC_FULL.md §3 (no pointer-to-pointer, no array of
    /// void). Called by every constructor so an invalid `TypeNode` can never
    /// be observed outside this crate.
    fn validate(&self) -> Result<(), SchemaError> {
        match self.group {
            Group::Fundamental => {
                if self.base_type.is_none() {
                    return Err(SchemaError::UnsupportedType(
                        "FUNDAMENTAL node without a base_type".into(),
                    ));
                }
            }
            Group::Struct => {
                if self.struct_name.is_none() {
                    return Err(SchemaError::UnsupportedType(
                        "STRUCT node without a struct_name".into(),
                    ));
                }
            }
            Group::Void => {
                if !self.modifiers.is_empty() {
                    return Err(SchemaError::UnsupportedType(
                        "VOID node cannot carry pointer/array modifiers directly (use memsync)"
                            .into(),
                    ));
                }
            }
        }

        // Open question (a): pointer-to-pointer is explicitly unsupported.
        if self
            .modifiers
            .windows(2)
            .any(|w| matches!(w, [Modifier::Pointer, Modifier::Pointer]))
        {
            return Err(SchemaError::UnsupportedType(
                "pointer-to-pointer modifier composition is not supported".into(),
            ));
        }

        // Array of void cannot be realised: the only VOID nodes are opaque
        // memsync placeholders, which never carry modifiers of their own.
        if self.group == Group::Void
            && self
                .modifiers
                .iter()
                .any(|m| matches!(m, Modifier::Array(_)))
        {
            return Err(SchemaError::UnsupportedType(
                "array of void cannot be realised".into(),
            ));
        }

        for field in &self.fields {
            field.validate()?;
        }

        Ok(())
    }
}
