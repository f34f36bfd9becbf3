//! Translating caller-declared types into portable schema (spec.md §4.1).
//!
//! `original_source/pycrosscall/routine_server.py` and `routine_client.py`
//! read these declarations off live `ctypes` type objects via reflection;
//! SPEC_FULL.md §9 replaces that with an explicit constructor DSL. A
//! `Declared` value is what a caller builds by hand (or a derive macro
//! could build for them, out of scope here) to describe one argument,
//! struct field, or a return type.

use crate::base_type::BaseType;
use crate::error::SchemaError;
use crate::struct_registry::StructRegistry;
use crate::type_node::{Modifier, TypeNode};

/// One caller-declared type, before it has been turned into a `TypeNode`.
#[derive(Debug, Clone)]
pub enum Declared {
    Fundamental(BaseType),
    Pointer(Box<Declared>),
    Array(Box<Declared>, u32),
    Struct {
        struct_name: String,
        fields: Vec<(String, Declared)>,
    },
    Void,
}

/// `pack_argtypes`: translate a caller's declared argument types into
/// schema, registering any struct layouts encountered along the way.
pub fn pack_argtypes(
    declared: &[(String, Declared)],
    structs: &mut StructRegistry,
) -> Result<Vec<TypeNode>, SchemaError> {
    declared
        .iter()
        .map(|(name, decl)| pack_one(name, decl, structs))
        .collect()
}

/// `pack_returntype`: same translation, for a single return type (which has
/// no argument name).
pub fn pack_returntype(
    declared: &Declared,
    structs: &mut StructRegistry,
) -> Result<TypeNode, SchemaError> {
    pack_one("", declared, structs)
}

fn pack_one(
    name: &str,
    declared: &Declared,
    structs: &mut StructRegistry,
) -> Result<TypeNode, SchemaError> {
    let (base_or_struct, modifiers) = peel_modifiers(declared);
    match base_or_struct {
        Declared::Fundamental(base) => TypeNode::fundamental(name, *base, modifiers),
        Declared::Struct { struct_name, fields } => {
            let field_nodes = fields
                .iter()
                .map(|(fname, fdecl)| pack_one(fname, fdecl, structs))
                .collect::<Result<Vec<_>, _>>()?;
            structs.register(struct_name, &field_nodes)?;
            TypeNode::struct_ref(name, struct_name.clone(), field_nodes, modifiers)
        }
        Declared::Void => {
            if !modifiers.is_empty() {
                return Err(SchemaError::UnsupportedType(
                    "pointer/array wrapping void requires a MemSyncSpec, not a bare TypeNode"
                        .into(),
                ));
            }
            Ok(TypeNode::void(name))
        }
        Declared::Pointer(_) | Declared::Array(_, _) => unreachable!("peeled above"),
    }
}

/// Walk outermost-in through `Pointer`/`Array` wrappers, collecting
/// modifiers innermost-to-outermost as spec.md §3 requires, and returning
/// the unwrapped base declaration.
fn peel_modifiers(declared: &Declared) -> (&Declared, Vec<Modifier>) {
    let mut stack = Vec::new();
    let mut cur = declared;
    loop {
        match cur {
            Declared::Pointer(inner) => {
                stack.push(Modifier::Pointer);
                cur = inner;
            }
            Declared::Array(inner, n) => {
                stack.push(Modifier::Array(*n));
                cur = inner;
            }
            _ => break,
        }
    }
    stack.reverse();
    (cur, stack)
}
