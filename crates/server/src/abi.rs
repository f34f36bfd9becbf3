//! Translating a [`TypeNode`] into an `libffi` ABI type.
//!
//! This is the server-only half of the "Type Schema" component: the client
//! never needs a real `ffi_type`, only the portable `TypeNode`. A modifier
//! chain is resolved outermost-last, matching `dllbridge_schema`'s own
//! innermost-to-outermost convention (spec.md §3).
//!
//! Struct layouts are cached per library so a struct type is built by
//! `libffi` exactly once and reused thereafter (spec.md §3: "materialised
//! lazily ... cached and reused").

use std::collections::HashMap;

use dllbridge_schema::{BaseType, Group, Modifier, TypeNode};
use libffi::middle::Type;

use crate::error::ServerError;

#[derive(Default)]
pub struct AbiTypeCache {
    structs: HashMap<String, Type>,
}

/// Whether a [`TypeNode`] is being resolved as a routine's return type or as
/// one of its arguments (or a field nested inside one). `Group::Void` means
/// something different in each position: a genuine `void` return, versus
/// the memsync placeholder occupying a real pointer-sized argument slot
/// (spec.md §3: VOID is "a 'void/opaque' escape hatch used by memory-sync
/// descriptors").
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum AbiPosition {
    Argument,
    Return,
}

impl AbiTypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&mut self, schema: &TypeNode, position: AbiPosition) -> Result<Type, ServerError> {
        resolve_modifiers(&schema.modifiers, schema, position, self)
    }
}

fn resolve_modifiers(
    modifiers: &[Modifier],
    schema: &TypeNode,
    position: AbiPosition,
    cache: &mut AbiTypeCache,
) -> Result<Type, ServerError> {
    match modifiers.split_last() {
        // A pointer argument is passed as a machine pointer regardless of
        // what it points to; the pointee's layout only matters for
        // marshal.rs's byte encoding, not for the CIF's argument type.
        Some((Modifier::Pointer, _)) => Ok(Type::pointer()),
        // C has no "array by value" argument convention, but a fixed array
        // nested inside a struct *is* real inline storage, whose layout for
        // `libffi`'s purposes is indistinguishable from a struct of N
        // repeated elements — so that's how we build it.
        Some((Modifier::Array(n), rest)) => {
            let elem = resolve_modifiers(rest, schema, position, cache)?;
            Ok(Type::structure(std::iter::repeat(elem).take(*n as usize)))
        }
        None => base_abi_type(schema, position, cache),
    }
}

fn base_abi_type(
    schema: &TypeNode,
    position: AbiPosition,
    cache: &mut AbiTypeCache,
) -> Result<Type, ServerError> {
    match schema.group {
        Group::Fundamental => {
            let base = schema.base_type.ok_or_else(|| {
                ServerError::UnsupportedAbi("FUNDAMENTAL node missing a base_type".into())
            })?;
            Ok(scalar_abi_type(base))
        }
        Group::Struct => {
            let struct_name = schema.struct_name.clone().ok_or_else(|| {
                ServerError::UnsupportedAbi("STRUCT node missing a struct_name".into())
            })?;
            if let Some(cached) = cache.structs.get(&struct_name) {
                return Ok(cached.clone());
            }
            let field_types = schema
                .fields
                .iter()
                .map(|f| cache.resolve(f, AbiPosition::Argument))
                .collect::<Result<Vec<_>, _>>()?;
            let ty = Type::structure(field_types);
            cache.structs.insert(struct_name, ty.clone());
            Ok(ty)
        }
        Group::Void if position == AbiPosition::Return => Ok(Type::void()),
        // A VOID node in argument position is always a memsync placeholder
        // standing in for a real `T*` the C signature expects.
        Group::Void => Ok(Type::pointer()),
    }
}

fn scalar_abi_type(base: BaseType) -> Type {
    match base {
        BaseType::I8 | BaseType::Char | BaseType::Bool => Type::i8(),
        BaseType::U8 => Type::u8(),
        BaseType::I16 => Type::i16(),
        BaseType::U16 | BaseType::WChar => Type::u16(),
        BaseType::I32 => Type::i32(),
        BaseType::U32 => Type::u32(),
        BaseType::I64 => Type::i64(),
        BaseType::U64 => Type::u64(),
        BaseType::F32 => Type::f32(),
        BaseType::F64 => Type::f64(),
    }
}
