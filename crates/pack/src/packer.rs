//! `pack_args` (spec.md §4.2): turn the caller's live values into the
//! transport-safe `ArgTree` a `CallRoutine` request carries.

use dllbridge_protocol::{ArgPayload, ArgTree};
use dllbridge_schema::{Group, Modifier, TypeNode};

use crate::error::PackError;
use crate::live_value::{expect_array, expect_cell, expect_scalar, expect_struct, LiveValue};

pub fn pack_args(schemas: &[TypeNode], values: &[LiveValue]) -> Result<ArgTree, PackError> {
    if schemas.len() != values.len() {
        return Err(PackError::ArityMismatch {
            expected: schemas.len(),
            actual: values.len(),
        });
    }
    let mut entries = Vec::with_capacity(schemas.len());
    for (schema, value) in schemas.iter().zip(values) {
        entries.push((schema.name.clone(), pack_value(schema, value)?));
    }
    Ok(ArgTree::new(entries))
}

pub fn pack_value(schema: &TypeNode, value: &LiveValue) -> Result<ArgPayload, PackError> {
    peel_and_pack(&schema.modifiers, schema, value)
}

/// Walk `modifiers` outside-in (spec.md §4.2: "peel off modifiers from the
/// outside in"), dereferencing at `Pointer` and indexing through `Array`,
/// until the base shape is reached and dispatched by `schema.group`.
fn peel_and_pack(
    modifiers: &[Modifier],
    schema: &TypeNode,
    value: &LiveValue,
) -> Result<ArgPayload, PackError> {
    match modifiers.split_last() {
        Some((Modifier::Pointer, rest)) => {
            if matches!(value, LiveValue::Null) {
                return Ok(ArgPayload::Null);
            }
            let cell = expect_cell(value)?;
            let pointee = cell.borrow().clone();
            peel_and_pack(rest, schema, &pointee)
        }
        Some((Modifier::Array(n), rest)) => {
            let elems = expect_array(value)?;
            if elems.len() < *n as usize {
                return Err(PackError::ArityMismatch {
                    expected: *n as usize,
                    actual: elems.len(),
                });
            }
            let payloads = elems[..*n as usize]
                .iter()
                .map(|e| peel_and_pack(rest, schema, e))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ArgPayload::List(payloads))
        }
        None => leaf_pack(schema, value),
    }
}

fn leaf_pack(schema: &TypeNode, value: &LiveValue) -> Result<ArgPayload, PackError> {
    match schema.group {
        Group::Void => Ok(ArgPayload::Null),
        Group::Fundamental => Ok(ArgPayload::Scalar(expect_scalar(value)?)),
        Group::Struct => {
            let children = expect_struct(value)?;
            let values: Vec<LiveValue> = children.iter().map(|(_, v)| v.clone()).collect();
            Ok(ArgPayload::Struct(pack_args(&schema.fields, &values)?))
        }
    }
}
