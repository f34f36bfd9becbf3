//! The server's `unpack_args`/`pack_return` (spec.md §4.3) and the client's
//! `unpack_return` (spec.md §4.4) — the two halves of the packer that run on
//! either side of a `call_routine` round trip.

use std::cell::RefCell;
use std::rc::Rc;

use dllbridge_protocol::{ArgPayload, ArgTree, Scalar};
use dllbridge_schema::{Group, Modifier, TypeNode};

use crate::error::PackError;
use crate::live_value::{expect_array, expect_cell, expect_struct, LiveValue};

/// Reconstruct a fresh native value tree from a received `ArgTree` (server
/// side). `Group::Void` positions materialise as an empty `Memory` cell the
/// memory sync engine fills before the call.
pub fn unpack_args(schemas: &[TypeNode], args: &ArgTree) -> Result<Vec<LiveValue>, PackError> {
    if schemas.len() != args.len() {
        return Err(PackError::ArityMismatch {
            expected: schemas.len(),
            actual: args.len(),
        });
    }
    schemas
        .iter()
        .zip(&args.0)
        .map(|(schema, (_, payload))| build(&schema.modifiers, schema, payload))
        .collect()
}

fn build(modifiers: &[Modifier], schema: &TypeNode, payload: &ArgPayload) -> Result<LiveValue, PackError> {
    match modifiers.split_last() {
        Some((Modifier::Pointer, rest)) => {
            if matches!(payload, ArgPayload::Null) && schema.group != Group::Void {
                return Ok(LiveValue::Null);
            }
            let inner = build(rest, schema, payload)?;
            Ok(LiveValue::cell(inner))
        }
        Some((Modifier::Array(n), rest)) => {
            let items = expect_list(payload)?;
            if items.len() != *n as usize {
                return Err(PackError::ArityMismatch {
                    expected: *n as usize,
                    actual: items.len(),
                });
            }
            let elems = items
                .iter()
                .map(|p| build(rest, schema, p))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(LiveValue::Array(elems))
        }
        None => match schema.group {
            Group::Fundamental => Ok(LiveValue::Scalar(expect_scalar_payload(payload)?)),
            Group::Struct => {
                let tree = expect_struct_payload(payload)?;
                let children = schema
                    .fields
                    .iter()
                    .zip(&tree.0)
                    .map(|(field, (name, p))| Ok((name.clone(), build(&field.modifiers, field, p)?)))
                    .collect::<Result<Vec<_>, PackError>>()?;
                Ok(LiveValue::Struct(children))
            }
            Group::Void => Ok(LiveValue::memory(Vec::new())),
        },
    }
}

/// Build the `ArgTree'` reply (server side, after the native call returns).
/// Only positions that carried at least one `Pointer` modifier anywhere in
/// their chain report a value back; everything else is `Null`. Structs
/// recurse field-by-field under the same rule, independent of whether the
/// struct itself was passed by pointer (spec.md §4.3).
pub fn pack_return_args(schemas: &[TypeNode], values: &[LiveValue]) -> Result<ArgTree, PackError> {
    if schemas.len() != values.len() {
        return Err(PackError::ArityMismatch {
            expected: schemas.len(),
            actual: values.len(),
        });
    }
    let mut entries = Vec::with_capacity(schemas.len());
    for (schema, value) in schemas.iter().zip(values) {
        entries.push((
            schema.name.clone(),
            peel_and_pack_return(&schema.modifiers, schema, value, false)?,
        ));
    }
    Ok(ArgTree::new(entries))
}

fn peel_and_pack_return(
    modifiers: &[Modifier],
    schema: &TypeNode,
    value: &LiveValue,
    pointer_seen: bool,
) -> Result<ArgPayload, PackError> {
    match modifiers.split_last() {
        Some((Modifier::Pointer, rest)) => {
            if matches!(value, LiveValue::Null) {
                return Ok(ArgPayload::Null);
            }
            let cell = expect_cell(value)?;
            let pointee = cell.borrow().clone();
            peel_and_pack_return(rest, schema, &pointee, true)
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
                .map(|e| peel_and_pack_return(rest, schema, e, pointer_seen))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ArgPayload::List(payloads))
        }
        None => match schema.group {
            Group::Fundamental => {
                if pointer_seen {
                    Ok(ArgPayload::Scalar(crate::live_value::expect_scalar(value)?))
                } else {
                    Ok(ArgPayload::Null)
                }
            }
            Group::Struct => {
                let children = expect_struct(value)?;
                let values: Vec<LiveValue> = children.iter().map(|(_, v)| v.clone()).collect();
                Ok(ArgPayload::Struct(pack_return_args(&schema.fields, &values)?))
            }
            Group::Void => Ok(ArgPayload::Null),
        },
    }
}

/// Apply a received `ArgTree'` reply back onto the caller's own live values
/// (client side). Mutation only ever lands through a `Cell` the caller
/// itself holds an `Rc` to — every non-pointer leaf is a no-op.
pub fn unpack_return_args(
    schemas: &[TypeNode],
    values: &[LiveValue],
    reply: &ArgTree,
) -> Result<(), PackError> {
    if schemas.len() != values.len() || schemas.len() != reply.len() {
        return Err(PackError::ArityMismatch {
            expected: schemas.len(),
            actual: reply.len(),
        });
    }
    for ((schema, value), (_, payload)) in schemas.iter().zip(values).zip(&reply.0) {
        descend_write(&schema.modifiers, schema, value, payload)?;
    }
    Ok(())
}

fn descend_write(
    modifiers: &[Modifier],
    schema: &TypeNode,
    value: &LiveValue,
    payload: &ArgPayload,
) -> Result<(), PackError> {
    match modifiers.split_last() {
        Some((Modifier::Pointer, rest)) => {
            if matches!(payload, ArgPayload::Null) || matches!(value, LiveValue::Null) {
                return Ok(());
            }
            let cell = expect_cell(value)?;
            let mut guard = cell.borrow_mut();
            write_into(rest, schema, &mut guard, payload)
        }
        Some((Modifier::Array(n), rest)) => {
            let elems = expect_array(value)?;
            let payloads = expect_list(payload)?;
            if elems.len() < *n as usize || payloads.len() != *n as usize {
                return Err(PackError::ArityMismatch {
                    expected: *n as usize,
                    actual: payloads.len(),
                });
            }
            for i in 0..*n as usize {
                descend_write(rest, schema, &elems[i], &payloads[i])?;
            }
            Ok(())
        }
        None => match schema.group {
            // By-value leaves never receive a reported mutation.
            Group::Fundamental | Group::Void => Ok(()),
            Group::Struct => {
                let children = expect_struct(value)?;
                let tree = expect_struct_payload(payload)?;
                for ((field, (_, child)), (_, field_payload)) in
                    schema.fields.iter().zip(children).zip(&tree.0)
                {
                    descend_write(&field.modifiers, field, child, field_payload)?;
                }
                Ok(())
            }
        },
    }
}

/// The portion of `descend_write` reached once a single `Pointer` has been
/// peeled and we hold a mutable borrow of its target. No further `Pointer`
/// can legally occur here — pointer-to-pointer is rejected at the schema
/// level.
fn write_into(
    modifiers: &[Modifier],
    schema: &TypeNode,
    value: &mut LiveValue,
    payload: &ArgPayload,
) -> Result<(), PackError> {
    match modifiers.split_last() {
        Some((Modifier::Pointer, _)) => Err(PackError::TypeMismatch(
            "pointer-to-pointer modifier chain reached at write-back time".into(),
        )),
        Some((Modifier::Array(n), rest)) => {
            let LiveValue::Array(elems) = value else {
                return Err(PackError::TypeMismatch("expected an array cell".into()));
            };
            let payloads = expect_list(payload)?;
            if elems.len() < *n as usize || payloads.len() != *n as usize {
                return Err(PackError::ArityMismatch {
                    expected: *n as usize,
                    actual: payloads.len(),
                });
            }
            for i in 0..*n as usize {
                write_into(rest, schema, &mut elems[i], &payloads[i])?;
            }
            Ok(())
        }
        None => match schema.group {
            Group::Fundamental => {
                *value = LiveValue::Scalar(expect_scalar_payload(payload)?);
                Ok(())
            }
            Group::Struct => {
                let LiveValue::Struct(children) = value else {
                    return Err(PackError::TypeMismatch("expected a struct cell".into()));
                };
                let tree = expect_struct_payload(payload)?;
                for ((field, (_, child)), (_, field_payload)) in
                    schema.fields.iter().zip(children.iter()).zip(&tree.0)
                {
                    // A struct field may itself be independently wrapped in
                    // its own `Pointer`; that indirection is reached through
                    // the field's own `Cell`, which mutates in place via
                    // interior mutability regardless of this function's
                    // shared borrow of `child`.
                    descend_write(&field.modifiers, field, child, field_payload)?;
                }
                Ok(())
            }
            Group::Void => Ok(()),
        },
    }
}

fn expect_scalar_payload(payload: &ArgPayload) -> Result<Scalar, PackError> {
    match payload {
        ArgPayload::Scalar(s) => Ok(*s),
        other => Err(PackError::TypeMismatch(format!(
            "expected a scalar payload, found {other:?}"
        ))),
    }
}

fn expect_list(payload: &ArgPayload) -> Result<&[ArgPayload], PackError> {
    match payload {
        ArgPayload::List(items) => Ok(items),
        other => Err(PackError::TypeMismatch(format!(
            "expected a list payload, found {other:?}"
        ))),
    }
}

fn expect_struct_payload(payload: &ArgPayload) -> Result<&ArgTree, PackError> {
    match payload {
        ArgPayload::Struct(tree) => Ok(tree),
        other => Err(PackError::TypeMismatch(format!(
            "expected a struct payload, found {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dllbridge_schema::BaseType;

    #[test]
    fn unpack_args_builds_fresh_scalars() {
        let schemas = vec![TypeNode::fundamental("a", BaseType::I32, vec![]).unwrap()];
        let args = ArgTree::new(vec![("a".to_string(), ArgPayload::Scalar(Scalar::I32(7)))]);
        let values = unpack_args(&schemas, &args).unwrap();
        assert!(matches!(values[0], LiveValue::Scalar(Scalar::I32(7))));
    }

    #[test]
    fn unpack_args_materialises_void_positions_as_empty_memory() {
        let schemas = vec![TypeNode::void("buf")];
        let args = ArgTree::new(vec![("buf".to_string(), ArgPayload::Null)]);
        let values = unpack_args(&schemas, &args).unwrap();
        match &values[0] {
            LiveValue::Memory(buf) => assert!(buf.borrow().is_empty()),
            other => panic!("expected a Memory cell, got {other:?}"),
        }
    }

    #[test]
    fn pack_return_reports_only_pointer_carrying_scalars() {
        let schemas = vec![
            TypeNode::fundamental("a", BaseType::I32, vec![]).unwrap(),
            TypeNode::fundamental("b", BaseType::I32, vec![Modifier::Pointer]).unwrap(),
        ];
        let values = vec![
            LiveValue::Scalar(Scalar::I32(1)),
            LiveValue::cell(LiveValue::Scalar(Scalar::I32(99))),
        ];
        let reply = pack_return_args(&schemas, &values).unwrap();
        assert_eq!(reply.get(0), Some(&ArgPayload::Null));
        assert_eq!(reply.get(1), Some(&ArgPayload::Scalar(Scalar::I32(99))));
    }

    #[test]
    fn unpack_return_writes_through_the_caller_cell() {
        let schemas = vec![TypeNode::fundamental("b", BaseType::I32, vec![Modifier::Pointer]).unwrap()];
        let cell = Rc::new(RefCell::new(LiveValue::Scalar(Scalar::I32(0))));
        let values = vec![LiveValue::Cell(Rc::clone(&cell))];
        let reply = ArgTree::new(vec![("b".to_string(), ArgPayload::Scalar(Scalar::I32(55)))]);
        unpack_return_args(&schemas, &values, &reply).unwrap();
        assert!(matches!(*cell.borrow(), LiveValue::Scalar(Scalar::I32(55))));
    }
}
