//! Byte-level marshalling between a [`LiveValue`] tree and the native C-ABI
//! bytes `libffi` calls through.
//!
//! Every argument gets its own arena slot sized and laid out according to
//! its [`TypeNode`] (struct fields packed with natural alignment, arrays
//! inline, pointers as a machine word addressing a further slot). Pointer
//! positions that wrap a live `Cell` register a [`Writeback`] so the value
//! the native call mutated can be re-read into the caller's tree once the
//! call returns — mirrors `dllbridge_pack::unpacker`'s by-value overwrite of
//! a `Cell`'s contents, just one layer further down at the byte level.

use std::cell::RefCell;
use std::rc::Rc;

use dllbridge_pack::{expect_array, expect_scalar, expect_struct, LiveValue};
use dllbridge_protocol::Scalar;
use dllbridge_schema::{BaseType, Group, Modifier, TypeNode};

use crate::error::ServerError;

const PTR_SIZE: usize = std::mem::size_of::<usize>();

/// Flat byte storage for one call. Each entry is an independent heap
/// allocation; growing the arena never invalidates a pointer handed out by
/// [`Arena::ptr`] for an already-allocated entry.
#[derive(Default)]
struct Arena(Vec<Vec<u8>>);

impl Arena {
    fn alloc(&mut self, len: usize) -> usize {
        self.0.push(vec![0u8; len.max(1)]);
        self.0.len() - 1
    }

    fn write(&mut self, idx: usize, offset: usize, bytes: &[u8]) {
        self.0[idx][offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn read(&self, idx: usize, offset: usize, len: usize) -> &[u8] {
        &self.0[idx][offset..offset + len]
    }

    fn ptr(&self, idx: usize) -> *const u8 {
        self.0[idx].as_ptr()
    }
}

/// A pointer position that was backed by a live `Cell`: once the native call
/// returns, `schema` describes the pointee and `arena_idx` is where its
/// (possibly mutated) bytes now live.
struct Writeback {
    cell: Rc<RefCell<LiveValue>>,
    schema: TypeNode,
    arena_idx: usize,
}

/// The state of one encoded call, kept alive for the duration of the native
/// invocation and then consumed by [`apply_writebacks`].
pub struct EncodedCall {
    arena: Arena,
    arg_slots: Vec<usize>,
    writebacks: Vec<Writeback>,
}

impl EncodedCall {
    /// The address `libffi::middle::Arg` should point at for argument `i`.
    pub(crate) fn arg_address(&self, i: usize) -> *const u8 {
        self.arena.ptr(self.arg_slots[i])
    }
}

/// Encode `values` against `schemas` into a fresh [`EncodedCall`].
pub fn encode_args(schemas: &[TypeNode], values: &[LiveValue]) -> Result<EncodedCall, ServerError> {
    let mut arena = Arena::default();
    let mut writebacks = Vec::new();
    let mut arg_slots = Vec::with_capacity(schemas.len());
    for (schema, value) in schemas.iter().zip(values) {
        let (size, _align) = chain_layout(&schema.modifiers, schema)?;
        let idx = arena.alloc(size);
        encode_into(&schema.modifiers, schema, value, &mut arena, idx, 0, &mut writebacks)?;
        arg_slots.push(idx);
    }
    Ok(EncodedCall {
        arena,
        arg_slots,
        writebacks,
    })
}

/// Re-read every registered [`Writeback`] and overwrite the caller's `Cell`
/// with whatever the native call left behind. Runs once, after the call.
pub fn apply_writebacks(call: &EncodedCall) -> Result<(), ServerError> {
    for wb in &call.writebacks {
        let value = decode_chain(&wb.schema.modifiers, &wb.schema, &call.arena, wb.arena_idx, 0)?;
        *wb.cell.borrow_mut() = value;
    }
    Ok(())
}

fn encode_into(
    modifiers: &[Modifier],
    schema: &TypeNode,
    value: &LiveValue,
    arena: &mut Arena,
    idx: usize,
    offset: usize,
    writebacks: &mut Vec<Writeback>,
) -> Result<(), ServerError> {
    match modifiers.split_last() {
        Some((Modifier::Pointer, rest)) => match value {
            LiveValue::Null => {
                arena.write(idx, offset, &0usize.to_ne_bytes());
                Ok(())
            }
            LiveValue::Memory(buf) => {
                let addr = buf.borrow_mut().as_mut_ptr() as usize;
                arena.write(idx, offset, &addr.to_ne_bytes());
                Ok(())
            }
            LiveValue::Cell(rc) => {
                let (pointee_size, _align) = chain_layout(rest, schema)?;
                let pointee_idx = arena.alloc(pointee_size);
                let pointee = rc.borrow().clone();
                encode_into(rest, schema, &pointee, arena, pointee_idx, 0, writebacks)?;
                let addr = arena.ptr(pointee_idx) as usize;
                arena.write(idx, offset, &addr.to_ne_bytes());
                writebacks.push(Writeback {
                    cell: Rc::clone(rc),
                    schema: TypeNode {
                        modifiers: rest.to_vec(),
                        ..schema.clone()
                    },
                    arena_idx: pointee_idx,
                });
                Ok(())
            }
            other => Err(ServerError::NativeInvocationFailed(format!(
                "expected a pointer-shaped value, found {other:?}"
            ))),
        },
        Some((Modifier::Array(n), rest)) => {
            let elems = expect_array(value).map_err(ServerError::from)?;
            let (elem_size, _) = chain_layout(rest, schema)?;
            for i in 0..*n as usize {
                encode_into(rest, schema, &elems[i], arena, idx, offset + i * elem_size, writebacks)?;
            }
            Ok(())
        }
        None => leaf_encode_into(schema, value, arena, idx, offset),
    }
}

fn leaf_encode_into(
    schema: &TypeNode,
    value: &LiveValue,
    arena: &mut Arena,
    idx: usize,
    offset: usize,
) -> Result<(), ServerError> {
    match schema.group {
        Group::Fundamental => {
            let base = schema.base_type.ok_or_else(|| {
                ServerError::UnsupportedAbi("FUNDAMENTAL node missing a base_type".into())
            })?;
            let scalar = expect_scalar(value).map_err(ServerError::from)?;
            arena.write(idx, offset, &scalar_to_ne_bytes(scalar));
            Ok(())
        }
        Group::Struct => {
            let layout = struct_layout(schema)?;
            let children = expect_struct(value).map_err(ServerError::from)?;
            for ((field, field_offset), (_, child)) in
                schema.fields.iter().zip(&layout.offsets).zip(children)
            {
                leaf_encode_field(field, child, arena, idx, offset + field_offset)?;
            }
            Ok(())
        }
        // A bare VOID leaf only occurs for a memsync placeholder, which is
        // always `LiveValue::Memory` (or `Null`) regardless of whether it sits
        // behind its own `Pointer` modifier.
        Group::Void => match value {
            LiveValue::Memory(buf) => {
                let addr = buf.borrow_mut().as_mut_ptr() as usize;
                arena.write(idx, offset, &addr.to_ne_bytes());
                Ok(())
            }
            LiveValue::Null => {
                arena.write(idx, offset, &0usize.to_ne_bytes());
                Ok(())
            }
            other => Err(ServerError::NativeInvocationFailed(format!(
                "expected a memsync buffer, found {other:?}"
            ))),
        },
    }
}

/// A struct field may itself carry `Pointer`/`Array` modifiers; route
/// through the full `encode_into` so those are honoured, but fields are
/// never themselves registered as writebacks here — the server only
/// reports mutations through the field's own `Cell` if a caller elsewhere
/// asked for one, which doesn't currently occur since struct fields arrive
/// unpacked as plain values, not cells, unless wrapped in `Pointer`.
fn leaf_encode_field(
    field: &TypeNode,
    value: &LiveValue,
    arena: &mut Arena,
    idx: usize,
    offset: usize,
) -> Result<(), ServerError> {
    let mut sink = Vec::new();
    encode_into(&field.modifiers, field, value, arena, idx, offset, &mut sink)
}

fn decode_chain(
    modifiers: &[Modifier],
    schema: &TypeNode,
    arena: &Arena,
    idx: usize,
    offset: usize,
) -> Result<LiveValue, ServerError> {
    match modifiers.split_last() {
        Some((Modifier::Pointer, _)) => Err(ServerError::NativeInvocationFailed(
            "nested pointer decode reached without its own writeback".into(),
        )),
        Some((Modifier::Array(n), rest)) => {
            let (elem_size, _) = chain_layout(rest, schema)?;
            let mut elems = Vec::with_capacity(*n as usize);
            for i in 0..*n as usize {
                elems.push(decode_chain(rest, schema, arena, idx, offset + i * elem_size)?);
            }
            Ok(LiveValue::Array(elems))
        }
        None => match schema.group {
            Group::Fundamental => {
                let base = schema.base_type.ok_or_else(|| {
                    ServerError::UnsupportedAbi("FUNDAMENTAL node missing a base_type".into())
                })?;
                let bytes = arena.read(idx, offset, base.size_of());
                Ok(LiveValue::Scalar(bytes_to_scalar(base, bytes)))
            }
            Group::Struct => {
                let layout = struct_layout(schema)?;
                let mut children = Vec::with_capacity(schema.fields.len());
                for (field, field_offset) in schema.fields.iter().zip(&layout.offsets) {
                    let value = decode_chain(&field.modifiers, field, arena, idx, offset + field_offset)?;
                    children.push((field.name.clone(), value));
                }
                Ok(LiveValue::Struct(children))
            }
            Group::Void => Ok(LiveValue::memory(arena.read(idx, offset, PTR_SIZE).to_vec())),
        },
    }
}

struct StructLayout {
    offsets: Vec<usize>,
    size: usize,
    align: usize,
}

fn struct_layout(schema: &TypeNode) -> Result<StructLayout, ServerError> {
    let mut offsets = Vec::with_capacity(schema.fields.len());
    let mut cursor = 0usize;
    let mut max_align = 1usize;
    for field in &schema.fields {
        let (size, align) = chain_layout(&field.modifiers, field)?;
        max_align = max_align.max(align);
        cursor = align_up(cursor, align);
        offsets.push(cursor);
        cursor += size;
    }
    Ok(StructLayout {
        offsets,
        size: align_up(cursor, max_align).max(1),
        align: max_align,
    })
}

fn align_up(n: usize, align: usize) -> usize {
    if align <= 1 {
        return n;
    }
    n.div_ceil(align) * align
}

fn chain_layout(modifiers: &[Modifier], schema: &TypeNode) -> Result<(usize, usize), ServerError> {
    match modifiers.split_last() {
        Some((Modifier::Pointer, _)) => Ok((PTR_SIZE, PTR_SIZE)),
        Some((Modifier::Array(n), rest)) => {
            let (elem_size, elem_align) = chain_layout(rest, schema)?;
            Ok((elem_size * (*n as usize), elem_align))
        }
        None => leaf_layout(schema),
    }
}

fn leaf_layout(schema: &TypeNode) -> Result<(usize, usize), ServerError> {
    match schema.group {
        Group::Fundamental => {
            let base = schema.base_type.ok_or_else(|| {
                ServerError::UnsupportedAbi("FUNDAMENTAL node missing a base_type".into())
            })?;
            let size = base.size_of();
            Ok((size, size))
        }
        Group::Struct => struct_layout(schema).map(|l| (l.size, l.align)),
        Group::Void => Ok((PTR_SIZE, PTR_SIZE)),
    }
}

fn scalar_to_ne_bytes(scalar: Scalar) -> Vec<u8> {
    match scalar {
        Scalar::I8(v) => v.to_ne_bytes().to_vec(),
        Scalar::U8(v) => v.to_ne_bytes().to_vec(),
        Scalar::I16(v) => v.to_ne_bytes().to_vec(),
        Scalar::U16(v) => v.to_ne_bytes().to_vec(),
        Scalar::I32(v) => v.to_ne_bytes().to_vec(),
        Scalar::U32(v) => v.to_ne_bytes().to_vec(),
        Scalar::I64(v) => v.to_ne_bytes().to_vec(),
        Scalar::U64(v) => v.to_ne_bytes().to_vec(),
        Scalar::F32(v) => v.to_ne_bytes().to_vec(),
        Scalar::F64(v) => v.to_ne_bytes().to_vec(),
        Scalar::Char(v) => v.to_ne_bytes().to_vec(),
        Scalar::WChar(v) => v.to_ne_bytes().to_vec(),
        Scalar::Bool(v) => vec![v as u8],
    }
}

fn bytes_to_scalar(base: BaseType, bytes: &[u8]) -> Scalar {
    match base {
        BaseType::I8 => Scalar::I8(i8::from_ne_bytes(bytes.try_into().unwrap())),
        BaseType::U8 => Scalar::U8(bytes[0]),
        BaseType::I16 => Scalar::I16(i16::from_ne_bytes(bytes.try_into().unwrap())),
        BaseType::U16 => Scalar::U16(u16::from_ne_bytes(bytes.try_into().unwrap())),
        BaseType::I32 => Scalar::I32(i32::from_ne_bytes(bytes.try_into().unwrap())),
        BaseType::U32 => Scalar::U32(u32::from_ne_bytes(bytes.try_into().unwrap())),
        BaseType::I64 => Scalar::I64(i64::from_ne_bytes(bytes.try_into().unwrap())),
        BaseType::U64 => Scalar::U64(u64::from_ne_bytes(bytes.try_into().unwrap())),
        BaseType::F32 => Scalar::F32(f32::from_ne_bytes(bytes.try_into().unwrap())),
        BaseType::F64 => Scalar::F64(f64::from_ne_bytes(bytes.try_into().unwrap())),
        BaseType::Char => Scalar::Char(bytes[0]),
        BaseType::WChar => Scalar::WChar(u16::from_ne_bytes(bytes.try_into().unwrap())),
        BaseType::Bool => Scalar::Bool(bytes[0] != 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dllbridge_schema::TypeNode;

    #[test]
    fn scalar_argument_round_trips_through_the_arena() {
        let schema = TypeNode::fundamental("x", BaseType::I32, vec![]).unwrap();
        let value = LiveValue::Scalar(Scalar::I32(42));
        let call = encode_args(&[schema], &[value]).unwrap();
        let bytes = call.arena.read(call.arg_slots[0], 0, 4);
        assert_eq!(i32::from_ne_bytes(bytes.try_into().unwrap()), 42);
    }

    #[test]
    fn pointer_argument_registers_a_writeback_and_applies_mutation() {
        let schema = TypeNode::fundamental("x", BaseType::I32, vec![Modifier::Pointer]).unwrap();
        let cell = LiveValue::cell(LiveValue::Scalar(Scalar::I32(1)));
        let LiveValue::Cell(rc) = &cell else { unreachable!() };
        let mut call = encode_args(&[schema], &[cell.clone()]).unwrap();
        // Simulate the native call writing a new value through the pointer.
        let pointee_idx = call.writebacks[0].arena_idx;
        call.arena.write(pointee_idx, 0, &99i32.to_ne_bytes());
        apply_writebacks(&call).unwrap();
        assert!(matches!(*rc.borrow(), LiveValue::Scalar(Scalar::I32(99))));
    }

    #[test]
    fn struct_fields_are_laid_out_with_natural_alignment() {
        let fields = vec![
            TypeNode::fundamental("flag", BaseType::I8, vec![]).unwrap(),
            TypeNode::fundamental("value", BaseType::I32, vec![]).unwrap(),
        ];
        let schema = TypeNode::struct_ref("s", "Tagged", fields, vec![]).unwrap();
        let layout = struct_layout(&schema).unwrap();
        assert_eq!(layout.offsets, vec![0, 4]);
        assert_eq!(layout.size, 8);
    }

    #[test]
    fn memsync_void_argument_encodes_as_a_bare_pointer() {
        let schema = TypeNode::void("buf");
        let value = LiveValue::memory(vec![1, 2, 3]);
        let call = encode_args(&[schema], &[value]).unwrap();
        let bytes = call.arena.read(call.arg_slots[0], 0, PTR_SIZE);
        assert_ne!(usize::from_ne_bytes(bytes.try_into().unwrap()), 0);
    }
}
