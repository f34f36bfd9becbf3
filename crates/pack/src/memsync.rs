//! The Memory Sync Engine (spec.md §4.5): snapshot and restore byte ranges
//! addressed by opaque pointers whose length another argument or field
//! supplies.
//!
//! Three operations cover the four transitions spec.md §4.5 lists:
//!
//! - [`pack_memory`] — take a snapshot. Used by the client before the call
//!   and by the server after it.
//! - [`hydrate_memory`] — apply a received snapshot into the server's own
//!   (owned) buffers, before the native call runs.
//! - [`unpack_memory`] — apply a received snapshot back onto the client's
//!   own (raw, caller-owned) pointers, after the call completes.

use std::cell::RefCell;
use std::rc::Rc;

use dllbridge_protocol::{ByteBlock, Coercion, MemSyncSpec, PathElement};

use crate::error::PackError;
use crate::live_value::{expect_length, LiveValue};

/// A caller-owned pointer into the caller's own address space.
///
/// `libloading`/`libffi` hand back raw pointers the same shape; this type
/// exists so the unsafe reads/writes memory sync needs are isolated to two
/// small functions instead of scattered through the packing logic.
#[derive(Debug, Clone, Copy)]
pub struct RawPtr(*mut u8);

impl RawPtr {
    /// # Safety
    /// `ptr` must be valid for reads/writes of whatever length callers of
    /// [`RawPtr::capture`]/[`RawPtr::restore`] subsequently ask for.
    pub unsafe fn new(ptr: *mut u8) -> Self {
        RawPtr(ptr)
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    /// Snapshot `len` bytes starting at this pointer.
    ///
    /// # Safety
    /// `len` bytes starting at the wrapped pointer must be valid to read.
    pub unsafe fn capture(&self, len: usize) -> ByteBlock {
        if len == 0 || self.0.is_null() {
            return ByteBlock::default();
        }
        let slice = unsafe { std::slice::from_raw_parts(self.0, len) };
        ByteBlock(slice.to_vec())
    }

    /// Overwrite the bytes at this pointer with `bytes`.
    ///
    /// # Safety
    /// `bytes.len()` bytes starting at the wrapped pointer must be valid to
    /// write.
    pub unsafe fn restore(&self, bytes: &[u8]) {
        if bytes.is_empty() || self.0.is_null() {
            return;
        }
        let slice = unsafe { std::slice::from_raw_parts_mut(self.0, bytes.len()) };
        slice.copy_from_slice(bytes);
    }
}

/// What a `MemSyncSpec`'s `pointer_path` resolved to, retained so a later
/// `unpack_memory` call knows where to write the reply without re-walking
/// the path (the caller's live values may have moved on by then).
#[derive(Clone)]
pub enum MemoryTarget {
    Owned(Rc<RefCell<Vec<u8>>>),
    Raw(RawPtr),
    /// A caller-supplied text value that was coerced into bytes before the
    /// snapshot; the reply is decoded back through the same `Coercion` and
    /// written into the caller's string.
    Coerced(Rc<RefCell<String>>, Coercion),
    /// The pointer was null and the paired length was zero; nothing to do
    /// on restore.
    Null,
}

/// Encode `text` per `coercion` and fit it to exactly `byte_count` bytes,
/// the way a fixed-width C buffer would be filled (truncated or zero-padded)
/// — spec.md §4.2's "apply coercion if given" before the snapshot is taken.
fn encode_text(coercion: Coercion, text: &str, byte_count: usize) -> Result<Vec<u8>, PackError> {
    let mut bytes = match coercion {
        Coercion::Utf8Buffer => text.as_bytes().to_vec(),
        Coercion::Utf16Buffer => text
            .encode_utf16()
            .flat_map(|unit| unit.to_le_bytes())
            .collect(),
        Coercion::None => {
            return Err(PackError::TypeMismatch(
                "memsync pointer_path resolved to a text value but no coercion was given".into(),
            ))
        }
    };
    if bytes.len() > byte_count {
        return Err(PackError::MemorySyncLengthMismatch {
            request_len: byte_count,
            reply_len: bytes.len(),
        });
    }
    bytes.resize(byte_count, 0);
    Ok(bytes)
}

/// The inverse of [`encode_text`], applied to a reply snapshot: decode up to
/// the first NUL terminator (or the whole buffer, if none) back into a
/// `String`.
fn decode_text(coercion: Coercion, bytes: &[u8]) -> Result<String, PackError> {
    match coercion {
        Coercion::Utf8Buffer => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            String::from_utf8(bytes[..end].to_vec()).map_err(|e| {
                PackError::TypeMismatch(format!("memsync buffer is not valid UTF-8: {e}"))
            })
        }
        Coercion::Utf16Buffer => {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
            std::char::decode_utf16(units[..end].iter().copied())
                .collect::<Result<String, _>>()
                .map_err(|e| {
                    PackError::TypeMismatch(format!("memsync buffer is not valid UTF-16: {e}"))
                })
        }
        Coercion::None => Err(PackError::TypeMismatch(
            "cannot decode a memsync reply into text without a coercion".into(),
        )),
    }
}

/// A retained pointer reference plus the byte count it was snapshotted at,
/// so `unpack_memory` can enforce spec.md §4.4's length-match requirement.
#[derive(Clone)]
pub struct PointerHandle {
    pub target: MemoryTarget,
    pub expected_len: usize,
}

/// Walk `path` through the live argument tuple, dereferencing any `Cell`
/// encountered along the way (a memsync path step always addresses the
/// pointee, never the pointer cell itself).
fn resolve_path(values: &[LiveValue], path: &[PathElement]) -> Result<LiveValue, PackError> {
    let mut iter = path.iter();
    let first = iter
        .next()
        .ok_or_else(|| PackError::InvalidPath("memsync path must not be empty".into()))?;
    let PathElement::Index(i) = first else {
        return Err(PackError::InvalidPath(
            "memsync path must start with an argument index".into(),
        ));
    };
    let mut current = values
        .get(*i)
        .cloned()
        .ok_or_else(|| PackError::InvalidPath(format!("argument index {i} out of range")))?;
    for elem in iter {
        current = step(&current, elem)?;
    }
    Ok(current)
}

fn step(value: &LiveValue, elem: &PathElement) -> Result<LiveValue, PackError> {
    let value = deref_fully(value);
    match (elem, &value) {
        (PathElement::Index(i), LiveValue::Array(items)) => items
            .get(*i)
            .cloned()
            .ok_or_else(|| PackError::InvalidPath(format!("array index {i} out of range"))),
        (PathElement::Field(name), LiveValue::Struct(fields)) => fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| PackError::InvalidPath(format!("no such field '{name}'"))),
        (elem, other) => Err(PackError::InvalidPath(format!(
            "path element {elem:?} does not apply to {other:?}"
        ))),
    }
}

fn deref_fully(value: &LiveValue) -> LiveValue {
    match value {
        LiveValue::Cell(rc) => deref_fully(&rc.borrow()),
        other => other.clone(),
    }
}

/// `pack_memory` (spec.md §4.2/§4.5): snapshot the byte range each
/// `MemSyncSpec` addresses, before the call on the client and again after
/// the call on the server.
pub fn pack_memory(
    memsync: &[MemSyncSpec],
    values: &[LiveValue],
) -> Result<(Vec<ByteBlock>, Vec<PointerHandle>), PackError> {
    let mut blocks = Vec::with_capacity(memsync.len());
    let mut handles = Vec::with_capacity(memsync.len());
    for spec in memsync {
        let byte_count = resolve_byte_count(spec, values)?;
        let pointer = resolve_path(values, &spec.pointer_path)?;
        let (block, target) = match pointer {
            LiveValue::Null => {
                if byte_count > 0 {
                    return Err(PackError::NullPointerWithLength { length: byte_count });
                }
                (ByteBlock::default(), MemoryTarget::Null)
            }
            LiveValue::RawMemory(raw) => {
                let block = unsafe { raw.capture(byte_count) };
                (block, MemoryTarget::Raw(raw))
            }
            LiveValue::Memory(buf) => {
                let bytes = buf.borrow().clone();
                (ByteBlock(bytes), MemoryTarget::Owned(buf))
            }
            LiveValue::Text(text) => {
                let encoded = encode_text(spec.coercion, &text.borrow(), byte_count)?;
                (ByteBlock(encoded), MemoryTarget::Coerced(text, spec.coercion))
            }
            other => {
                return Err(PackError::TypeMismatch(format!(
                    "memsync pointer_path did not resolve to a memory position, found {other:?}"
                )))
            }
        };
        blocks.push(block);
        handles.push(PointerHandle {
            target,
            expected_len: byte_count,
        });
    }
    Ok((blocks, handles))
}

/// `hydrate_memory`: the server-side mirror of `pack_memory` — apply a
/// received snapshot into the owned buffers `unpack_args` just
/// materialised, before the native call runs ("reconstituted on the
/// server", spec.md §4.5).
pub fn hydrate_memory(
    memsync: &[MemSyncSpec],
    values: &[LiveValue],
    blocks: &[ByteBlock],
) -> Result<(), PackError> {
    if memsync.len() != blocks.len() {
        return Err(PackError::ArityMismatch {
            expected: memsync.len(),
            actual: blocks.len(),
        });
    }
    for (spec, block) in memsync.iter().zip(blocks) {
        let byte_count = resolve_byte_count(spec, values)?;
        if block.len() != byte_count {
            return Err(PackError::MemorySyncLengthMismatch {
                request_len: byte_count,
                reply_len: block.len(),
            });
        }
        let pointer = resolve_path(values, &spec.pointer_path)?;
        match pointer {
            LiveValue::Memory(buf) => *buf.borrow_mut() = block.0.clone(),
            LiveValue::Null if byte_count == 0 => {}
            LiveValue::Null => return Err(PackError::NullPointerWithLength { length: byte_count }),
            LiveValue::RawMemory(raw) => unsafe { raw.restore(&block.0) },
            other => {
                return Err(PackError::TypeMismatch(format!(
                    "memsync pointer_path did not resolve to a memory position, found {other:?}"
                )))
            }
        }
    }
    Ok(())
}

/// `unpack_memory` (spec.md §4.4): re-apply the reply snapshot onto the
/// pointers retained from an earlier `pack_memory` call.
pub fn unpack_memory(handles: &[PointerHandle], blocks: &[ByteBlock]) -> Result<(), PackError> {
    if handles.len() != blocks.len() {
        return Err(PackError::ArityMismatch {
            expected: handles.len(),
            actual: blocks.len(),
        });
    }
    for (handle, block) in handles.iter().zip(blocks) {
        if block.len() != handle.expected_len {
            return Err(PackError::MemorySyncLengthMismatch {
                request_len: handle.expected_len,
                reply_len: block.len(),
            });
        }
        match &handle.target {
            MemoryTarget::Owned(buf) => *buf.borrow_mut() = block.0.clone(),
            MemoryTarget::Raw(raw) => unsafe { raw.restore(&block.0) },
            MemoryTarget::Coerced(text, coercion) => {
                *text.borrow_mut() = decode_text(*coercion, &block.0)?;
            }
            MemoryTarget::Null => {}
        }
    }
    Ok(())
}

fn resolve_byte_count(spec: &MemSyncSpec, values: &[LiveValue]) -> Result<usize, PackError> {
    let length_value = resolve_path(values, &spec.length_path)?;
    let length = expect_length(&length_value)? as usize;
    Ok(length * spec.element_type.size_of())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dllbridge_protocol::Scalar;

    fn buf_arg(bytes: Vec<u8>) -> LiveValue {
        LiveValue::memory(bytes)
    }

    fn len_arg(n: i32) -> LiveValue {
        LiveValue::Scalar(Scalar::I32(n))
    }

    #[test]
    fn snapshot_byte_count_matches_length_times_element_size() {
        let spec = MemSyncSpec::new(vec![0.into()], vec![1.into()]);
        let values = vec![buf_arg(vec![1, 2, 3, 4]), len_arg(4)];
        let (blocks, handles) = pack_memory(&[spec], &values).unwrap();
        assert_eq!(blocks[0].0, vec![1, 2, 3, 4]);
        assert_eq!(handles[0].expected_len, 4);
    }

    #[test]
    fn null_pointer_with_zero_length_is_fine() {
        let spec = MemSyncSpec::new(vec![0.into()], vec![1.into()]);
        let values = vec![LiveValue::Null, len_arg(0)];
        let (blocks, _handles) = pack_memory(&[spec], &values).unwrap();
        assert!(blocks[0].is_empty());
    }

    #[test]
    fn null_pointer_with_nonzero_length_is_fatal() {
        let spec = MemSyncSpec::new(vec![0.into()], vec![1.into()]);
        let values = vec![LiveValue::Null, len_arg(4)];
        let err = pack_memory(&[spec], &values).unwrap_err();
        assert!(matches!(err, PackError::NullPointerWithLength { length: 4 }));
    }

    #[test]
    fn unpack_memory_rejects_length_mismatch() {
        let buf = Rc::new(RefCell::new(vec![0u8; 4]));
        let handles = vec![PointerHandle {
            target: MemoryTarget::Owned(buf),
            expected_len: 4,
        }];
        let blocks = vec![ByteBlock(vec![1, 2, 3])];
        let err = unpack_memory(&handles, &blocks).unwrap_err();
        assert!(matches!(
            err,
            PackError::MemorySyncLengthMismatch {
                request_len: 4,
                reply_len: 3
            }
        ));
    }

    #[test]
    fn nested_field_path_navigates_through_a_pointer_and_a_struct() {
        // S6: struct { uint8_t* data; int len } passed by pointer; memsync
        // paths [0, "data"] / [0, "len"].
        let data = buf_arg(vec![9, 9, 9]);
        let len = len_arg(3);
        let strct = LiveValue::Struct(vec![("data".into(), data), ("len".into(), len)]);
        let values = vec![LiveValue::cell(strct)];
        let spec = MemSyncSpec::new(
            vec![0.into(), "data".into()],
            vec![0.into(), "len".into()],
        );
        let (blocks, _) = pack_memory(&[spec], &values).unwrap();
        assert_eq!(blocks[0].0, vec![9, 9, 9]);
    }

    #[test]
    fn utf8_coercion_encodes_and_pads_to_byte_count() {
        let spec = MemSyncSpec::new(vec![0.into()], vec![1.into()])
            .with_coercion(dllbridge_protocol::Coercion::Utf8Buffer);
        let values = vec![LiveValue::text("hi"), len_arg(4)];
        let (blocks, handles) = pack_memory(&[spec], &values).unwrap();
        assert_eq!(blocks[0].0, vec![b'h', b'i', 0, 0]);
        assert_eq!(handles[0].expected_len, 4);
    }

    #[test]
    fn utf8_coercion_round_trips_through_unpack_memory() {
        let text = Rc::new(RefCell::new("hi".to_string()));
        let handles = vec![PointerHandle {
            target: MemoryTarget::Coerced(Rc::clone(&text), dllbridge_protocol::Coercion::Utf8Buffer),
            expected_len: 4,
        }];
        let blocks = vec![ByteBlock(vec![b'b', b'y', b'e', 0])];
        unpack_memory(&handles, &blocks).unwrap();
        assert_eq!(&*text.borrow(), "bye");
    }

    #[test]
    fn utf16_coercion_encodes_little_endian_code_units() {
        let spec = MemSyncSpec::new(vec![0.into()], vec![1.into()])
            .with_coercion(dllbridge_protocol::Coercion::Utf16Buffer);
        let values = vec![LiveValue::text("hi"), len_arg(2)];
        let (blocks, _) = pack_memory(&[spec], &values).unwrap();
        assert_eq!(blocks[0].0, vec![b'h', 0, b'i', 0]);
    }

    #[test]
    fn text_value_without_coercion_is_rejected() {
        let spec = MemSyncSpec::new(vec![0.into()], vec![1.into()]);
        let values = vec![LiveValue::text("hi"), len_arg(2)];
        let err = pack_memory(&[spec], &values).unwrap_err();
        assert!(matches!(err, PackError::TypeMismatch(_)));
    }

    #[test]
    fn packer_never_reads_a_memsync_covered_void_argument() {
        // Even if the underlying memory were garbage, `pack_value` for a
        // `Group::Void` schema must never inspect it (spec.md §4.2).
        use dllbridge_schema::TypeNode;
        let schema = TypeNode::void("buf");
        let value = LiveValue::memory(vec![0xDE, 0xAD]);
        let payload = crate::packer::pack_value(&schema, &value).unwrap();
        assert_eq!(payload, dllbridge_protocol::ArgPayload::Null);
    }
}
