//! `LiveValue`: the in-process value tree both sides build from and unpack
//! into. It plays two roles depending on which side holds it: on the client
//! it is the caller's own arguments (a `Cell` is a by-reference out
//! parameter the caller still owns); on the server it is the native tuple
//! reconstructed from the wire before the real call.
//!
//! Pointer-to-pointer is rejected at the schema level (`TypeNode::validate`),
//! so a `Cell` never wraps another `Cell` directly — at most one level of
//! indirection is ever live at once.

use std::cell::RefCell;
use std::rc::Rc;

use dllbridge_protocol::Scalar;

use crate::error::PackError;

#[derive(Debug, Clone)]
pub enum LiveValue {
    /// A plain by-value scalar.
    Scalar(Scalar),
    /// An explicit null pointer (a `Cell` or `Memory` position the caller
    /// left unset).
    Null,
    /// A by-reference scalar, array, or struct — one level of pointer
    /// indirection the callee may mutate in place.
    Cell(Rc<RefCell<LiveValue>>),
    /// A fixed-length array of elements, each independently shaped.
    Array(Vec<LiveValue>),
    /// A struct's fields, positional order significant, names retained only
    /// so memsync paths can resolve a field by name.
    Struct(Vec<(String, LiveValue)>),
    /// The buffer a memsync directive reads and writes, owned on this side.
    /// This is what the server always uses (it only ever holds bytes handed
    /// over the wire) and what a client uses when it builds the snapshot
    /// itself rather than pointing at the caller's own address space. Its
    /// length is advisory — the authoritative length always comes from the
    /// paired `length_path`.
    Memory(Rc<RefCell<Vec<u8>>>),
    /// A memsync position that is the caller's *own* pointer into its own
    /// address space, read and written in place through `RawPtr`'s narrow
    /// unsafe boundary (spec.md §4.5). Client-side only.
    RawMemory(crate::memsync::RawPtr),
    /// A caller-supplied text value at a memsync position that needs
    /// `MemSyncSpec::coercion` applied before the first snapshot (spec.md
    /// §4.2: "apply coercion if given"), e.g. a Rust `String` standing in for
    /// a `char*`/`wchar_t*` buffer. Shared and mutable like `Cell`, so a
    /// reply snapshot can be decoded back into the caller's own string after
    /// the call. Client-side only.
    Text(Rc<RefCell<String>>),
}

impl LiveValue {
    pub fn memory(bytes: Vec<u8>) -> Self {
        LiveValue::Memory(Rc::new(RefCell::new(bytes)))
    }

    pub fn cell(value: LiveValue) -> Self {
        LiveValue::Cell(Rc::new(RefCell::new(value)))
    }

    pub fn text(value: impl Into<String>) -> Self {
        LiveValue::Text(Rc::new(RefCell::new(value.into())))
    }

    /// Wrap a caller-owned raw pointer as a memsync position.
    ///
    /// # Safety
    /// `ptr` must be valid for reads/writes of at least as many bytes as the
    /// paired `MemSyncSpec`'s `length_path` resolves to, for as long as this
    /// value is live.
    pub unsafe fn raw_memory(ptr: *mut u8) -> Self {
        LiveValue::RawMemory(unsafe { crate::memsync::RawPtr::new(ptr) })
    }
}

pub fn expect_scalar(value: &LiveValue) -> Result<Scalar, PackError> {
    match value {
        LiveValue::Scalar(s) => Ok(*s),
        other => Err(PackError::TypeMismatch(format!(
            "expected a scalar, found {other:?}"
        ))),
    }
}

pub fn expect_cell(value: &LiveValue) -> Result<Rc<RefCell<LiveValue>>, PackError> {
    match value {
        LiveValue::Cell(rc) => Ok(Rc::clone(rc)),
        other => Err(PackError::TypeMismatch(format!(
            "expected a by-reference cell, found {other:?}"
        ))),
    }
}

pub fn expect_array(value: &LiveValue) -> Result<&[LiveValue], PackError> {
    match value {
        LiveValue::Array(items) => Ok(items),
        other => Err(PackError::TypeMismatch(format!(
            "expected an array, found {other:?}"
        ))),
    }
}

pub fn expect_struct(value: &LiveValue) -> Result<&[(String, LiveValue)], PackError> {
    match value {
        LiveValue::Struct(fields) => Ok(fields),
        other => Err(PackError::TypeMismatch(format!(
            "expected a struct, found {other:?}"
        ))),
    }
}

pub fn expect_length(value: &LiveValue) -> Result<u64, PackError> {
    match expect_scalar(value)? {
        Scalar::I8(v) => Ok(v as u64),
        Scalar::U8(v) => Ok(v as u64),
        Scalar::I16(v) => Ok(v as u64),
        Scalar::U16(v) => Ok(v as u64),
        Scalar::I32(v) => Ok(v as u64),
        Scalar::U32(v) => Ok(v as u64),
        Scalar::I64(v) => Ok(v as u64),
        Scalar::U64(v) => Ok(v),
        other => Err(PackError::TypeMismatch(format!(
            "length value must be an integer scalar, found {other:?}"
        ))),
    }
}
