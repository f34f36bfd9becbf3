//! Transport-safe value representation: `Scalar`, `ArgPayload`, `ArgTree`.
//!
//! This is the wire shape spec.md §4.2 describes: "ArgTree is an ordered
//! sequence of `(name, payload)` pairs mirroring `arg_schemas`".

use serde::{Deserialize, Serialize};

/// A scalar value, tagged the same way as `dllbridge_schema::BaseType`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Char(u8),
    WChar(u16),
    Bool(bool),
}

/// One argument's packed payload. The shape mirrors the schema node it was
/// packed against: a fundamental scalar, an array of payloads (for array
/// modifiers), a nested tree (for a struct), or nothing at all (`Null`) for
/// `VOID` nodes and memsync-covered positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArgPayload {
    Null,
    Scalar(Scalar),
    List(Vec<ArgPayload>),
    Struct(ArgTree),
}

/// An ordered tree of `(name, payload)` entries mirroring a routine's
/// argument list or a struct's field list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ArgTree(pub Vec<(String, ArgPayload)>);

impl ArgTree {
    pub fn new(entries: Vec<(String, ArgPayload)>) -> Self {
        ArgTree(entries)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ArgPayload> {
        self.0.get(index).map(|(_, payload)| payload)
    }
}

/// An opaque byte sequence used to transport a memory snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ByteBlock(pub Vec<u8>);

impl ByteBlock {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
