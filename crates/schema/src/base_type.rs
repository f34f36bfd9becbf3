//! The closed scalar vocabulary shared by the client and the server.
//!
//! Both sides must agree on this set byte-for-byte; adding a variant requires
//! a coordinated deployment of both halves (spec.md §6).

use serde::{Deserialize, Serialize};

/// A fundamental C scalar type.
///
/// `Bool` is not part of the original `ctypes` name table `pycrosscall`
/// walks (it maps Python `bool` through `c_int`); it is carried here as its
/// own variant because both sides need to agree it serialises as a single
/// byte rather than a full `c_int`. See SPEC_FULL.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Char,
    WChar,
    Bool,
}

impl BaseType {
    /// Size in bytes of one element of this scalar type, used by the memory
    /// sync engine to turn an element count into a byte count.
    pub const fn size_of(self) -> usize {
        match self {
            BaseType::I8 | BaseType::U8 | BaseType::Char | BaseType::Bool => 1,
            BaseType::I16 | BaseType::U16 | BaseType::WChar => 2,
            BaseType::I32 | BaseType::U32 | BaseType::F32 => 4,
            BaseType::I64 | BaseType::U64 | BaseType::F64 => 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_of_matches_c_abi_widths() {
        assert_eq!(BaseType::I8.size_of(), 1);
        assert_eq!(BaseType::U16.size_of(), 2);
        assert_eq!(BaseType::I32.size_of(), 4);
        assert_eq!(BaseType::F64.size_of(), 8);
    }
}
