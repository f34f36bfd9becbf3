//! Memory Sync directives (spec.md §3, §4.5).

use serde::{Deserialize, Serialize};

use dllbridge_schema::BaseType;

use crate::path::PathElement;

/// How to convert a caller-supplied value (e.g. a text buffer) into a typed
/// pointer before the first snapshot. Spec.md §3 leaves this as an "optional
/// hint"; the closed set below covers the cases `pycrosscall`'s
/// `'_c'`/`from_param` hook is used for in practice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Coercion {
    /// No conversion: the caller already handed over a typed pointer.
    None,
    /// Treat the caller's value as a UTF-8 byte buffer.
    Utf8Buffer,
    /// Treat the caller's value as a UTF-16 (wide) byte buffer.
    Utf16Buffer,
}

/// A directive that some argument (or struct field within one) is an opaque
/// pointer whose addressable length is derived from another argument (or
/// field).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemSyncSpec {
    pub pointer_path: Vec<PathElement>,
    pub length_path: Vec<PathElement>,
    pub element_type: BaseType,
    pub coercion: Coercion,
}

impl MemSyncSpec {
    /// Build a spec with the default element type (`BaseType::U8`, per
    /// SPEC_FULL.md §3) and no coercion.
    pub fn new(pointer_path: Vec<PathElement>, length_path: Vec<PathElement>) -> Self {
        MemSyncSpec {
            pointer_path,
            length_path,
            element_type: BaseType::U8,
            coercion: Coercion::None,
        }
    }

    pub fn with_element_type(mut self, element_type: BaseType) -> Self {
        self.element_type = element_type;
        self
    }

    pub fn with_coercion(mut self, coercion: Coercion) -> Self {
        self.coercion = coercion;
        self
    }
}

/// `pack_memsync`: normalise a list of caller-declared directives. Paths and
/// the coercion hint are already portable tokens, so this is an identity
/// pass that exists to mirror spec.md §4.1's operation inventory and to give
/// callers one place to validate directives before they are pushed to the
/// server.
pub fn pack_memsync(specs: Vec<MemSyncSpec>) -> Vec<MemSyncSpec> {
    specs
}
