//! Value Packer/Unpacker and Memory Sync Engine for dllbridge.
//!
//! This crate is the symmetric half of the call-marshalling pipeline that
//! runs identically (modulo direction) on the client and the server: turning
//! live native values into the wire-safe [`dllbridge_protocol::ArgTree`] and
//! back, and snapshotting/restoring the byte ranges opaque pointers address
//! (spec.md §4.2–§4.5).

mod error;
mod live_value;
mod memsync;
mod packer;
mod unpacker;

pub use error::PackError;
pub use live_value::{
    expect_array, expect_cell, expect_length, expect_scalar, expect_struct, LiveValue,
};
pub use memsync::{hydrate_memory, pack_memory, unpack_memory, MemoryTarget, PointerHandle, RawPtr};
pub use packer::{pack_args, pack_value};
pub use unpacker::{pack_return_args, unpack_args, unpack_return_args};
