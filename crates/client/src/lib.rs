//! Client-side Routine Binding and Session Coordinator for dllbridge
//! (spec.md §2, §4.6).
//!
//! This crate is the caller-facing facade: a [`Session`] registers
//! [`Library`] handles, a `Library` registers [`Routine`] handles, and a
//! `Routine` is called with a slice of [`dllbridge_pack::LiveValue`] —
//! pack, RPC, and unpack all happen inside `Routine::call`.

mod library;
mod routine;
mod session;
mod transport;

pub use dllbridge_pack::LiveValue;
pub use dllbridge_protocol::{AbiFlavor, BridgeError, Coercion, MemSyncSpec, PathElement, Scalar};
pub use dllbridge_schema::{BaseType, Declared};

pub use library::Library;
pub use routine::{CallOutcome, Routine};
pub use session::Session;
pub use transport::Transport;
