//! The concrete RPC transport for dllbridge (spec.md §2): length-prefixed
//! `bincode` framing of [`BridgeRequest`]/[`BridgeResponse`] over a plain TCP
//! socket, driven by `tokio`.
//!
//! This crate is one valid implementation of `dllbridge_client::transport`'s
//! `Transport` seam, not a hardwired part of the pipeline — a caller that
//! wants a Unix domain socket or an in-process loopback can implement the
//! same trait directly instead.

mod client;
mod error;
mod framing;
mod server;

pub use client::TcpTransport;
pub use error::TransportError;
pub use framing::{read_frame, write_frame};
pub use server::{serve_tcp, RequestHandler};
