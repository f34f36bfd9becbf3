//! The seam between the client half of the call-marshalling pipeline and a
//! concrete RPC implementation (spec.md §2: "the concrete RPC transport" is
//! an external collaborator specified only by the interface it must
//! provide).
//!
//! Every operation in spec.md §5 is synchronous request/response and blocks
//! the caller until the peer replies or the transport errors — so the seam
//! is a single blocking method, not an async trait. `dllbridge-transport`
//! is the reference implementation; callers may supply their own (an
//! in-process loopback for tests, a different wire format, ...).

use dllbridge_protocol::{BridgeError, BridgeRequest, BridgeResponse};

pub trait Transport {
    /// Send one request and block until the matching response arrives (or
    /// the transport itself fails). Per-binding call ordering
    /// (spec.md §5: "call N's reply precedes call N+1's dispatch") is the
    /// caller's responsibility, not the transport's.
    fn send(&mut self, request: BridgeRequest) -> Result<BridgeResponse, BridgeError>;
}
