//! Wire-level RPC contract for dllbridge.
//!
//! Everything in this crate must be serialisable through a byte-safe
//! encoding (spec.md §6) — the types here carry no native handles.

mod error;
mod memsync;
mod path;
mod rpc;
mod value;

pub use error::BridgeError;
pub use memsync::{pack_memsync, Coercion, MemSyncSpec};
pub use path::PathElement;
pub use rpc::{AbiFlavor, BridgeRequest, BridgeResponse, CallResult, SessionStatus};
pub use value::{ArgPayload, ArgTree, ByteBlock, Scalar};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_result_round_trips_through_bincode() {
        let result = CallResult {
            args: ArgTree::new(vec![("x".into(), ArgPayload::Scalar(Scalar::I32(25)))]),
            return_value: None,
            memory: vec![ByteBlock(vec![1, 2, 3])],
        };
        let bytes = bincode::serialize(&result).unwrap();
        let back: CallResult = bincode::deserialize(&bytes).unwrap();
        assert_eq!(result, back);
    }

    #[test]
    fn error_round_trips_through_bincode() {
        let err = BridgeError::ArityMismatch {
            expected: 2,
            actual: 1,
        };
        let bytes = bincode::serialize(&err).unwrap();
        let back: BridgeError = bincode::deserialize(&bytes).unwrap();
        assert_eq!(err, back);
    }
}
