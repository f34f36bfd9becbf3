use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("frame length {0} exceeds the maximum allowed frame size")]
    FrameTooLarge(usize),

    #[error("connection closed mid-frame")]
    ConnectionClosed,
}

impl From<TransportError> for dllbridge_protocol::BridgeError {
    fn from(e: TransportError) -> Self {
        dllbridge_protocol::BridgeError::TransportFailure(e.to_string())
    }
}
