//! The client-side [`Transport`] implementation: a blocking facade over a
//! single persistent TCP connection. `Session::send` (spec.md §5: "every
//! operation is synchronous request/response") expects a blocking call, so
//! this wraps a small dedicated `tokio` runtime the way a synchronous client
//! library commonly bridges into an async I/O stack rather than forcing
//! every caller to be `async` itself.

use std::net::ToSocketAddrs;

use dllbridge_client::Transport;
use dllbridge_protocol::{BridgeError, BridgeRequest, BridgeResponse};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tracing::instrument;

use crate::error::TransportError;
use crate::framing::{read_frame, write_frame};

pub struct TcpTransport {
    runtime: Runtime,
    stream: TcpStream,
}

impl TcpTransport {
    /// Connect to a running `dllbridge-serverd`. The returned transport owns
    /// a private single-threaded runtime; it is not meant to be shared
    /// across threads (wrap the owning `Session` in an `Arc` instead, same
    /// as any other client handle).
    pub fn connect(addr: impl ToSocketAddrs + Send + 'static) -> Result<Self, TransportError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let std_addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| TransportError::Io(std::io::Error::other("no address resolved")))?;
        let stream = runtime.block_on(TcpStream::connect(std_addr))?;
        stream.set_nodelay(true).ok();
        Ok(TcpTransport { runtime, stream })
    }
}

impl Transport for TcpTransport {
    #[instrument(skip(self, request))]
    fn send(&mut self, request: BridgeRequest) -> Result<BridgeResponse, BridgeError> {
        let TcpTransport { runtime, stream } = self;
        runtime.block_on(async {
            write_frame(stream, &request).await?;
            match read_frame(stream).await? {
                Some(response) => Ok(response),
                None => Err(TransportError::ConnectionClosed),
            }
        })
        .map_err(BridgeError::from)
    }
}
