//! Server-side accept/serve loop. Deliberately decoupled from
//! `dllbridge-server`'s `Coordinator` type (this crate sits underneath it in
//! the dependency graph) — callers supply anything implementing
//! [`RequestHandler`], one instance per accepted connection.

use std::net::SocketAddr;
use std::sync::Arc;

use dllbridge_protocol::{BridgeRequest, BridgeResponse};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::framing::{read_frame, write_frame};

/// One session's worth of request handling, independent of how the
/// coordinator backing it stores state. Implementations must be safe to
/// share across the connection's lifetime via `Arc` (spec.md §4.6: one
/// coordinator per session, but nothing prevents a future multi-connection
/// server policy from reusing the same handler).
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, request: BridgeRequest) -> BridgeResponse;
}

/// Bind `addr` and serve connections until the listener errors. Each
/// accepted connection gets its own `Handler` instance produced by
/// `make_handler`, and is driven to completion (client disconnect or
/// `Terminate`) on its own spawned task — sessions don't share state, per
/// spec.md §4.6/§5.
pub async fn serve_tcp<H, F>(addr: &str, make_handler: F) -> Result<(), TransportError>
where
    H: RequestHandler,
    F: Fn() -> H + Send + Sync + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "dllbridge-transport listening");
    let make_handler = Arc::new(make_handler);

    loop {
        let (stream, peer) = listener.accept().await?;
        let handler = Arc::new(make_handler());
        tokio::spawn(async move {
            if let Err(e) = serve_connection(stream, peer, handler).await {
                warn!(%peer, error = %e, "session ended with an error");
            }
        });
    }
}

async fn serve_connection<H: RequestHandler>(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<H>,
) -> Result<(), TransportError> {
    debug!(%peer, "session connected");
    loop {
        let request: BridgeRequest = match read_frame(&mut stream).await? {
            Some(r) => r,
            None => {
                debug!(%peer, "session disconnected");
                return Ok(());
            }
        };
        let terminating = matches!(request, BridgeRequest::Terminate);
        let response = handler.handle(request);
        write_frame(&mut stream, &response).await?;
        if terminating {
            debug!(%peer, "session terminated by request");
            return Ok(());
        }
    }
}
