//! Per-session connection task.
//!
//! Each accepted socket gets one task that completes the WebSocket
//! handshake, registers the session, serves the initial data and then
//! multiplexes three sources: frames queued by `send_data`, frames from the
//! peer, and the server's shutdown signal.

use crate::events::ServerEvent;
use crate::handle::{Outbound, ServerHandle, SessionTransport};
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};
use wsmock_core::SessionId;

/// How the session loop ended.
enum Exit {
    /// Close handshake done or the peer went away; flush and drop.
    Graceful,
    /// Server shutdown; drop the socket without a close frame.
    Terminated,
}

/// One wake-up of the session loop.
enum Step {
    Shutdown,
    Outbound(Option<Outbound>),
    Inbound(Option<Result<Message, WsError>>),
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Task
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) async fn handle_client(
    handle: ServerHandle,
    stream: TcpStream,
    addr: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) {
    if *shutdown.borrow() {
        return;
    }

    let mut request_path = String::from("/");
    let handshake = accept_hdr_async(
        stream,
        |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            request_path = request.uri().path().to_string();
            Ok(response)
        },
    );

    let ws_stream = match until_shutdown(&mut shutdown, handshake).await {
        Some(Ok(ws_stream)) => ws_stream,
        Some(Err(e)) => {
            warn!("⚠️  WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
        None => return,
    };

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let (id, session) = {
        let mut registry = handle.shared.registry.write().await;
        let id = registry.add(SessionTransport::new(outbound_tx), request_path);
        (id, registry.get(id).cloned())
    };

    if let Some(session) = session {
        info!("✅ Session {} opened from {} for {}", id, addr, session.path);
        handle.shared.emit(ServerEvent::ConnectionNew(session));
    }

    handle.send_data(id, None).await;

    let (mut write, mut read) = ws_stream.split();
    let mut closing = false;

    let exit = loop {
        let step = tokio::select! {
            _ = shutdown.changed() => Step::Shutdown,
            outbound = outbound_rx.recv() => Step::Outbound(outbound),
            msg = read.next() => Step::Inbound(msg),
        };

        match step {
            Step::Shutdown => break Exit::Terminated,

            Step::Outbound(Some(Outbound::Text(json))) => {
                match until_shutdown(&mut shutdown, write.send(Message::Text(json))).await {
                    Some(Ok(())) => {}
                    Some(Err(e)) => {
                        warn!("⚠️  Write to session {} failed: {}", id, e);
                        handle.shared.emit(ServerEvent::Error {
                            id,
                            detail: e.to_string(),
                        });
                    }
                    None => break Exit::Terminated,
                }
            }
            Step::Outbound(Some(Outbound::Close)) => {
                if closing {
                    continue;
                }
                closing = true;
                match until_shutdown(&mut shutdown, write.send(Message::Close(None))).await {
                    Some(Ok(())) => {}
                    Some(Err(e)) => {
                        debug!("Close frame to session {} failed: {}", id, e);
                        break Exit::Graceful;
                    }
                    None => break Exit::Terminated,
                }
            }
            Step::Outbound(None) => break Exit::Graceful,

            Step::Inbound(Some(Ok(Message::Text(text)))) => receive(&handle, id, text).await,
            Step::Inbound(Some(Ok(Message::Binary(data)))) => {
                receive(&handle, id, String::from_utf8_lossy(&data).into_owned()).await
            }
            Step::Inbound(Some(Ok(Message::Close(_)))) => {
                info!("👋 Session {} closed by peer", id);
                break Exit::Graceful;
            }
            // Pings are answered by tungstenite itself.
            Step::Inbound(Some(Ok(_))) => {}
            Step::Inbound(Some(Err(e))) => {
                warn!("⚠️  Error from session {}: {}", id, e);
                break Exit::Graceful;
            }
            Step::Inbound(None) => break Exit::Graceful,
        }
    };

    match exit {
        Exit::Graceful => {
            if until_shutdown(&mut shutdown, write.close()).await.is_none() {
                debug!("Session {} terminated while closing", id);
            }
        }
        Exit::Terminated => debug!("Terminating session {}", id),
    }

    close_session(&handle, id).await;
}

/// Drives `io` to completion unless the server shuts down first.
///
/// Writes to a peer that stopped reading never complete on their own.
async fn until_shutdown<F: Future>(
    shutdown: &mut watch::Receiver<bool>,
    io: F,
) -> Option<F::Output> {
    if *shutdown.borrow() {
        return None;
    }
    tokio::select! {
        output = io => Some(output),
        _ = shutdown.changed() => None,
    }
}

async fn receive(handle: &ServerHandle, id: SessionId, text: String) {
    debug!("Received from session {}: {}", id, text);
    handle.shared.registry.write().await.record_received(id);
    handle
        .shared
        .emit(ServerEvent::ConnectionMessage { id, text });
}

/// Fires the close event with the final session state, then removes it.
async fn close_session(handle: &ServerHandle, id: SessionId) {
    let mut registry = handle.shared.registry.write().await;
    if let Some(session) = registry.get(id).cloned() {
        handle.shared.emit(ServerEvent::ConnectionClose(session));
    }
    registry.remove(id);
    info!("🔌 Session {} closed", id);
}
