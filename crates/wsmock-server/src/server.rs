//! Server lifecycle: `Stopped -> Running -> Stopped`.

use crate::config::ServerConfig;
use crate::connection::handle_client;
use crate::error::ServerError;
use crate::events::ServerEvent;
use crate::handle::ServerHandle;
use crate::store::JsonStore;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info};

struct Running {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    acceptor: JoinHandle<()>,
}

/// Owns the listening socket and drives every session's lifecycle.
///
/// The registry and store live behind the [`ServerHandle`], so session ids
/// keep increasing across a stop/start cycle of the same manager.
pub struct ServerManager {
    config: ServerConfig,
    handle: ServerHandle,
    running: Option<Running>,
}

impl ServerManager {
    /// Creates a stopped server for `config`.
    ///
    /// Fails if the configured store is not a JSON data file.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let store = JsonStore::open(&config.db_path)?;
        let (events, _) = broadcast::channel(config.event_capacity);

        Ok(Self {
            config,
            handle: ServerHandle::new(store, events),
            running: None,
        })
    }

    /// Returns a cloneable handle to the command API.
    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Returns a receiver for every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.handle.subscribe()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Address the listener is bound to, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.local_addr)
    }

    /// Binds the listener and starts accepting sessions.
    ///
    /// Returns the bound address, which differs from the configured one
    /// when port 0 was requested.
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        if self.running.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        let addr = self.config.addr;
        let bind_error = |source| ServerError::Bind { addr, source };

        let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let acceptor = tokio::spawn(accept_loop(listener, self.handle.clone(), shutdown_rx));

        self.running = Some(Running {
            local_addr,
            shutdown,
            acceptor,
        });

        info!("🌐 wsmock listening on ws://{}", local_addr);
        info!("📄 Serving: {}", self.config.db_path.display());
        self.handle.shared.emit(ServerEvent::ServerStarted {
            port: local_addr.port(),
        });

        Ok(local_addr)
    }

    /// Terminates every session without a close handshake and closes the
    /// listener. Returns once every session's close event has fired.
    ///
    /// Does nothing when the server is not running.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        let _ = running.shutdown.send(true);
        if let Err(e) = running.acceptor.await {
            error!("Accept loop ended abnormally: {}", e);
        }

        info!("🛑 Server on {} stopped", running.local_addr);
        self.handle.shared.emit(ServerEvent::ServerStopped);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Accept Loop
// ─────────────────────────────────────────────────────────────────────────────

async fn accept_loop(
    listener: TcpListener,
    handle: ServerHandle,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut clients = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,

            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    info!("🔌 New connection from {}", addr);
                    clients.spawn(handle_client(handle.clone(), stream, addr, shutdown.clone()));
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            },

            Some(joined) = clients.join_next(), if !clients.is_empty() => {
                if let Err(e) = joined {
                    error!("Session task failed: {}", e);
                }
            }
        }
    }

    drop(listener);

    while let Some(joined) = clients.join_next().await {
        if let Err(e) = joined {
            error!("Session task failed: {}", e);
        }
    }
}
