use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;
use wsmock_core::PathError;

/// Errors from reading, parsing or writing the backing store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid JSON in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Unsupported store format: {} (only JSON data files can be served)", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error("Invalid path: {0}")]
    Path(#[from] PathError),
}

/// Errors from the server lifecycle.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("Server is already running")]
    AlreadyRunning,
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
