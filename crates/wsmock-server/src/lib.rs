//! wsmock Server - serve a JSON file over WebSocket
//!
//! This crate implements the runtime of the mock server:
//!
//! - A WebSocket listener whose sessions each receive the subtree selected
//!   by their request path (`ws://host:port/api/v1/users`)
//! - A registry of live sessions with activity counters
//! - A command API to resend, transform or close sessions and to edit the
//!   backing store while clients are connected
//! - A typed event stream for displays and loggers
//!
//! The backing store is re-read on every send, so editing the file by hand
//! is picked up by the next message.

mod config;
mod connection;
mod error;
mod events;
mod handle;
mod server;
mod store;

pub use config::{ServerConfig, DEFAULT_PORT};
pub use error::{ServerError, StoreError};
pub use events::{LogEvent, LogKind, ServerEvent};
pub use handle::ServerHandle;
pub use server::ServerManager;
pub use store::JsonStore;
