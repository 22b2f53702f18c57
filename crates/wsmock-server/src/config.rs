//! Server configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Port used when none is given.
pub const DEFAULT_PORT: u16 = 9704;

/// Configuration for the mock server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the WebSocket listener.
    pub addr: SocketAddr,
    /// Backing store file served to every session.
    pub db_path: PathBuf,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT),
            db_path: PathBuf::from("db.json"),
            event_capacity: 256,
        }
    }
}

impl ServerConfig {
    /// Configuration for `db_path` on the loopback interface.
    pub fn new(db_path: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port),
            db_path: db_path.into(),
            ..Default::default()
        }
    }

    /// Binds every interface instead of loopback only.
    pub fn headless(mut self) -> Self {
        self.addr.set_ip(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_binds_loopback() {
        let config = ServerConfig::default();
        assert_eq!(config.addr.to_string(), "127.0.0.1:9704");
        assert_eq!(config.event_capacity, 256);
    }

    #[test]
    fn test_headless_binds_all_interfaces() {
        let config = ServerConfig::new("store.json", 8080).headless();
        assert_eq!(config.addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.db_path, PathBuf::from("store.json"));
    }
}
