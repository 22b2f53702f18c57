//! Events emitted by the server and their human-readable log form.

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;
use wsmock_core::{Session, SessionId};

/// Longest data preview shown in a log line before it is cut.
const PREVIEW_LEN: usize = 100;

/// Everything observable about a running server.
///
/// Subscribers receive these over a broadcast channel; they never affect
/// server state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerEvent {
    /// A session was accepted and registered.
    #[serde(rename = "connection:new")]
    ConnectionNew(Session),
    /// A session sent text to the server.
    #[serde(rename = "connection:message")]
    ConnectionMessage { id: SessionId, text: String },
    /// A session closed. Carries the final state, captured before removal.
    #[serde(rename = "connection:close")]
    ConnectionClose(Session),
    /// A value was queued for a session.
    #[serde(rename = "data:sent")]
    DataSent { id: SessionId, value: Value },
    #[serde(rename = "server:started")]
    ServerStarted { port: u16 },
    #[serde(rename = "server:stopped")]
    ServerStopped,
    /// A per-session failure. The session stays open.
    #[serde(rename = "error")]
    Error { id: SessionId, detail: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Success,
    Error,
}

/// A display line derived from a [`ServerEvent`] or from console input.
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub kind: LogKind,
    pub text: String,
    pub timestamp: DateTime<Local>,
}

impl LogEvent {
    pub fn new(kind: LogKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            timestamp: Local::now(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(LogKind::Info, text)
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self::new(LogKind::Success, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(LogKind::Error, text)
    }
}

impl From<&ServerEvent> for LogEvent {
    fn from(event: &ServerEvent) -> Self {
        match event {
            ServerEvent::ConnectionNew(session) => LogEvent::info(format!(
                "New connection: {} (ID: {})",
                session.path, session.id
            )),
            ServerEvent::ConnectionMessage { id, text } => {
                LogEvent::info(format!("Received from {}: {}", id, text))
            }
            ServerEvent::ConnectionClose(session) => {
                LogEvent::info(format!("Connection closed: {}", session.id))
            }
            ServerEvent::DataSent { id, value } => {
                LogEvent::success(format!("Sent to {}: {}", id, preview(value)))
            }
            ServerEvent::ServerStarted { port } => {
                LogEvent::info(format!("Server started on port {}", port))
            }
            ServerEvent::ServerStopped => LogEvent::info("Server stopped"),
            ServerEvent::Error { id, detail } => {
                LogEvent::error(format!("Error on {}: {}", id, detail))
            }
        }
    }
}

/// Compact JSON of `value`, cut to [`PREVIEW_LEN`] characters.
fn preview(value: &Value) -> String {
    let json = value.to_string();
    match json.char_indices().nth(PREVIEW_LEN) {
        Some((cut, _)) => format!("{}...", &json[..cut]),
        None => json,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wsmock_core::ConnectionRegistry;

    fn session(path: &str) -> Session {
        let mut registry = ConnectionRegistry::new();
        let id = registry.add((), path);
        registry.get(id).unwrap().clone()
    }

    #[test]
    fn test_event_serialization_uses_channel_names() {
        let json = serde_json::to_value(ServerEvent::DataSent {
            id: 3,
            value: json!([1]),
        })
        .unwrap();
        assert_eq!(json, json!({"type": "data:sent", "payload": {"id": 3, "value": [1]}}));

        let json = serde_json::to_value(ServerEvent::ServerStopped).unwrap();
        assert_eq!(json["type"], "server:stopped");
    }

    #[test]
    fn test_log_event_texts() {
        let log = LogEvent::from(&ServerEvent::ConnectionNew(session("/api")));
        assert_eq!(log.kind, LogKind::Info);
        assert_eq!(log.text, "New connection: /api (ID: 1)");

        let log = LogEvent::from(&ServerEvent::Error {
            id: 2,
            detail: "boom".into(),
        });
        assert_eq!(log.kind, LogKind::Error);
        assert_eq!(log.text, "Error on 2: boom");
    }

    #[test]
    fn test_data_sent_preview_is_truncated() {
        let value = json!("x".repeat(300));
        let log = LogEvent::from(&ServerEvent::DataSent { id: 1, value });

        assert_eq!(log.kind, LogKind::Success);
        let preview = log.text.strip_prefix("Sent to 1: ").unwrap();
        assert_eq!(preview.chars().count(), PREVIEW_LEN + 3);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn test_short_preview_is_untouched() {
        let log = LogEvent::from(&ServerEvent::DataSent {
            id: 1,
            value: json!({"id": 1}),
        });
        assert_eq!(log.text, r#"Sent to 1: {"id":1}"#);
    }
}
