//! The command API shared by the manager, its sessions and collaborators.

use crate::error::StoreError;
use crate::events::ServerEvent;
use crate::store::JsonStore;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::{debug, warn};
use wsmock_core::{apply, ConnectionRegistry, Session, SessionId, Transform};

/// Frames queued for a session's writer loop.
#[derive(Debug)]
pub(crate) enum Outbound {
    Text(String),
    Close,
}

/// What the registry keeps for each session: its outbound queue and the
/// lock that keeps concurrent sends to it in call order.
#[derive(Clone)]
pub(crate) struct SessionTransport {
    outbound: mpsc::UnboundedSender<Outbound>,
    send_lock: Arc<Mutex<()>>,
}

impl SessionTransport {
    pub(crate) fn new(outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            outbound,
            send_lock: Arc::new(Mutex::new(())),
        }
    }
}

pub(crate) type SharedRegistry = RwLock<ConnectionRegistry<SessionTransport>>;

pub(crate) struct Shared {
    pub(crate) store: JsonStore,
    pub(crate) registry: SharedRegistry,
    pub(crate) events: broadcast::Sender<ServerEvent>,
}

impl Shared {
    pub(crate) fn emit(&self, event: ServerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// A cloneable handle to a server's sessions and backing store.
///
/// Every method is safe to call whether or not the server is running;
/// session operations on unknown ids do nothing.
#[derive(Clone)]
pub struct ServerHandle {
    pub(crate) shared: Arc<Shared>,
}

impl ServerHandle {
    pub(crate) fn new(store: JsonStore, events: broadcast::Sender<ServerEvent>) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                registry: RwLock::new(ConnectionRegistry::new()),
                events,
            }),
        }
    }

    /// Serves the session's path to the session, optionally transformed.
    ///
    /// The store is re-read for every call. Failures are reported as
    /// [`ServerEvent::Error`] for the session and never returned; the
    /// session stays open.
    pub async fn send_data(&self, id: SessionId, transform: Option<&Transform>) {
        let (path, transport) = {
            let registry = self.shared.registry.read().await;
            match (registry.get(id), registry.transport(id)) {
                (Some(session), Some(transport)) => (session.path.clone(), transport.clone()),
                _ => {
                    debug!("send_data: session {} is not connected", id);
                    return;
                }
            }
        };

        let _turn = transport.send_lock.lock().await;

        let value = match self.prepare(&path, transform).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to prepare data for session {}: {}", id, e);
                self.shared.emit(ServerEvent::Error {
                    id,
                    detail: e.to_string(),
                });
                return;
            }
        };

        if transport
            .outbound
            .send(Outbound::Text(value.to_string()))
            .is_err()
        {
            warn!("Session {} closed before data could be queued", id);
            self.shared.emit(ServerEvent::Error {
                id,
                detail: "connection is closed".to_string(),
            });
            return;
        }

        self.shared.registry.write().await.record_sent(id);
        debug!("Queued data for session {}", id);
        self.shared.emit(ServerEvent::DataSent { id, value });
    }

    async fn prepare(
        &self,
        path: &str,
        transform: Option<&Transform>,
    ) -> Result<Value, StoreError> {
        let base = self.shared.store.load_at(path).await?;
        Ok(apply(&base, transform).into_owned())
    }

    /// Asks a session to close gracefully.
    ///
    /// The session is removed once its transport reports the close, not here.
    pub async fn close_connection(&self, id: SessionId) {
        let registry = self.shared.registry.read().await;
        if let Some(transport) = registry.transport(id) {
            debug!("Closing session {}", id);
            let _ = transport.outbound.send(Outbound::Close);
        }
    }

    /// Snapshot of all live sessions, ordered by id.
    pub async fn get_connections(&self) -> Vec<Session> {
        let mut sessions = self.shared.registry.read().await.get_all();
        sessions.sort_by_key(|session| session.id);
        sessions
    }

    pub async fn connection_count(&self) -> usize {
        self.shared.registry.read().await.len()
    }

    /// Raw text of the backing store.
    pub async fn get_db_content(&self) -> Result<String, StoreError> {
        self.shared.store.read_text().await
    }

    /// Overwrites the backing store with `content` verbatim.
    pub async fn save_db_content(&self, content: &str) -> Result<(), StoreError> {
        self.shared.store.write_text(content).await
    }

    /// Writes `value` at a dotted path in the backing store.
    pub async fn update_db_value(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.shared.store.update_value(path, value).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.shared.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;
    use serde_json::json;
    use tempfile::TempDir;

    fn handle_with(content: &str) -> (TempDir, ServerHandle) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        std::fs::write(&path, content).unwrap();
        let (events, _) = broadcast::channel(16);
        let handle = ServerHandle::new(JsonStore::open(path).unwrap(), events);
        (dir, handle)
    }

    async fn register(
        handle: &ServerHandle,
        path: &str,
    ) -> (SessionId, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = handle
            .shared
            .registry
            .write()
            .await
            .add(SessionTransport::new(tx), path);
        (id, rx)
    }

    fn expect_text(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Value {
        match rx.try_recv() {
            Ok(Outbound::Text(text)) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected a text frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_data_serves_session_path() {
        let (_dir, handle) = handle_with(r#"{"api":{"v1":{"users":[{"id":1}]}}}"#);
        let mut events = handle.subscribe();
        let (id, mut rx) = register(&handle, "/api/v1/users").await;

        handle.send_data(id, None).await;

        assert_eq!(expect_text(&mut rx), json!([{"id": 1}]));
        assert_eq!(
            events.try_recv().unwrap(),
            ServerEvent::DataSent {
                id,
                value: json!([{"id": 1}])
            }
        );
        let sessions = handle.get_connections().await;
        assert_eq!(sessions[0].messages_sent, 1);
    }

    #[tokio::test]
    async fn test_send_data_applies_transform() {
        let (_dir, handle) = handle_with(r#"{"user":{"id":1}}"#);
        let (id, mut rx) = register(&handle, "/user").await;

        handle
            .send_data(id, Some(&Transform::merge(json!({"id": 2}))))
            .await;

        assert_eq!(expect_text(&mut rx), json!({"id": 2}));
    }

    #[tokio::test]
    async fn test_send_data_unknown_session_is_noop() {
        let (_dir, handle) = handle_with("{}");
        let mut events = handle.subscribe();

        handle.send_data(7, None).await;

        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_data_failure_becomes_error_event() {
        let (_dir, handle) = handle_with("{broken");
        let mut events = handle.subscribe();
        let (id, mut rx) = register(&handle, "/").await;

        handle.send_data(id, None).await;

        match events.try_recv().unwrap() {
            ServerEvent::Error { id: failed, .. } => assert_eq!(failed, id),
            other => panic!("expected error event, got {:?}", other),
        }
        assert!(rx.try_recv().is_err());
        assert_eq!(handle.connection_count().await, 1);
        assert_eq!(handle.get_connections().await[0].messages_sent, 0);
    }

    #[tokio::test]
    async fn test_send_to_dropped_transport_reports_error() {
        let (_dir, handle) = handle_with("{}");
        let mut events = handle.subscribe();
        let (id, rx) = register(&handle, "/").await;
        drop(rx);

        handle.send_data(id, None).await;

        assert!(matches!(
            events.try_recv().unwrap(),
            ServerEvent::Error { .. }
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sends_are_queued_in_call_order() {
        let (_dir, handle) = handle_with(r#"{"n":0}"#);
        let (id, mut rx) = register(&handle, "/").await;

        // Earlier sends carry bigger payloads, so they take longer to prepare.
        let transforms: Vec<Transform> = (0..8)
            .map(|n| Transform::raw(json!({ "n": n, "pad": "x".repeat((8 - n) * 200_000) })))
            .collect();
        join_all(transforms.iter().map(|t| handle.send_data(id, Some(t)))).await;

        for n in 0..8 {
            assert_eq!(expect_text(&mut rx)["n"], json!(n));
        }
    }

    #[tokio::test]
    async fn test_close_connection_queues_close_without_removing() {
        let (_dir, handle) = handle_with("{}");
        let (id, mut rx) = register(&handle, "/").await;

        handle.close_connection(id).await;

        assert!(matches!(rx.try_recv(), Ok(Outbound::Close)));
        assert_eq!(handle.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_update_db_value_is_visible_to_next_send() {
        let (_dir, handle) = handle_with(r#"{"settings":{}}"#);
        let (id, mut rx) = register(&handle, "/settings").await;

        handle
            .update_db_value("settings.theme", json!("dark"))
            .await
            .unwrap();
        handle.send_data(id, None).await;

        assert_eq!(expect_text(&mut rx), json!({"theme": "dark"}));
    }

    #[tokio::test]
    async fn test_db_content_round_trip() {
        let (_dir, handle) = handle_with("{}");
        handle.save_db_content("{\"k\": [1]}").await.unwrap();
        assert_eq!(handle.get_db_content().await.unwrap(), "{\"k\": [1]}");
    }
}
