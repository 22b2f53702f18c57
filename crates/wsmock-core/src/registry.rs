//! Registry of live sessions.
//!
//! The registry is the single source of truth for which sessions exist and
//! how active they have been. It is generic over the transport handle so the
//! server can store its outbound queue next to each session while tests use
//! a plain value.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Unique identifier of a session. Starts at 1 and is never reused.
pub type SessionId = u64;

/// Activity metadata of one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    /// Request path captured when the connection was accepted.
    pub path: String,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub messages_sent: u64,
    pub messages_received: u64,
}

/// Partial update of a session's metadata; `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionMetadataUpdate {
    pub messages_sent: Option<u64>,
    pub messages_received: Option<u64>,
    pub last_activity: Option<DateTime<Utc>>,
}

struct Entry<T> {
    session: Session,
    transport: T,
}

/// Table of active sessions keyed by id.
pub struct ConnectionRegistry<T> {
    entries: HashMap<SessionId, Entry<T>>,
    next_id: SessionId,
}

impl<T> Default for ConnectionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ConnectionRegistry<T> {
    /// Creates an empty registry whose first id will be 1.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_id: 1,
        }
    }

    /// Registers a new session and returns its id.
    pub fn add(&mut self, transport: T, path: impl Into<String>) -> SessionId {
        let id = self.next_id;
        self.next_id += 1;

        let now = Utc::now();
        let session = Session {
            id,
            path: path.into(),
            connected_at: now,
            last_activity: now,
            messages_sent: 0,
            messages_received: 0,
        };
        self.entries.insert(id, Entry { session, transport });
        id
    }

    /// Removes a session. Unknown ids are ignored.
    pub fn remove(&mut self, id: SessionId) -> Option<(Session, T)> {
        self.entries
            .remove(&id)
            .map(|entry| (entry.session, entry.transport))
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.entries.get(&id).map(|entry| &entry.session)
    }

    pub fn transport(&self, id: SessionId) -> Option<&T> {
        self.entries.get(&id).map(|entry| &entry.transport)
    }

    /// Snapshot of every present session, in no particular order.
    pub fn get_all(&self) -> Vec<Session> {
        self.entries
            .values()
            .map(|entry| entry.session.clone())
            .collect()
    }

    /// Every transport currently registered.
    pub fn transports(&self) -> impl Iterator<Item = (SessionId, &T)> {
        self.entries.iter().map(|(id, entry)| (*id, &entry.transport))
    }

    /// Applies a partial metadata update. Unknown ids are ignored.
    pub fn update_metadata(&mut self, id: SessionId, update: SessionMetadataUpdate) {
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        let session = &mut entry.session;

        if let Some(sent) = update.messages_sent {
            session.messages_sent = sent;
        }
        if let Some(received) = update.messages_received {
            session.messages_received = received;
        }
        if let Some(at) = update.last_activity {
            session.last_activity = at;
        }
    }

    /// Counts one outbound message and touches `last_activity`.
    pub fn record_sent(&mut self, id: SessionId) {
        if let Some(session) = self.get(id) {
            let update = SessionMetadataUpdate {
                messages_sent: Some(session.messages_sent + 1),
                last_activity: Some(Utc::now()),
                ..Default::default()
            };
            self.update_metadata(id, update);
        }
    }

    /// Counts one inbound message and touches `last_activity`.
    pub fn record_received(&mut self, id: SessionId) {
        if let Some(session) = self.get(id) {
            let update = SessionMetadataUpdate {
                messages_received: Some(session.messages_received + 1),
                last_activity: Some(Utc::now()),
                ..Default::default()
            };
            self.update_metadata(id, update);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_add_assigns_increasing_ids() {
        let mut registry = ConnectionRegistry::new();
        let first = registry.add((), "/a");
        let second = registry.add((), "/b");

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_new_session_starts_clean() {
        let mut registry = ConnectionRegistry::new();
        let id = registry.add("transport", "/api/v1/users");
        let session = registry.get(id).unwrap();

        assert_eq!(session.path, "/api/v1/users");
        assert_eq!(session.messages_sent, 0);
        assert_eq!(session.messages_received, 0);
        assert_eq!(session.connected_at, session.last_activity);
        assert_eq!(registry.transport(id), Some(&"transport"));
    }

    #[test]
    fn test_ids_are_not_reused_after_remove() {
        let mut registry = ConnectionRegistry::new();
        let first = registry.add((), "/");
        registry.remove(first);
        let second = registry.add((), "/");

        assert_eq!(second, 2);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = ConnectionRegistry::new();
        let keep = registry.add((), "/keep");
        let gone = registry.add((), "/gone");

        assert!(registry.remove(gone).is_some());
        assert!(registry.remove(gone).is_none());
        assert!(registry.remove(999).is_none());

        assert_eq!(registry.len(), 1);
        assert!(registry.get(keep).is_some());
    }

    #[test]
    fn test_get_all_has_no_duplicates() {
        let mut registry = ConnectionRegistry::new();
        for path in ["/a", "/b", "/c"] {
            registry.add((), path);
        }
        registry.remove(2);

        let mut ids: Vec<_> = registry.get_all().iter().map(|s| s.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_update_metadata_is_partial() {
        let mut registry = ConnectionRegistry::new();
        let id = registry.add((), "/");
        let before = registry.get(id).unwrap().clone();
        let later = before.last_activity + Duration::seconds(5);

        registry.update_metadata(
            id,
            SessionMetadataUpdate {
                messages_received: Some(3),
                last_activity: Some(later),
                ..Default::default()
            },
        );

        let after = registry.get(id).unwrap();
        assert_eq!(after.messages_received, 3);
        assert_eq!(after.messages_sent, before.messages_sent);
        assert_eq!(after.last_activity, later);
        assert_eq!(after.connected_at, before.connected_at);
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let mut registry: ConnectionRegistry<()> = ConnectionRegistry::new();
        registry.update_metadata(
            42,
            SessionMetadataUpdate {
                messages_sent: Some(1),
                ..Default::default()
            },
        );
        registry.record_sent(42);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_record_counters() {
        let mut registry = ConnectionRegistry::new();
        let id = registry.add((), "/");

        registry.record_sent(id);
        registry.record_sent(id);
        registry.record_received(id);

        let session = registry.get(id).unwrap();
        assert_eq!(session.messages_sent, 2);
        assert_eq!(session.messages_received, 1);
        assert!(session.last_activity >= session.connected_at);
    }

    #[test]
    fn test_session_serializes_camel_case() {
        let mut registry = ConnectionRegistry::new();
        let id = registry.add((), "/x");
        let json = serde_json::to_value(registry.get(id).unwrap()).unwrap();

        assert_eq!(json["id"], 1);
        assert_eq!(json["messagesSent"], 0);
        assert!(json.get("connectedAt").is_some());
    }
}
