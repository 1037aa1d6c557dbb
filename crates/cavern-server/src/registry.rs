use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc;

/// Process-local identifier for one live WebSocket connection.
pub type ConnectionId = u64;

/// Outbound channel to one connection's writer task. Fan-out uses
/// `try_send`, so a recipient with a full queue is skipped, never awaited.
pub type OutboundSender = mpsc::Sender<Utf8Bytes>;

/// One live connection's registry entry.
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    pub sender: OutboundSender,
    /// Code of the room the connection currently belongs to, if any. A
    /// routing back-reference only; the room owns the membership.
    pub room: Option<String>,
    pub display_name: Option<String>,
}

/// Maps each live connection to its outbound channel, current room, and
/// display name.
///
/// Populated when a socket is accepted, cleared when it goes away. Passed by
/// reference to everything that needs it; nothing reads it as a global.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    conns: Mutex<HashMap<ConnectionId, ConnectionEntry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly accepted connection, allocating its id.
    pub fn register(&self, sender: OutboundSender) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let entry = ConnectionEntry {
            sender,
            room: None,
            display_name: None,
        };
        self.conns.lock().unwrap().insert(id, entry);
        id
    }

    /// Drop a connection's entry. Idempotent.
    pub fn unregister(&self, id: ConnectionId) {
        self.conns.lock().unwrap().remove(&id);
    }

    pub fn sender_of(&self, id: ConnectionId) -> Option<OutboundSender> {
        self.conns.lock().unwrap().get(&id).map(|e| e.sender.clone())
    }

    /// The room this connection currently belongs to, if any.
    pub fn room_of(&self, id: ConnectionId) -> Option<String> {
        self.conns.lock().unwrap().get(&id).and_then(|e| e.room.clone())
    }

    pub fn display_name_of(&self, id: ConnectionId) -> Option<String> {
        self.conns
            .lock()
            .unwrap()
            .get(&id)
            .and_then(|e| e.display_name.clone())
    }

    /// Record a successful create/join: the connection now belongs to `room`.
    pub fn set_membership(&self, id: ConnectionId, room: &str, display_name: &str) {
        if let Some(entry) = self.conns.lock().unwrap().get_mut(&id) {
            entry.room = Some(room.to_string());
            entry.display_name = Some(display_name.to_string());
        }
    }

    /// Clear the connection's room back-reference. The display name sticks
    /// until the next create/join.
    pub fn clear_membership(&self, id: ConnectionId) {
        if let Some(entry) = self.conns.lock().unwrap().get_mut(&id) {
            entry.room = None;
        }
    }

    /// Clear the back-reference only if it still points at `room`; used when
    /// a room is torn down underneath its members, so a member that already
    /// moved on is left alone.
    pub fn clear_membership_if(&self, id: ConnectionId, room: &str) {
        if let Some(entry) = self.conns.lock().unwrap().get_mut(&id)
            && entry.room.as_deref() == Some(room)
        {
            entry.room = None;
        }
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.conns.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_sender() -> OutboundSender {
        mpsc::channel(8).0
    }

    #[test]
    fn register_allocates_distinct_ids() {
        let registry = ConnectionRegistry::new();
        let a = registry.register(make_sender());
        let b = registry.register(make_sender());
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn membership_roundtrip() {
        let registry = ConnectionRegistry::new();
        let id = registry.register(make_sender());
        assert_eq!(registry.room_of(id), None);

        registry.set_membership(id, "4f2a9c1b", "alice");
        assert_eq!(registry.room_of(id).as_deref(), Some("4f2a9c1b"));
        assert_eq!(registry.display_name_of(id).as_deref(), Some("alice"));

        registry.clear_membership(id);
        assert_eq!(registry.room_of(id), None);
        // Name survives leaving; it belongs to the connection, not the room
        assert_eq!(registry.display_name_of(id).as_deref(), Some("alice"));
    }

    #[test]
    fn conditional_clear_leaves_other_rooms_alone() {
        let registry = ConnectionRegistry::new();
        let id = registry.register(make_sender());
        registry.set_membership(id, "4f2a9c1b", "alice");

        registry.clear_membership_if(id, "deadbeef");
        assert_eq!(registry.room_of(id).as_deref(), Some("4f2a9c1b"));

        registry.clear_membership_if(id, "4f2a9c1b");
        assert_eq!(registry.room_of(id), None);
    }

    #[test]
    fn unregister_removes_entry() {
        let registry = ConnectionRegistry::new();
        let id = registry.register(make_sender());
        registry.unregister(id);
        assert!(registry.sender_of(id).is_none());
        assert!(registry.is_empty());
        // Second unregister is a no-op
        registry.unregister(id);
    }
}
