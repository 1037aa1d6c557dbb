use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use cavern_core::room::generate_room_code;

use crate::registry::{ConnectionId, OutboundSender};
use crate::room::{Room, RoomAccess};

/// Attempts at a fresh code before giving up. With 16^8 possible codes this
/// only trips when the space is effectively exhausted.
const MAX_CODE_ATTEMPTS: usize = 32;

#[derive(Debug)]
pub enum StoreError {
    CodeSpaceExhausted,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CodeSpaceExhausted => write!(f, "could not generate an unused room code"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Owns every active room, keyed by room code.
///
/// Store sections are short map operations. No room-level work happens while
/// the store lock is held: lookups clone the `Arc` and release first, and
/// destruction relies on the room's own tombstone to settle races.
#[derive(Default)]
pub struct RoomStore {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
}

impl RoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a room with `creator` as sole member and admin.
    pub fn create(
        &self,
        creator: ConnectionId,
        display_name: String,
        sender: OutboundSender,
    ) -> Result<(String, Arc<Room>), StoreError> {
        let mut rooms = self.rooms.write().unwrap();
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = generate_room_code();
            if rooms.contains_key(&code) {
                continue;
            }
            let room = Arc::new(Room::new(code.clone(), creator, display_name, sender));
            rooms.insert(code.clone(), Arc::clone(&room));
            return Ok((code, room));
        }
        Err(StoreError::CodeSpaceExhausted)
    }

    /// Look up a room by code. Absence is the normal answer for stale or
    /// mistyped codes.
    pub fn get(&self, code: &str) -> Option<Arc<Room>> {
        self.rooms.read().unwrap().get(code).cloned()
    }

    /// Remove a room. Idempotent; absent codes are a no-op.
    pub fn destroy(&self, code: &str) {
        self.rooms.write().unwrap().remove(code);
    }

    /// Number of active rooms.
    pub fn len(&self) -> usize {
        self.rooms.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All rooms at this instant, for the idle reaper.
    pub fn snapshot(&self) -> Vec<(String, Arc<Room>)> {
        self.rooms
            .read()
            .unwrap()
            .iter()
            .map(|(code, room)| (code.clone(), Arc::clone(room)))
            .collect()
    }

    /// `(rooms, members)` occupancy snapshot for the health endpoint.
    pub fn stats(&self) -> (usize, usize) {
        let rooms = self.snapshot();
        let mut members = 0;
        for (_, room) in &rooms {
            if let RoomAccess::Live(inner) = room.access() {
                members += inner.users_count();
            }
        }
        (rooms.len(), members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cavern_core::room::is_valid_room_code;
    use tokio::sync::mpsc;

    fn make_sender() -> OutboundSender {
        mpsc::channel(8).0
    }

    #[test]
    fn create_registers_room_with_valid_code() {
        let store = RoomStore::new();
        let (code, room) = store.create(1, "alice".to_string(), make_sender()).unwrap();
        assert!(is_valid_room_code(&code), "unexpected code shape: {code}");
        assert_eq!(store.len(), 1);

        match room.access() {
            RoomAccess::Live(inner) => {
                assert_eq!(inner.users_count(), 1);
                assert_eq!(inner.admin_id(), 1);
            },
            _ => panic!("expected live room"),
        }
        assert!(store.get(&code).is_some());
    }

    #[test]
    fn created_codes_do_not_collide() {
        let store = RoomStore::new();
        for i in 0..50 {
            store.create(i, format!("user{i}"), make_sender()).unwrap();
        }
        assert_eq!(store.len(), 50);
    }

    #[test]
    fn get_unknown_code_is_none() {
        let store = RoomStore::new();
        assert!(store.get("4f2a9c1b").is_none());
    }

    #[test]
    fn destroy_is_idempotent() {
        let store = RoomStore::new();
        let (code, _room) = store.create(1, "alice".to_string(), make_sender()).unwrap();
        store.destroy(&code);
        assert!(store.is_empty());
        store.destroy(&code);
        assert!(store.is_empty());
    }

    #[test]
    fn stats_count_rooms_and_members() {
        let store = RoomStore::new();
        let (_, room) = store.create(1, "alice".to_string(), make_sender()).unwrap();
        store.create(2, "bob".to_string(), make_sender()).unwrap();

        if let RoomAccess::Live(mut inner) = room.access() {
            inner.join(3, "carol".to_string(), make_sender(), 50).unwrap();
        } else {
            panic!("expected live room");
        }

        assert_eq!(store.stats(), (2, 3));
    }
}
