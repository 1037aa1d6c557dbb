use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::ServerConfig;
use crate::registry::ConnectionRegistry;
use crate::session::SessionCoordinator;
use crate::store::RoomStore;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub rooms: Arc<RoomStore>,
    pub sessions: Arc<SessionCoordinator>,
    pub config: Arc<ServerConfig>,
    pub ws_connection_count: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomStore::new());
        let sessions = Arc::new(SessionCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&rooms),
            Arc::clone(&config),
        ));
        Self {
            registry,
            rooms,
            sessions,
            config,
            ws_connection_count: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// RAII guard for a connection-count slot: counts up on accept, back down
/// when the socket task ends, however it ends.
pub struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    pub fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self { counter }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}
