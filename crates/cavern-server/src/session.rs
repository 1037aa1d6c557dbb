use std::sync::Arc;
use std::time::Duration;

use cavern_core::events::{ClientEvent, ServerEvent};
use cavern_core::room::is_valid_room_code;

use crate::config::ServerConfig;
use crate::registry::{ConnectionId, ConnectionRegistry};
use crate::room::{LeaveOutcome, RoomAccess, RoomError, encoded};
use crate::store::RoomStore;

/// Longest accepted display name, in bytes.
const MAX_USERNAME_LEN: usize = 32;
/// Longest accepted message content, in bytes.
const MAX_CONTENT_LEN: usize = 1024;

/// Everything that can go wrong handling an inbound event. Recovered at the
/// coordinator boundary and turned into a single `error{message}` wire event;
/// never crosses a room boundary and never kills the connection.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionError {
    Validation(String),
    NotFound,
    NotAMember,
    Forbidden,
    RoomFull,
    Operational,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "{msg}"),
            Self::NotFound => write!(f, "Room not found"),
            Self::NotAMember => write!(f, "User not in a room"),
            Self::Forbidden => write!(f, "Only the room admin can close the room"),
            Self::RoomFull => write!(f, "Room is full"),
            Self::Operational => write!(f, "Internal server error"),
        }
    }
}

impl From<RoomError> for SessionError {
    fn from(e: RoomError) -> Self {
        match e {
            RoomError::Full => Self::RoomFull,
            RoomError::NotAMember => Self::NotAMember,
            RoomError::Forbidden => Self::Forbidden,
        }
    }
}

/// Entry point for every inbound client event.
///
/// Validates, routes to the right room, and answers the requester. Handlers
/// are synchronous: they take locks, never await, and finish each event's
/// fan-out before returning, so a connection's dispatch order is the order
/// its effects land in rooms.
pub struct SessionCoordinator {
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomStore>,
    config: Arc<ServerConfig>,
}

impl SessionCoordinator {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        rooms: Arc<RoomStore>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            registry,
            rooms,
            config,
        }
    }

    /// Fixed dispatch table: one arm per inbound event type.
    pub fn dispatch(&self, conn: ConnectionId, event: ClientEvent) {
        let result = match event {
            ClientEvent::CreateRoom { username } => self.create_room(conn, &username),
            ClientEvent::JoinRoom { room_id, username } => {
                self.join_room(conn, &room_id, &username)
            },
            ClientEvent::Message { room_id, content } => {
                self.post_message(conn, &room_id, &content)
            },
            ClientEvent::Typing { room_id, is_typing } => {
                self.set_typing(conn, &room_id, is_typing)
            },
            ClientEvent::LeaveRoom => {
                self.leave_room(conn);
                Ok(())
            },
            ClientEvent::CloseRoom => self.close_room(conn),
        };
        if let Err(e) = result {
            self.report(conn, e);
        }
    }

    /// Transport-level disconnect runs the same leave path as an explicit
    /// `leave_room`; the registry entry itself is dropped by the socket task.
    pub fn handle_disconnect(&self, conn: ConnectionId) {
        self.leave_room(conn);
    }

    fn create_room(&self, conn: ConnectionId, username: &str) -> Result<(), SessionError> {
        let name = validate_username(username)?;
        if self.registry.room_of(conn).is_some() {
            return Err(SessionError::Validation("Already in a room".to_string()));
        }
        let Some(sender) = self.registry.sender_of(conn) else {
            return Ok(()); // connection already gone; no one to answer
        };
        let (code, room) = match self.rooms.create(conn, name.clone(), sender) {
            Ok(created) => created,
            Err(e) => {
                tracing::error!(error = %e, "Room creation failed");
                return Err(SessionError::Operational);
            },
        };
        match room.access() {
            RoomAccess::Live(inner) => {
                self.registry.set_membership(conn, &code, &name);
                inner.send_to(
                    conn,
                    &ServerEvent::RoomCreated {
                        room_id: code.clone(),
                        admin: true,
                    },
                );
            },
            // A freshly created room cannot be closed or poisoned yet
            _ => return Err(SessionError::Operational),
        }
        tracing::info!(conn, room = %code, "Room created");
        Ok(())
    }

    fn join_room(
        &self,
        conn: ConnectionId,
        room_id: &str,
        username: &str,
    ) -> Result<(), SessionError> {
        let name = validate_username(username)?;
        if self.registry.room_of(conn).is_some() {
            return Err(SessionError::Validation("Already in a room".to_string()));
        }
        if !is_valid_room_code(room_id) {
            return Err(SessionError::Validation("Invalid room code".to_string()));
        }
        let Some(room) = self.rooms.get(room_id) else {
            return Err(SessionError::NotFound);
        };
        let Some(sender) = self.registry.sender_of(conn) else {
            return Ok(());
        };
        match room.access() {
            RoomAccess::Live(mut inner) => {
                let users_count =
                    inner.join(conn, name.clone(), sender, self.config.rooms.max_members)?;
                // Membership is recorded while the room lock is held so a
                // concurrent close cannot sweep past a half-joined member
                self.registry.set_membership(conn, room_id, &name);
                drop(inner);
                tracing::info!(conn, room = room_id, users_count, "User joined room");
                Ok(())
            },
            RoomAccess::Closed => Err(SessionError::NotFound),
            RoomAccess::Faulted(ids) => {
                self.reap_faulted(room_id, &ids);
                Err(SessionError::NotFound)
            },
        }
    }

    fn post_message(
        &self,
        conn: ConnectionId,
        room_id: &str,
        content: &str,
    ) -> Result<(), SessionError> {
        let content = validate_content(content)?;
        let Some(room) = self.rooms.get(room_id) else {
            return Err(SessionError::NotFound);
        };
        match self.registry.room_of(conn) {
            Some(current) if current == room_id => {},
            _ => return Err(SessionError::NotAMember),
        }
        match room.access() {
            RoomAccess::Live(mut inner) => {
                inner.post_message(conn, content)?;
                Ok(())
            },
            RoomAccess::Closed => {
                self.registry.clear_membership_if(conn, room_id);
                Err(SessionError::NotFound)
            },
            RoomAccess::Faulted(ids) => {
                self.reap_faulted(room_id, &ids);
                Err(SessionError::Operational)
            },
        }
    }

    fn set_typing(
        &self,
        conn: ConnectionId,
        room_id: &str,
        is_typing: bool,
    ) -> Result<(), SessionError> {
        // Advisory presence: typing from outside the room is dropped, never
        // answered — there is no listener for an ack on the other side
        match self.registry.room_of(conn) {
            Some(current) if current == room_id => {},
            _ => return Ok(()),
        }
        let Some(room) = self.rooms.get(room_id) else {
            return Ok(());
        };
        match room.access() {
            RoomAccess::Live(mut inner) => {
                if inner.set_typing(conn, is_typing).is_err() {
                    tracing::debug!(conn, room = room_id, "Typing from non-member dropped");
                }
                Ok(())
            },
            RoomAccess::Closed => Ok(()),
            RoomAccess::Faulted(ids) => {
                self.reap_faulted(room_id, &ids);
                Ok(())
            },
        }
    }

    /// Leave the caller's current room, if any. Idempotent by design: the
    /// disconnect path calls this too, and a leave that already happened
    /// must not produce a second `user_left`.
    fn leave_room(&self, conn: ConnectionId) {
        let Some(code) = self.registry.room_of(conn) else {
            return;
        };
        let Some(room) = self.rooms.get(&code) else {
            self.registry.clear_membership(conn);
            return;
        };
        match room.access() {
            RoomAccess::Live(mut inner) => {
                let outcome = inner.leave(conn);
                self.registry.clear_membership(conn);
                match outcome {
                    LeaveOutcome::Emptied => {
                        let lifetime = inner.created_at().elapsed();
                        drop(inner);
                        self.rooms.destroy(&code);
                        tracing::info!(
                            room = %code,
                            lifetime_secs = lifetime.as_secs(),
                            "Room destroyed (last member left)"
                        );
                    },
                    LeaveOutcome::Left { users_count } => {
                        drop(inner);
                        tracing::info!(conn, room = %code, users_count, "User left room");
                    },
                    LeaveOutcome::NotAMember => {},
                }
            },
            RoomAccess::Closed => self.registry.clear_membership(conn),
            RoomAccess::Faulted(ids) => {
                self.reap_faulted(&code, &ids);
                self.registry.clear_membership(conn);
            },
        }
    }

    fn close_room(&self, conn: ConnectionId) -> Result<(), SessionError> {
        let Some(code) = self.registry.room_of(conn) else {
            return Err(SessionError::NotAMember);
        };
        let Some(room) = self.rooms.get(&code) else {
            self.registry.clear_membership(conn);
            return Err(SessionError::NotFound);
        };
        match room.access() {
            RoomAccess::Live(mut inner) => {
                let members = inner.close(conn)?;
                for &m in &members {
                    self.registry.clear_membership_if(m, &code);
                }
                let lifetime = inner.created_at().elapsed();
                drop(inner);
                self.rooms.destroy(&code);
                tracing::info!(
                    conn,
                    room = %code,
                    lifetime_secs = lifetime.as_secs(),
                    "Room closed by admin"
                );
                Ok(())
            },
            RoomAccess::Closed => {
                self.registry.clear_membership_if(conn, &code);
                Err(SessionError::NotFound)
            },
            RoomAccess::Faulted(ids) => {
                self.reap_faulted(&code, &ids);
                Err(SessionError::Operational)
            },
        }
    }

    /// Destroy rooms idle for at least `max_idle`, notifying any members.
    /// Returns the number of rooms reaped.
    pub fn reap_idle(&self, max_idle: Duration) -> usize {
        let mut reaped = 0;
        for (code, room) in self.rooms.snapshot() {
            match room.access() {
                RoomAccess::Live(mut inner) => {
                    if inner.last_activity().elapsed() < max_idle {
                        continue;
                    }
                    let members = inner.expire();
                    for &m in &members {
                        self.registry.clear_membership_if(m, &code);
                    }
                    drop(inner);
                    self.rooms.destroy(&code);
                    reaped += 1;
                    tracing::info!(room = %code, members = members.len(), "Idle room expired");
                },
                RoomAccess::Closed => self.rooms.destroy(&code),
                RoomAccess::Faulted(ids) => self.reap_faulted(&code, &ids),
            }
        }
        reaped
    }

    /// Finish tearing down a faulted room: sweep registry back-references
    /// and drop it from the store. The room already notified its members.
    fn reap_faulted(&self, code: &str, members: &[ConnectionId]) {
        for &m in members {
            self.registry.clear_membership_if(m, code);
        }
        self.rooms.destroy(code);
    }

    /// Convert a failure into a single `error` event for the requester.
    fn report(&self, conn: ConnectionId, error: SessionError) {
        if error == SessionError::Operational {
            tracing::error!(conn, "Internal failure surfaced to client");
        } else {
            tracing::debug!(conn, error = %error, "Rejected client event");
        }
        self.send_to(
            conn,
            &ServerEvent::Error {
                message: error.to_string(),
            },
        );
    }

    /// Push one event onto a connection's outbound queue, non-blocking.
    fn send_to(&self, conn: ConnectionId, event: &ServerEvent) {
        let Some(sender) = self.registry.sender_of(conn) else {
            return;
        };
        let Some(frame) = encoded(event) else { return };
        if let Err(e) = sender.try_send(frame) {
            tracing::debug!(conn, error = %e, "Failed to queue event (slow or disconnected)");
        }
    }
}

fn validate_username(username: &str) -> Result<String, SessionError> {
    let name = username.trim().to_string();
    if name.is_empty() {
        return Err(SessionError::Validation("Username is required".to_string()));
    }
    if name.len() > MAX_USERNAME_LEN || name.chars().any(|c| c.is_control()) {
        return Err(SessionError::Validation("Invalid username".to_string()));
    }
    Ok(name)
}

fn validate_content(content: &str) -> Result<&str, SessionError> {
    if content.trim().is_empty() {
        return Err(SessionError::Validation(
            "Message cannot be empty".to_string(),
        ));
    }
    if content.len() > MAX_CONTENT_LEN {
        return Err(SessionError::Validation("Message too long".to_string()));
    }
    if content.chars().any(|c| c.is_control() && c != '\n') {
        return Err(SessionError::Validation(
            "Message contains control characters".to_string(),
        ));
    }
    Ok(content)
}
