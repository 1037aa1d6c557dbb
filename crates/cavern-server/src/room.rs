use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use axum::extract::ws::Utf8Bytes;

use cavern_core::events::ServerEvent;
use cavern_core::protocol::encode_server_event;
use cavern_core::time::timestamp_now;

use crate::registry::{ConnectionId, OutboundSender};

/// One room member. Owned exclusively by its room; vector order is join
/// order, which decides admin succession.
pub struct Member {
    pub id: ConnectionId,
    pub display_name: String,
    pub joined_at: Instant,
    sender: OutboundSender,
}

/// Why a room refused a mutation.
#[derive(Debug, PartialEq, Eq)]
pub enum RoomError {
    Full,
    NotAMember,
    Forbidden,
}

/// What a leave did to the room.
#[derive(Debug, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The connection was not a member; nothing changed, nothing was sent.
    NotAMember,
    /// Members remain; they were told.
    Left { users_count: usize },
    /// The last member left. The room marked itself closed; the caller must
    /// drop it from the store.
    Emptied,
}

/// Result of locking a room for a mutation.
pub enum RoomAccess<'a> {
    Live(MutexGuard<'a, RoomInner>),
    /// Emptied, closed, or expired; treat like a missing room.
    Closed,
    /// A panic poisoned the lock. The room has already been torn down here:
    /// members got `room_closed`, and the returned ids still need their
    /// registry back-references cleared. The caller destroys the room.
    Faulted(Vec<ConnectionId>),
}

/// A single chat room: the unit of concurrency.
///
/// Every mutation locks the inner state and broadcasts its outbound events
/// before releasing, so all members observe one order of joins, leaves, and
/// messages. Nothing inside the lock awaits; sends are `try_send`.
pub struct Room {
    inner: Mutex<RoomInner>,
}

pub struct RoomInner {
    code: String,
    members: Vec<Member>,
    admin_id: ConnectionId,
    created_at: Instant,
    last_activity: Instant,
    /// Advisory presence: the member currently typing, last writer wins.
    typing_by: Option<ConnectionId>,
    /// Tombstone. A racing lookup that still holds the `Arc` observes this
    /// and treats the room as gone.
    closed: bool,
}

impl Room {
    /// Create a room with its creator as sole member and admin.
    pub fn new(
        code: String,
        creator: ConnectionId,
        display_name: String,
        sender: OutboundSender,
    ) -> Self {
        let now = Instant::now();
        Self {
            inner: Mutex::new(RoomInner {
                code,
                members: vec![Member {
                    id: creator,
                    display_name,
                    joined_at: now,
                    sender,
                }],
                admin_id: creator,
                created_at: now,
                last_activity: now,
                typing_by: None,
                closed: false,
            }),
        }
    }

    /// Lock the room for a mutation.
    ///
    /// A poisoned lock means a bug corrupted this room's state mid-mutation.
    /// The fault stays contained to this one room: remaining members are
    /// notified with `room_closed` and the room is tombstoned, leaving every
    /// other room untouched.
    pub fn access(&self) -> RoomAccess<'_> {
        match self.inner.lock() {
            Ok(inner) if inner.closed => RoomAccess::Closed,
            Ok(inner) => RoomAccess::Live(inner),
            Err(poisoned) => {
                let mut inner = poisoned.into_inner();
                if inner.closed {
                    return RoomAccess::Faulted(Vec::new());
                }
                tracing::error!(room = %inner.code, "Room lock poisoned, tearing the room down");
                let ids = inner.expire();
                RoomAccess::Faulted(ids)
            },
        }
    }
}

impl RoomInner {
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn users_count(&self) -> usize {
        self.members.len()
    }

    pub fn admin_id(&self) -> ConnectionId {
        self.admin_id
    }

    pub fn is_member(&self, id: ConnectionId) -> bool {
        self.members.iter().any(|m| m.id == id)
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Display name of the member currently typing, if any.
    pub fn typing_display_name(&self) -> Option<&str> {
        self.typing_by
            .and_then(|id| self.member(id))
            .map(|m| m.display_name.as_str())
    }

    fn member(&self, id: ConnectionId) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    fn member_ids(&self) -> Vec<ConnectionId> {
        self.members.iter().map(|m| m.id).collect()
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Add a member. The joiner gets `joined_room`, everyone else gets
    /// `user_joined`; the joiner never sees its own arrival as a broadcast.
    pub fn join(
        &mut self,
        id: ConnectionId,
        display_name: String,
        sender: OutboundSender,
        max_members: usize,
    ) -> Result<usize, RoomError> {
        if self.members.len() >= max_members {
            return Err(RoomError::Full);
        }
        self.members.push(Member {
            id,
            display_name: display_name.clone(),
            joined_at: Instant::now(),
            sender,
        });
        self.touch();
        let users_count = self.members.len();
        self.send_to(
            id,
            &ServerEvent::JoinedRoom {
                room_id: self.code.clone(),
                admin: false,
                users_count,
            },
        );
        self.broadcast_except(
            id,
            &ServerEvent::UserJoined {
                room_id: self.code.clone(),
                username: display_name,
                users_count,
            },
        );
        Ok(users_count)
    }

    /// Remove a member if present. Remaining members are told; if the
    /// departing member was admin, the longest-standing member is promoted.
    pub fn leave(&mut self, id: ConnectionId) -> LeaveOutcome {
        let Some(pos) = self.members.iter().position(|m| m.id == id) else {
            return LeaveOutcome::NotAMember;
        };
        let member = self.members.remove(pos);
        if self.typing_by == Some(id) {
            self.typing_by = None;
        }
        if self.members.is_empty() {
            self.closed = true;
            return LeaveOutcome::Emptied;
        }
        self.touch();
        let users_count = self.members.len();
        self.broadcast_all(&ServerEvent::UserLeft {
            room_id: self.code.clone(),
            username: member.display_name,
            users_count,
        });
        if self.admin_id == id
            && let Some(next) = self.members.first()
        {
            self.admin_id = next.id;
            self.broadcast_all(&ServerEvent::AdminChanged {
                room_id: self.code.clone(),
            });
        }
        LeaveOutcome::Left { users_count }
    }

    /// Accept a message into the room's total order and fan it out to every
    /// member, the sender included — all viewpoints share one order.
    pub fn post_message(&mut self, id: ConnectionId, content: &str) -> Result<(), RoomError> {
        let Some(member) = self.member(id) else {
            return Err(RoomError::NotAMember);
        };
        let username = member.display_name.clone();
        self.touch();
        self.broadcast_all(&ServerEvent::Message {
            room_id: self.code.clone(),
            username,
            content: content.to_string(),
            timestamp: timestamp_now(),
        });
        Ok(())
    }

    /// Update the advisory typing indicator and tell the other members.
    pub fn set_typing(&mut self, id: ConnectionId, is_typing: bool) -> Result<(), RoomError> {
        let Some(member) = self.member(id) else {
            return Err(RoomError::NotAMember);
        };
        let username = member.display_name.clone();
        self.typing_by = if is_typing { Some(id) } else { None };
        self.touch();
        self.broadcast_except(
            id,
            &ServerEvent::Typing {
                room_id: self.code.clone(),
                username,
                is_typing,
            },
        );
        Ok(())
    }

    /// Admin-only close: everyone (the admin included) gets `room_closed`,
    /// then the room is tombstoned. Returns the former member ids so the
    /// caller can clear registry back-references.
    pub fn close(&mut self, initiator: ConnectionId) -> Result<Vec<ConnectionId>, RoomError> {
        if !self.is_member(initiator) {
            return Err(RoomError::NotAMember);
        }
        if initiator != self.admin_id {
            return Err(RoomError::Forbidden);
        }
        Ok(self.expire())
    }

    /// Unconditional teardown: notify all members, clear them, tombstone.
    /// Shared by admin close, idle expiry, and poison recovery.
    pub fn expire(&mut self) -> Vec<ConnectionId> {
        self.broadcast_all(&ServerEvent::RoomClosed {
            room_id: self.code.clone(),
        });
        let ids = self.member_ids();
        self.members.clear();
        self.typing_by = None;
        self.closed = true;
        ids
    }

    /// Send one event to one member, non-blocking.
    pub fn send_to(&self, id: ConnectionId, event: &ServerEvent) {
        let Some(frame) = encoded(event) else { return };
        if let Some(member) = self.member(id)
            && let Err(e) = member.sender.try_send(frame)
        {
            tracing::debug!(
                conn = id, room = %self.code, error = %e,
                "Failed to send to member (slow or disconnected)"
            );
        }
    }

    fn broadcast_all(&self, event: &ServerEvent) {
        let Some(frame) = encoded(event) else { return };
        for member in &self.members {
            if let Err(e) = member.sender.try_send(frame.clone()) {
                tracing::debug!(
                    conn = member.id, room = %self.code, error = %e,
                    "Skipping broadcast to slow client"
                );
            }
        }
    }

    fn broadcast_except(&self, exclude: ConnectionId, event: &ServerEvent) {
        let Some(frame) = encoded(event) else { return };
        for member in &self.members {
            if member.id != exclude
                && let Err(e) = member.sender.try_send(frame.clone())
            {
                tracing::debug!(
                    conn = member.id, room = %self.code, error = %e,
                    "Skipping broadcast to slow client"
                );
            }
        }
    }

    #[cfg(test)]
    pub fn member_names(&self) -> Vec<String> {
        self.members.iter().map(|m| m.display_name.clone()).collect()
    }

    #[cfg(test)]
    pub fn set_last_activity(&mut self, at: Instant) {
        self.last_activity = at;
    }
}

/// Serialize once per fan-out; recipients clone the shared frame.
pub(crate) fn encoded(event: &ServerEvent) -> Option<Utf8Bytes> {
    match encode_server_event(event) {
        Ok(frame) => Some(Utf8Bytes::from(frame)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode outbound event");
            None
        },
    }
}
