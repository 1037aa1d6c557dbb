use serde::{Deserialize, Serialize};

/// Events a client sends to the server.
///
/// Wire form is `{"event": <name>, "data": {…}}`; variants without a payload
/// omit `data` entirely. Event names are fixed — deployed clients match on
/// them as strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Create a new room with the caller as its sole member and admin.
    CreateRoom { username: String },
    /// Join an existing room by code.
    JoinRoom { room_id: String, username: String },
    /// Post a chat message to the caller's current room.
    Message { room_id: String, content: String },
    /// Advisory typing indicator for the caller's current room.
    Typing { room_id: String, is_typing: bool },
    /// Leave the caller's current room.
    LeaveRoom,
    /// Close the caller's current room. Admin only.
    CloseRoom,
}

/// Events the server sends to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Acknowledges `create_room`; sent to the creator only.
    RoomCreated { room_id: String, admin: bool },
    /// Acknowledges `join_room`; sent to the joiner only.
    JoinedRoom {
        room_id: String,
        admin: bool,
        users_count: usize,
    },
    /// A member joined; sent to every member except the joiner.
    UserJoined {
        room_id: String,
        username: String,
        users_count: usize,
    },
    /// A member left; sent to the remaining members.
    UserLeft {
        room_id: String,
        username: String,
        users_count: usize,
    },
    /// A chat message; sent to all current members, the sender included.
    Message {
        room_id: String,
        username: String,
        content: String,
        timestamp: String,
    },
    /// Typing indicator; sent to every member except the typer.
    Typing {
        room_id: String,
        username: String,
        is_typing: bool,
    },
    /// The admin role moved to the longest-standing remaining member.
    AdminChanged { room_id: String },
    /// The room no longer exists; membership in it is gone.
    RoomClosed { room_id: String },
    /// The previous request failed; `message` is user-facing.
    Error { message: String },
}
