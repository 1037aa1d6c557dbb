use axum::extract::{Path, State};
use axum::response::Json;
use serde::Serialize;

use crate::room::RoomAccess;
use crate::state::AppState;

/// Response for a room existence probe.
#[derive(Debug, Serialize)]
pub struct RoomInfoResponse {
    pub exists: bool,
    pub users_count: usize,
}

/// Existence probe for a room code, used by clients to vet an invite link
/// before opening a socket. Unknown codes answer 200 with `exists: false`
/// rather than 404, so probing is indistinguishable from a stale link.
pub async fn room_info(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Json<RoomInfoResponse> {
    let occupancy = state.rooms.get(&room_id).and_then(|room| {
        match room.access() {
            RoomAccess::Live(inner) => Some(inner.users_count()),
            // Tombstoned or faulted rooms read as absent; sweeps finish later
            _ => None,
        }
    });

    Json(RoomInfoResponse {
        exists: occupancy.is_some(),
        users_count: occupancy.unwrap_or(0),
    })
}
