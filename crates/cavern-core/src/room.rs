use uuid::Uuid;

/// Length of a room code in characters.
pub const ROOM_CODE_LEN: usize = 8;

/// Generate a random room code: 8 lowercase hex characters, e.g. `4f2a9c1b`.
///
/// Codes are the opaque handles users share to join a room. 32 bits of
/// entropy keeps accidental collisions and blind guessing unlikely at chat
/// scale, and the charset is URL-safe by construction.
pub fn generate_room_code() -> String {
    let mut code = Uuid::new_v4().simple().to_string();
    code.truncate(ROOM_CODE_LEN);
    code
}

/// Check whether `code` has the shape of a generated room code.
pub fn is_valid_room_code(code: &str) -> bool {
    code.len() == ROOM_CODE_LEN && code.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
}
