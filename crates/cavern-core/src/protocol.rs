use serde::{Deserialize, Serialize};

use crate::events::{ClientEvent, ServerEvent};

/// Maximum size of a single wire frame in bytes.
pub const MAX_EVENT_SIZE: usize = 16 * 1024; // 16 KiB

#[derive(Debug)]
pub enum ProtocolError {
    EmptyFrame,
    FrameTooLarge(usize),
    SerializeError(String),
    DeserializeError(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyFrame => write!(f, "empty frame"),
            Self::FrameTooLarge(size) => {
                write!(f, "frame too large: {size} bytes (max {MAX_EVENT_SIZE})")
            },
            Self::SerializeError(e) => write!(f, "serialize error: {e}"),
            Self::DeserializeError(e) => write!(f, "deserialize error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

fn encode<T: Serialize>(event: &T) -> Result<String, ProtocolError> {
    let frame = serde_json::to_string(event)
        .map_err(|e| ProtocolError::SerializeError(e.to_string()))?;
    if frame.len() > MAX_EVENT_SIZE {
        return Err(ProtocolError::FrameTooLarge(frame.len()));
    }
    Ok(frame)
}

fn decode<T: for<'de> Deserialize<'de>>(frame: &str) -> Result<T, ProtocolError> {
    if frame.is_empty() {
        return Err(ProtocolError::EmptyFrame);
    }
    if frame.len() > MAX_EVENT_SIZE {
        return Err(ProtocolError::FrameTooLarge(frame.len()));
    }
    serde_json::from_str(frame).map_err(|e| ProtocolError::DeserializeError(e.to_string()))
}

/// Encode a `ClientEvent` to a wire frame.
pub fn encode_client_event(event: &ClientEvent) -> Result<String, ProtocolError> {
    encode(event)
}

/// Encode a `ServerEvent` to a wire frame.
pub fn encode_server_event(event: &ServerEvent) -> Result<String, ProtocolError> {
    encode(event)
}

/// Decode a wire frame into a `ClientEvent`.
pub fn decode_client_event(frame: &str) -> Result<ClientEvent, ProtocolError> {
    decode(frame)
}

/// Decode a wire frame into a `ServerEvent`.
pub fn decode_server_event(frame: &str) -> Result<ServerEvent, ProtocolError> {
    decode(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_join_room() {
        let event = ClientEvent::JoinRoom {
            room_id: "4f2a9c1b".to_string(),
            username: "Alice".to_string(),
        };
        let frame = encode_client_event(&event).unwrap();
        let decoded = decode_client_event(&frame).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn roundtrip_message_broadcast() {
        let event = ServerEvent::Message {
            room_id: "4f2a9c1b".to_string(),
            username: "Alice".to_string(),
            content: "hello there".to_string(),
            timestamp: "2026-01-01T00:00:00.000Z".to_string(),
        };
        let frame = encode_server_event(&event).unwrap();
        let decoded = decode_server_event(&frame).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn roundtrip_leave_room() {
        let frame = encode_client_event(&ClientEvent::LeaveRoom).unwrap();
        let decoded = decode_client_event(&frame).unwrap();
        assert_eq!(decoded, ClientEvent::LeaveRoom);
    }

    #[test]
    fn decode_empty_frame_fails() {
        let err = decode_client_event("").unwrap_err();
        assert!(matches!(err, ProtocolError::EmptyFrame));
    }

    #[test]
    fn decode_unknown_event_name_fails() {
        let err = decode_client_event(r#"{"event":"start_game","data":{}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::DeserializeError(_)));
    }

    #[test]
    fn decode_malformed_json_fails() {
        let err = decode_client_event("{not json").unwrap_err();
        assert!(matches!(err, ProtocolError::DeserializeError(_)));
    }

    #[test]
    fn decode_missing_payload_field_fails() {
        let frame = r#"{"event":"message","data":{"room_id":"4f2a9c1b"}}"#;
        let err = decode_client_event(frame).unwrap_err();
        assert!(matches!(err, ProtocolError::DeserializeError(_)));
    }

    #[test]
    fn decode_ignores_unknown_payload_fields() {
        let frame = r#"{"event":"typing","data":{"room_id":"4f2a9c1b","is_typing":true,"extra":1}}"#;
        let decoded = decode_client_event(frame).unwrap();
        assert_eq!(
            decoded,
            ClientEvent::Typing {
                room_id: "4f2a9c1b".to_string(),
                is_typing: true,
            }
        );
    }

    #[test]
    fn oversized_frame_rejected_on_encode() {
        let event = ClientEvent::Message {
            room_id: "4f2a9c1b".to_string(),
            content: "x".repeat(MAX_EVENT_SIZE + 1),
        };
        let err = encode_client_event(&event).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge(_)));
    }

    #[test]
    fn oversized_frame_rejected_on_decode() {
        let frame = format!(
            r#"{{"event":"message","data":{{"room_id":"4f2a9c1b","content":"{}"}}}}"#,
            "x".repeat(MAX_EVENT_SIZE)
        );
        let err = decode_client_event(&frame).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge(_)));
    }

    #[test]
    fn error_display_mentions_limit() {
        let msg = ProtocolError::FrameTooLarge(99_999).to_string();
        assert!(msg.contains("99999"));
        assert!(msg.contains(&MAX_EVENT_SIZE.to_string()));
    }
}
