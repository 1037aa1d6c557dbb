use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use cavern_core::events::{ClientEvent, ServerEvent};
use cavern_core::protocol::{decode_server_event, encode_client_event};

use cavern_server::config::ServerConfig;
use cavern_server::{build_app, spawn_idle_reaper};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    _shutdown: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Start a test server with default config on an ephemeral port.
    pub async fn new() -> Self {
        Self::from_config(ServerConfig::default()).await
    }

    pub async fn from_config(config: ServerConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (app, state) = build_app(config);
        spawn_idle_reaper(state);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            _shutdown: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

/// Connect a WebSocket client to the given URL.
pub async fn ws_connect(url: &str) -> WsClient {
    let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    stream
}

/// Send one client event as a text frame.
pub async fn send_event(stream: &mut WsClient, event: &ClientEvent) {
    let encoded = encode_client_event(event).unwrap();
    stream.send(Message::Text(encoded.into())).await.unwrap();
}

/// Read the next server event (5s timeout).
pub async fn read_event(stream: &mut WsClient) -> ServerEvent {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return decode_server_event(text.as_str()).expect("undecodable server event");
                },
                Some(Ok(Message::Close(_))) => panic!("WebSocket closed unexpectedly"),
                Some(Err(e)) => panic!("WebSocket error: {e}"),
                None => panic!("WebSocket stream ended"),
                _ => continue,
            }
        }
    })
    .await
    .expect("Timed out waiting for server event")
}

/// Try to read an event, returning None if nothing arrives in time.
pub async fn try_read_event(stream: &mut WsClient, timeout_ms: u64) -> Option<ServerEvent> {
    tokio::time::timeout(Duration::from_millis(timeout_ms), async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return decode_server_event(text.as_str()).expect("undecodable server event");
                },
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    panic!("WebSocket error or closed")
                },
                _ => continue,
            }
        }
    })
    .await
    .ok()
}

/// Read the next event and assert it is `error`, returning its message.
pub async fn read_error(stream: &mut WsClient) -> String {
    match read_event(stream).await {
        ServerEvent::Error { message } => message,
        other => panic!("Expected error event, got: {other:?}"),
    }
}

/// Create a room and return its code.
pub async fn create_room(stream: &mut WsClient, username: &str) -> String {
    send_event(
        stream,
        &ClientEvent::CreateRoom {
            username: username.to_string(),
        },
    )
    .await;
    match read_event(stream).await {
        ServerEvent::RoomCreated { room_id, admin } => {
            assert!(admin, "creator should be admin");
            room_id
        },
        other => panic!("Expected room_created, got: {other:?}"),
    }
}

/// Join an existing room, asserting success. Returns the users_count the
/// server acknowledged.
pub async fn join_room(stream: &mut WsClient, room_id: &str, username: &str) -> usize {
    send_event(
        stream,
        &ClientEvent::JoinRoom {
            room_id: room_id.to_string(),
            username: username.to_string(),
        },
    )
    .await;
    match read_event(stream).await {
        ServerEvent::JoinedRoom {
            room_id: joined,
            users_count,
            ..
        } => {
            assert_eq!(joined, room_id);
            users_count
        },
        other => panic!("Expected joined_room, got: {other:?}"),
    }
}

/// Post a message to a room.
pub async fn post_message(stream: &mut WsClient, room_id: &str, content: &str) {
    send_event(
        stream,
        &ClientEvent::Message {
            room_id: room_id.to_string(),
            content: content.to_string(),
        },
    )
    .await;
}
