use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use cavern_core::events::ServerEvent;
use cavern_core::protocol::decode_client_event;

use crate::registry::ConnectionId;
use crate::room::encoded;
use crate::state::{AppState, ConnectionGuard};

pub async fn ws_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<axum::response::Response, StatusCode> {
    let max_ws = state.config.limits.max_ws_connections;
    let current = state.ws_connection_count.load(Ordering::Relaxed);
    if current >= max_ws {
        tracing::warn!(current, max = max_ws, "WS connection limit reached");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state))
        .into_response())
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let _guard = ConnectionGuard::new(Arc::clone(&state.ws_connection_count));
    let (ws_sender, mut ws_receiver) = socket.split();

    let (tx, rx) = mpsc::channel::<Utf8Bytes>(state.config.limits.event_buffer);
    let conn = state.registry.register(tx);
    tracing::debug!(conn, "Client connected");

    spawn_writer(ws_sender, rx);

    read_loop(&mut ws_receiver, &state, conn).await;

    // Socket gone: run the leave path, then drop the registry entry
    state.sessions.handle_disconnect(conn);
    state.registry.unregister(conn);
    tracing::info!(conn, "Client disconnected");
}

fn spawn_writer(
    mut ws_sender: futures::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Utf8Bytes>,
) {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });
}

/// Per-connection rate limiter (token bucket).
struct RateLimiter {
    tokens: f64,
    last_refill: Instant,
    max_tokens: f64,
    refill_rate: f64, // tokens per second
}

impl RateLimiter {
    fn new(max_tokens: f64, refill_rate: f64) -> Self {
        Self {
            tokens: max_tokens,
            last_refill: Instant::now(),
            max_tokens,
            refill_rate,
        }
    }

    /// Returns true if the event is allowed; false if rate-limited.
    fn allow(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

async fn read_loop(
    ws_receiver: &mut futures::stream::SplitStream<WebSocket>,
    state: &AppState,
    conn: ConnectionId,
) {
    let rate = state.config.limits.ws_rate_limit_per_sec;
    let mut rate_limiter = RateLimiter::new(rate * 2.0, rate);

    while let Some(Ok(msg)) = ws_receiver.next().await {
        let text = match msg {
            Message::Text(t) => t,
            Message::Close(_) => break,
            // Binary frames are not part of the protocol
            _ => continue,
        };

        // Rate limit: drop events that exceed the per-connection rate
        if !rate_limiter.allow() {
            tracing::warn!(conn, "Rate limited");
            continue;
        }

        match decode_client_event(text.as_str()) {
            Ok(event) => state.sessions.dispatch(conn, event),
            Err(e) => {
                tracing::debug!(conn, error = %e, "Rejected inbound frame");
                send_error(state, conn, "Invalid payload");
            },
        }
    }
}

/// Queue an `error` event outside any room context (pre-dispatch failures).
fn send_error(state: &AppState, conn: ConnectionId, message: &str) {
    let Some(sender) = state.registry.sender_of(conn) else {
        return;
    };
    let event = ServerEvent::Error {
        message: message.to_string(),
    };
    let Some(frame) = encoded(&event) else { return };
    if let Err(e) = sender.try_send(frame) {
        tracing::debug!(conn, error = %e, "Failed to queue error event");
    }
}
