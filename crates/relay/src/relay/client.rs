//! WebSocket endpoint for downstream clients.
//!
//! Frames are handled strictly one at a time: a `request` is forwarded to
//! the streamer and its `response` written back before the next frame is
//! read. Closing a client never cancels anything on the streamer side.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use rr_domain::Error;
use rr_protocol::{codec, ClientMessage, Decoded};
use serde_json::Value;

use crate::state::{too_many_connections, AppState};

/// GET {client_path}: upgrade to WebSocket.
pub async fn client_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let Some(permit) = state.try_acquire_connection() else {
        return too_many_connections();
    };
    ws.on_upgrade(move |socket| async move {
        handle_socket(socket, state).await;
        drop(permit);
    })
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let client_id = uuid::Uuid::new_v4().to_string();
    let (mut ws_sink, mut ws_stream) = socket.split();
    tracing::debug!(client_id = %client_id, "client connected");

    let max_frame = state.config.relay.max_frame_bytes;
    while let Some(Ok(msg)) = ws_stream.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        if text.len() > max_frame {
            tracing::warn!(
                client_id = %client_id,
                bytes = text.len(),
                max = max_frame,
                "client frame exceeds max_frame_bytes, dropping"
            );
            continue;
        }

        let data = match codec::decode_client(&text) {
            Ok(Decoded::Message(ClientMessage::Request { data })) => data,
            Ok(Decoded::Message(other)) => {
                tracing::warn!(client_id = %client_id, frame = ?other, "unsupported client frame");
                continue;
            }
            Ok(Decoded::Unrecognized(kind)) => {
                tracing::warn!(
                    client_id = %client_id,
                    error = %Error::UnrecognizedMessageKind(kind),
                    "unsupported client frame"
                );
                continue;
            }
            Err(e) => {
                tracing::warn!(client_id = %client_id, error = %e, "ignoring malformed client frame");
                continue;
            }
        };

        let response = round_trip(&state, &client_id, data).await;
        let text = match codec::encode(&response) {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize client response");
                continue;
            }
        };
        if ws_sink.send(Message::Text(text)).await.is_err() {
            break;
        }
    }

    tracing::debug!(client_id = %client_id, "client disconnected");
}

/// Turn one client request into a `response` frame, successful or not.
async fn round_trip(state: &AppState, client_id: &str, data: Value) -> ClientMessage {
    match state.broker.request(data).await {
        Ok(reply) => {
            let error = reply
                .result
                .filter(|r| !r.is_ok())
                .map(|r| format!("streamer answered {}", r.as_str()));
            ClientMessage::Response {
                data: reply.data,
                error,
            }
        }
        Err(e) => {
            tracing::warn!(client_id = %client_id, error = %e, "client request failed");
            ClientMessage::Response {
                data: Value::Null,
                error: Some(e.to_string()),
            }
        }
    }
}
