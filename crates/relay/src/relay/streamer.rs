//! WebSocket endpoint for the streamer.
//!
//! Flow:
//! 1. Streamer connects; the relay replaces any previous streamer and
//!    closes its socket
//! 2. Relay sends `hello` with a fresh challenge and salt
//! 3. Streamer sends `identify`; on a correct digest the relay answers
//!    `identified`, otherwise it only logs
//! 4. Message loop: the relay writes `request`s, the streamer sends
//!    `response`s and `event`s
//!
//! Inbound kinds are accepted in any order and before authentication.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use rr_domain::Error;
use rr_protocol::{codec, Decoded, RelayMessage, RequestResult, StreamerEvent, StreamerMessage};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::relay::correlator::Reply;
use crate::relay::StreamerSink;
use crate::state::{too_many_connections, AppState};

/// How long the writer may take to flush and close once the read side ends.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// GET {streamer_path}: upgrade to WebSocket.
pub async fn streamer_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let Some(permit) = state.try_acquire_connection() else {
        return too_many_connections();
    };
    ws.on_upgrade(move |socket| async move {
        handle_socket(socket, state).await;
        drop(permit);
    })
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    // Outbound channel: the writer task is the only writer to the socket.
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<RelayMessage>();

    let lease = match state.broker.attach_streamer(outbound_tx.clone()) {
        Ok(lease) => lease,
        Err(e) => {
            tracing::error!(error = %e, "failed to attach streamer");
            return;
        }
    };
    let connection_id = lease.connection_id;
    tracing::info!(connection_id, "streamer connected");

    let mut writer = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let text = match codec::encode(&msg) {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize outbound message");
                    continue;
                }
            };
            if ws_sink.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
        let _ = ws_sink.send(Message::Close(None)).await;
    });

    let max_frame = state.config.relay.max_frame_bytes;
    loop {
        let msg = tokio::select! {
            msg = ws_stream.next() => match msg {
                Some(Ok(msg)) => msg,
                _ => break,
            },
            _ = lease.displaced.cancelled() => {
                tracing::info!(connection_id, "streamer displaced by a newer connection, closing");
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                if text.len() > max_frame {
                    tracing::warn!(
                        connection_id,
                        bytes = text.len(),
                        max = max_frame,
                        "streamer frame exceeds max_frame_bytes, dropping"
                    );
                    continue;
                }
                handle_frame(&state, connection_id, &outbound_tx, &text);
            }
            Message::Close(_) => break,
            Message::Binary(_) => {
                tracing::debug!(connection_id, "ignoring binary frame from streamer");
            }
            // axum answers WS-level pings itself.
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    let failed = state.broker.detach_streamer(connection_id);

    // Closing the channel lets the writer flush and send a close frame.
    drop(outbound_tx);
    if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }
    tracing::info!(connection_id, failed_in_flight = failed, "streamer disconnected");
}

fn handle_frame(state: &AppState, connection_id: u64, sink: &StreamerSink, text: &str) {
    let entries = match codec::decode::<StreamerMessage>(text) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(connection_id, error = %e, "ignoring malformed streamer frame");
            return;
        }
    };

    for entry in entries {
        match entry {
            Decoded::Message(msg) => handle_message(state, connection_id, sink, msg),
            Decoded::Unrecognized(kind) => {
                tracing::warn!(
                    connection_id,
                    error = %Error::UnrecognizedMessageKind(kind),
                    "skipping streamer message"
                );
            }
        }
    }
}

fn handle_message(
    state: &AppState,
    connection_id: u64,
    sink: &StreamerSink,
    msg: StreamerMessage,
) {
    match msg {
        StreamerMessage::Identify { authentication } => {
            match state.broker.authenticate(connection_id, &authentication) {
                Ok(()) => {
                    tracing::info!(connection_id, "streamer identified");
                    let identified = RelayMessage::Identified {
                        result: RequestResult::Ok,
                    };
                    if sink.send(identified).is_err() {
                        tracing::warn!(connection_id, "failed to send identified");
                    }
                }
                Err(e) => {
                    tracing::warn!(connection_id, error = %e, "streamer identify rejected");
                }
            }
        }
        StreamerMessage::Event { data } => handle_event(connection_id, data),
        StreamerMessage::Response { id, result, data } => {
            let reply = Reply {
                result,
                data: data.unwrap_or(Value::Null),
            };
            state.broker.deliver_response(connection_id, id, reply);
        }
    }
}

/// Surface streamer log entries to the operator; nothing is forwarded to
/// clients.
fn handle_event(connection_id: u64, data: Value) {
    let events = match codec::decode_value::<StreamerEvent>(data) {
        Ok(events) => events,
        Err(e) => {
            tracing::warn!(connection_id, error = %e, "ignoring malformed streamer event");
            return;
        }
    };

    for event in events {
        match event {
            Decoded::Message(StreamerEvent::Log { entry }) => {
                tracing::info!(target: "streamer", connection_id, entry = %entry, "streamer log");
            }
            Decoded::Unrecognized(kind) => {
                tracing::debug!(connection_id, kind = %kind, "ignoring streamer event");
            }
        }
    }
}
