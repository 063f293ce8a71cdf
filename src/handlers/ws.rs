//! WebSocket handler: one task per connection, events handled in arrival order, ping/pong keepalive,
//! stale timeout, and disconnect cleanup.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use tracing::{debug, info, trace};

use crate::coordinator::{Audience, Dispatch};
use crate::protocol::{InboundEvent, OutboundEvent};
use crate::ws_registry::{self, ConnectionEntry};
use crate::AppState;

const PONG_JSON: &str = r#"{"type":"pong"}"#;
const MAX_KEEPALIVE_CHECK_SECS: u64 = 30;

/// GET /ws: upgrade, then run the connection until it closes, leaves, or stops pinging.
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// What the socket loop does after an inbound frame.
enum Next {
    Continue,
    Reply(&'static str),
    Close,
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let (entry, mut rx) = state.connections.register();
    let conn_id = entry.conn_id;
    info!(conn_id, "ws connected");

    let timeout_secs = state.config.ping_timeout_secs;
    let check_every = timeout_secs.clamp(1, MAX_KEEPALIVE_CHECK_SECS);
    let mut keepalive = tokio::time::interval(Duration::from_secs(check_every));

    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Some(text) => {
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match handle_text(&state, &entry, text.as_str()) {
                        Next::Continue => {}
                        Next::Reply(reply) => {
                            if socket.send(Message::Text(reply.into())).await.is_err() {
                                break;
                            }
                        }
                        Next::Close => break,
                    },
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            _ = keepalive.tick() => {
                if entry.is_stale(ws_registry::now_secs(), timeout_secs) {
                    info!(conn_id, "ws ping timeout");
                    break;
                }
            }
        }
    }

    // Drop from the live set first so the leave notice only reaches remaining connections.
    state.connections.remove_connection(conn_id);
    if let Some(dispatch) = state.coordinator.disconnect(conn_id) {
        state.connections.deliver(&dispatch);
    }
    info!(conn_id, "ws disconnected");
}

fn handle_text(state: &AppState, entry: &ConnectionEntry, text: &str) -> Next {
    let conn_id = entry.conn_id;
    let event = match InboundEvent::parse(text) {
        Ok(event) => event,
        Err(e) => {
            state.coordinator.record_error(conn_id, &e);
            state.connections.deliver(&Dispatch {
                audience: Audience::Only(conn_id),
                event: OutboundEvent::error(&e),
            });
            return Next::Continue;
        }
    };

    match event {
        InboundEvent::Ping => {
            entry.touch();
            state.coordinator.handle(conn_id, InboundEvent::Ping);
            trace!(conn_id, "ws ping received");
            Next::Reply(PONG_JSON)
        }
        InboundEvent::Leave => {
            if let Some(dispatch) = state.coordinator.handle(conn_id, InboundEvent::Leave) {
                state.connections.deliver(&dispatch);
            }
            debug!(conn_id, "closing after leave");
            Next::Close
        }
        event => {
            if let Some(dispatch) = state.coordinator.handle(conn_id, event) {
                state.connections.deliver(&dispatch);
            }
            Next::Continue
        }
    }
}
