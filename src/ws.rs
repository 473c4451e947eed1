//! The per-session websocket loop.
//!
//! One session per user at `/ws/{user_id}`. The socket splits into a reader
//! owned by the session task and a writer task fed by the session's outbound
//! queue; the hub only ever touches the queue. When the reader ends, however
//! it ends, the session runs its disconnect cascade exactly once.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::debug;

use crate::directory::Directory;
use crate::hub::{Hub, Peer, SessionHandle, CLOSE_INVALID_ID};
use crate::model::UserId;

/// Build the axum application serving the hub.
///
/// `GET /` answers a health probe; `GET /ws/{user_id}` upgrades to a
/// signaling session.
pub fn app<D: Directory>(hub: Arc<Hub<D>>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/ws/{user_id}", get(accept::<D>))
        .with_state(hub)
}

async fn health() -> Json<Value> {
    Json(json!({ "message": "Switchboard signaling server is running" }))
}

async fn accept<D: Directory>(
    Path(user_id): Path<String>,
    State(hub): State<Arc<Hub<D>>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| session(socket, hub, user_id))
}

/// Run one session to completion.
async fn session<D: Directory>(socket: WebSocket, hub: Arc<Hub<D>>, raw_id: String) {
    // the handshake has already completed, so a bad id is answered with an
    // application close code rather than an HTTP status
    let user = match raw_id.parse::<u64>() {
        Ok(id) => UserId(id),
        Err(_) => {
            debug!("rejecting session with non-integer user id {:?}", raw_id);
            let mut socket = socket;
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: CLOSE_INVALID_ID,
                    reason: Utf8Bytes::from_static("user id must be an integer"),
                })))
                .await;
            return;
        }
    };

    let (mut sink, mut stream) = socket.split();
    let (outbound, mut queue) = mpsc::unbounded_channel::<Message>();

    // writer task: owns the send half, drains the queue, dies with it
    let writer = tokio::spawn(async move {
        while let Some(message) = queue.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sink.send(message).await.is_err() {
                break;
            }
            if closing {
                break;
            }
        }
    });

    let username = hub.display_name(user).await;
    let handle = SessionHandle::new(outbound, username.clone());
    let session_handle = handle.clone();
    hub.connect(user, handle).await;
    hub.notify_ongoing_calls(user).await;

    let peer = Peer { id: user, username };
    while let Some(received) = stream.next().await {
        match received {
            Ok(Message::Text(text)) => hub.dispatch(&peer, text.as_str()).await,
            Ok(Message::Close(_)) | Err(_) => break,
            // binary, ping and pong frames are not part of the protocol
            Ok(_) => {}
        }
    }

    hub.disconnect_session(user, &session_handle).await;
    // dropping our last handle ends the writer once the queue drains
    drop(session_handle);
    let _ = writer.await;
}
