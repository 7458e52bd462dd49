//! Websocket progress channel.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::debug;

use crate::progress::ProgressRegistry;
use crate::state::AppState;

/// GET /ws - receive progress messages as text frames
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> Response {
    let registry = state.progress.clone();
    ws.on_upgrade(move |socket| serve_connection(socket, registry))
}

/// Forward broadcasts to one client until either side goes away. Incoming
/// messages are read and ignored.
async fn serve_connection(socket: WebSocket, registry: Arc<ProgressRegistry>) {
    let (id, mut messages) = registry.register();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            outgoing = messages.recv() => {
                let Some(text) = outgoing else { break };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    registry.unregister(id);
    debug!(connection = id, "Progress connection closed");
}
