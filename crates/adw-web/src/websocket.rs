//! WebSocket Handler
//!
//! One upgrade per board client. The send side drains the session's
//! outbound queue; the receive side feeds client messages to the hub.
//! Transport-layer close is authoritative: there is no server-side
//! reaping of silent clients.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tracing::debug;

use crate::hub::Hub;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<Arc<Hub>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<Hub>) {
    let (mut sender, mut receiver) = socket.split();
    let session = hub.register().await;
    let session_id = session.id;

    // Drain the outbound queue into the socket.
    let send_session = session.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(text) = send_session.next().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Feed incoming frames to the hub.
    let recv_hub = hub.clone();
    let recv_session = session.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => {
                    debug!(session = %recv_session.id, "WS received: {text}");
                    recv_hub.handle_client_message(&recv_session, &text).await;
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    hub.unregister(session_id).await;
}
