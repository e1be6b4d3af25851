//! Manages the WebSocket connection lifecycle for one client.

use super::{
    dispatch::{ConnectionContext, handle_frame},
    protocol::{ReplyMessage, ServerMessage},
};
use crate::state::AppState;
use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Frames queued for a client before handlers start waiting on its writer.
const OUTBOUND_QUEUE: usize = 64;

/// Axum handler to upgrade an HTTP connection to a WebSocket registered
/// under the `client_id` path segment.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| {
        let span = info_span!("ws_connection", %client_id);
        handle_socket(socket, client_id, state).instrument(span)
    })
}

/// Runs one connection from registration to release.
///
/// A dedicated writer task owns the socket sink and drains the connection's
/// frame channel, so broadcasts from other connections never touch this
/// socket directly. Inbound frames are handled strictly in arrival order.
async fn handle_socket(socket: WebSocket, client_id: String, state: Arc<AppState>) {
    let (mut socket_tx, mut socket_rx) = socket.split();
    let (frame_tx, mut frame_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);

    let handle = state.sessions.register(&client_id, frame_tx).await;
    let connections = state.sessions.len().await;
    info!(connections, "Client connected");

    let writer = tokio::spawn(
        async move {
            while let Some(frame) = frame_rx.recv().await {
                if let Err(e) = socket_tx.send(Message::Text(frame.into())).await {
                    warn!(error = %e, "Failed to write to client socket");
                    break;
                }
            }
            let _ = socket_tx.close().await;
        }
        .in_current_span(),
    );

    let greeting = ServerMessage::from(ReplyMessage::text(state.prompts.greeting.clone()));
    state.sessions.send_to_connection(&handle, &greeting).await;

    let mut conn = ConnectionContext::new(handle.clone());
    while let Some(result) = socket_rx.next().await {
        match result {
            Ok(Message::Text(text)) => handle_frame(&state, &mut conn, text.as_str()).await,
            Ok(Message::Binary(data)) => {
                warn!(bytes = data.len(), "Ignoring binary frame");
            }
            Ok(Message::Close(_)) => {
                info!("Client sent close frame");
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => debug!("Keep-alive frame"),
            Err(e) => {
                error!(error = %e, "Error receiving from client WebSocket");
                break;
            }
        }
    }

    if state.sessions.release(&handle).await {
        let farewell = ReplyMessage::text(format!("Client {client_id} left the chat"));
        state.sessions.broadcast(&farewell.into()).await;
    } else {
        debug!("Registration already taken over by a newer connection");
    }
    writer.abort();
    let connections = state.sessions.len().await;
    info!(connections, "Client disconnected");
}
