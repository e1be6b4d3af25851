//! Routes parsed frames to the handler for their kind.

use super::{handlers, protocol::ServerMessage, registry::ConnectionHandle};
use crate::state::AppState;
use companion_core::{
    audio::AudioBuffer,
    envelope::{Envelope, parse_frame},
};
use tracing::{debug, warn};

/// State owned by one connection task and never shared with others.
#[derive(Debug)]
pub struct ConnectionContext {
    pub handle: ConnectionHandle,
    pub audio: AudioBuffer,
}

impl ConnectionContext {
    pub fn new(handle: ConnectionHandle) -> Self {
        Self {
            handle,
            audio: AudioBuffer::new(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.handle.id
    }
}

/// Handles one inbound text frame. A frame that does not parse is answered
/// with an error acknowledgement and has no other effect.
pub async fn handle_frame(state: &AppState, conn: &mut ConnectionContext, raw: &str) {
    match parse_frame(raw) {
        Ok(envelope) => dispatch(state, conn, envelope).await,
        Err(e) => {
            warn!(error = %e, "Rejected inbound frame");
            state
                .sessions
                .send_to_connection(&conn.handle, &ServerMessage::parse_error(&e))
                .await;
        }
    }
}

pub async fn dispatch(state: &AppState, conn: &mut ConnectionContext, envelope: Envelope) {
    debug!(kind = %envelope.kind(), "Dispatching frame");
    match envelope {
        Envelope::Text(payload) => handlers::handle_text(state, &conn.handle, payload).await,
        Envelope::Audio(payload) => handlers::handle_audio(state, conn, payload).await,
        Envelope::Image(payload) => handlers::handle_image(state, &conn.handle, payload).await,
        Envelope::Control(payload) => handlers::handle_control(state, conn, payload).await,
        Envelope::Comment(batch) => handlers::handle_comments(state, &conn.handle, batch).await,
    }
}
