//! One handler per inbound message kind.
//!
//! Handlers never fail: provider, parse and state errors become an error
//! acknowledgement to the sender and the connection carries on.

use super::{
    cycle::{persona_reply, run_text_cycle, speak},
    dispatch::ConnectionContext,
    protocol::{RequestType, ServerMessage},
    registry::ConnectionHandle,
};
use crate::state::AppState;
use bytes::Bytes;
use companion_core::{
    envelope::{
        AudioPayload, CommentBatch, CommentEvent, ControlAction, ControlPayload, ImagePayload,
        TextPayload,
    },
    error::ProviderError,
    history::Turn,
    image_check::decode_image,
};
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Name used for viewers whose comment carries no user name.
const ANONYMOUS_VIEWER: &str = "viewer";

async fn respond(state: &AppState, conn: &ConnectionHandle, message: ServerMessage) {
    state.sessions.send_to_connection(conn, &message).await;
}

pub async fn handle_text(state: &AppState, conn: &ConnectionHandle, request: TextPayload) {
    if request.content.is_empty() {
        respond(
            state,
            conn,
            ServerMessage::error(RequestType::Text, "Text content is empty"),
        )
        .await;
        return;
    }

    match run_text_cycle(state, conn, &request).await {
        Ok(reply) => respond(state, conn, reply.into()).await,
        Err(e) => {
            error!(error = %e, "Text cycle failed");
            respond(
                state,
                conn,
                ServerMessage::error(RequestType::Text, format!("AI processing error: {}", e)),
            )
            .await;
        }
    }
}

/// Buffers one chunk of the current recording. Successful appends are not
/// acknowledged.
pub async fn handle_audio(state: &AppState, conn: &mut ConnectionContext, payload: AudioPayload) {
    match conn.audio.append_base64(&payload.chunk) {
        Ok(size) => debug!(
            bytes = size,
            chunks = conn.audio.chunk_count(),
            is_final = payload.is_final,
            "Audio chunk buffered"
        ),
        Err(e) => {
            warn!(error = %e, "Rejected audio chunk");
            let message = ServerMessage::error(RequestType::Audio, e.to_string())
                .with_detail("is_final", payload.is_final);
            respond(state, &conn.handle, message).await;
        }
    }
}

pub async fn handle_control(
    state: &AppState,
    conn: &mut ConnectionContext,
    payload: ControlPayload,
) {
    match payload.action {
        ControlAction::StartAudioStream => {
            let discarded = conn.audio.start();
            if discarded > 0 {
                warn!(chunks = discarded, "Restarted audio stream; previous chunks discarded");
            }
            info!("Audio stream started");
            respond(
                state,
                &conn.handle,
                ServerMessage::success(RequestType::Control, "Audio stream started"),
            )
            .await;
        }
        ControlAction::StopAudioStream => stop_audio_stream(state, conn).await,
        ControlAction::Unknown(action) => {
            warn!(%action, "Unknown control action");
            respond(
                state,
                &conn.handle,
                ServerMessage::error(
                    RequestType::Control,
                    format!("Unknown control action: {}", action),
                ),
            )
            .await;
        }
    }
}

/// Finalizes the recording: the buffer is emptied first, then the blob is
/// transcribed and a non-empty transcription is answered like a spoken text
/// message.
async fn stop_audio_stream(state: &AppState, conn: &mut ConnectionContext) {
    let blob = match conn.audio.stop() {
        Ok(blob) => blob,
        Err(e) => {
            warn!(error = %e, "Cannot stop audio stream");
            respond(
                state,
                &conn.handle,
                ServerMessage::error(RequestType::Control, e.to_string()),
            )
            .await;
            return;
        }
    };
    info!(bytes = blob.len(), "Audio stream stopped");

    let file_name = recording_file_name(conn.client_id());
    if let Some(dir) = &state.config.audio_archive_dir {
        archive_recording(dir, &file_name, &blob).await;
    }

    let transcription = match transcribe(state, blob, &file_name).await {
        Ok(text) => text,
        Err(e) => {
            error!(error = %e, "Transcription failed");
            respond(
                state,
                &conn.handle,
                ServerMessage::error(RequestType::Control, format!("Transcription failed: {}", e)),
            )
            .await;
            return;
        }
    };
    info!(%transcription, "Recording transcribed");

    if !transcription.is_empty() {
        let request = TextPayload {
            is_audio: true,
            ..TextPayload::new(transcription.clone())
        };
        handle_text(state, &conn.handle, request).await;
    }

    let message = ServerMessage::success(
        RequestType::Control,
        format!("Audio stream stopped, transcription: {}", transcription),
    )
    .with_detail("transcription", transcription);
    respond(state, &conn.handle, message).await;
}

async fn transcribe(state: &AppState, blob: Bytes, file_name: &str) -> Result<String, ProviderError> {
    state.transcriber()?.transcribe(blob, file_name).await
}

fn recording_file_name(client_id: &str) -> String {
    let safe_id: String = client_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!(
        "audio_{}_{}.wav",
        safe_id,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    )
}

async fn archive_recording(dir: &Path, file_name: &str, blob: &[u8]) {
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        warn!(error = %e, dir = %dir.display(), "Cannot create audio archive directory");
        return;
    }
    let path = dir.join(file_name);
    match tokio::fs::write(&path, blob).await {
        Ok(()) => debug!(path = %path.display(), "Recording archived"),
        Err(e) => warn!(error = %e, path = %path.display(), "Failed to archive recording"),
    }
}

/// Validates the photo, asks the vision provider to describe it and feeds the
/// description into the conversation as the user's own words.
pub async fn handle_image(state: &AppState, conn: &ConnectionHandle, payload: ImagePayload) {
    let image = match decode_image(&payload.image) {
        Ok(image) => image,
        Err(e) => {
            warn!(error = %e, "Rejected image");
            respond(
                state,
                conn,
                ServerMessage::error(RequestType::Image, e.to_string()),
            )
            .await;
            return;
        }
    };
    info!(
        bytes = image.bytes.len(),
        format = ?image.format,
        width = image.width,
        height = image.height,
        "Image received"
    );

    let description = match describe(state, &image.bytes, image.mime_type()).await {
        Ok(description) => description,
        Err(e) => {
            error!(error = %e, "Image analysis failed");
            respond(
                state,
                conn,
                ServerMessage::error(RequestType::Image, format!("Image analysis failed: {}", e)),
            )
            .await;
            return;
        }
    };
    info!(%description, "Image analysed");

    let request = TextPayload {
        content: format!("This photo is me right now: {}", description),
        model: payload.model,
        is_audio: payload.is_audio,
        has_image: true,
    };
    handle_text(state, conn, request).await;
}

async fn describe(state: &AppState, image: &[u8], mime_type: &str) -> Result<String, ProviderError> {
    state
        .vision()?
        .analyze(image, mime_type, &state.prompts.vision)
        .await
}

/// Answers each viewer chat comment of a live stream batch and fans the
/// replies out to the live stream clients. Gifts, likes and other events are
/// skipped.
pub async fn handle_comments(state: &AppState, conn: &ConnectionHandle, batch: CommentBatch) {
    let comments: Vec<&CommentEvent> = batch.chat_comments().collect();
    debug!(
        events = batch.comments.len(),
        comments = comments.len(),
        "Comment batch received"
    );

    let prefix = state.config.livestream_prefix.as_str();
    let mut replies = 0usize;
    for comment in &comments {
        match reply_to_comment(state, conn, comment).await {
            Ok(reply) => {
                let delivered = state
                    .sessions
                    .send_to_matching(|id| id.starts_with(prefix), &reply)
                    .await;
                info!(viewer = %comment.user.name, delivered, "Comment reply broadcast");
                replies += 1;
            }
            Err(e) => {
                error!(error = %e, viewer = %comment.user.name, "Comment reply failed");
                respond(
                    state,
                    conn,
                    ServerMessage::error(
                        RequestType::Comment,
                        format!("Failed to reply to comment: {}", e),
                    ),
                )
                .await;
            }
        }
    }

    let message = ServerMessage::success(
        RequestType::Comment,
        format!("Processed {} comments", comments.len()),
    )
    .with_detail("replies", replies);
    respond(state, conn, message).await;
}

async fn reply_to_comment(
    state: &AppState,
    conn: &ConnectionHandle,
    comment: &CommentEvent,
) -> Result<ServerMessage, ProviderError> {
    let viewer = match comment.user.name.trim() {
        "" => ANONYMOUS_VIEWER,
        name => name,
    };
    let line = format!("{} says: {}", viewer, comment.content.trim());

    let mut conversation = state
        .sessions
        .get_history(&conn.id)
        .await
        .unwrap_or_default();
    conversation.push(Turn::user(line.clone()));

    let reply = state
        .chat
        .complete(&conversation, &state.prompts.system)
        .await?;
    state
        .sessions
        .append_exchange(conn, Turn::user(line.clone()), Turn::assistant(reply.clone()))
        .await;

    let audio = speak(state, &reply).await;
    let mut message = persona_reply(state, &reply).with_audio(audio);
    message.prompt = Some(line);
    Ok(message.into())
}
