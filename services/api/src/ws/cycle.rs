//! The conversation cycle behind every chat reply.

use crate::{
    state::AppState,
    ws::{protocol::ReplyMessage, registry::ConnectionHandle},
};
use companion_core::{
    classify,
    envelope::TextPayload,
    error::ProviderError,
    history::Turn,
    speech::strip_emoji,
};
use tracing::{info, instrument, warn};

/// Handles one user utterance:
///
/// 1. Builds the conversation from the client's history plus the new turn.
/// 2. Asks the chat provider for the reply.
/// 3. Classifies the conversation for an animation index and, unless the turn
///    came from a photo, for photo intent.
/// 4. Records the user turn and the reply in the client's history.
/// 5. Synthesizes speech when the request asked for audio and TTS is enabled.
///
/// History is only touched once the reply exists, so a provider failure
/// leaves it as it was.
#[instrument(
    skip_all,
    fields(client_id = %conn.id, model = %request.model, is_audio = request.is_audio)
)]
pub async fn run_text_cycle(
    state: &AppState,
    conn: &ConnectionHandle,
    request: &TextPayload,
) -> Result<ReplyMessage, ProviderError> {
    let mut conversation = state
        .sessions
        .get_history(&conn.id)
        .await
        .unwrap_or_default();
    conversation.push(Turn::user(request.content.clone()));

    let reply = state
        .chat
        .complete(&conversation, &state.prompts.system)
        .await?;
    info!(chars = reply.len(), "Chat reply generated");

    let chat = state.chat.as_ref();
    let (animation_index, should_take_photo) = tokio::join!(
        classify::select_animation(chat, &state.prompts, &conversation, &request.model),
        async {
            if request.has_image {
                false
            } else {
                classify::detect_photo_intent(chat, &state.prompts, &conversation).await
            }
        }
    );

    state
        .sessions
        .append_exchange(
            conn,
            Turn::user(request.content.clone()),
            Turn::assistant(reply.clone()),
        )
        .await;

    let audio = if request.is_audio {
        speak(state, &reply).await
    } else {
        String::new()
    };

    Ok(ReplyMessage {
        animation_index: Some(animation_index),
        should_take_photo: Some(should_take_photo),
        ..persona_reply(state, &reply).with_audio(audio)
    })
}

/// The reply text as shown to the client, prefixed with the persona's name.
pub fn persona_reply(state: &AppState, reply: &str) -> ReplyMessage {
    ReplyMessage::text(format!("{}: {}", state.config.persona_name, reply))
}

/// Synthesizes `text` when TTS is enabled. Any failure yields an empty URL;
/// the reply is still delivered without audio.
pub async fn speak(state: &AppState, text: &str) -> String {
    let Some(tts) = &state.tts else {
        return String::new();
    };
    let clean = strip_emoji(text);
    if clean.trim().is_empty() {
        return String::new();
    }
    match tts.synthesize(&clean, &state.voice).await {
        Ok(url) => url,
        Err(e) => {
            warn!(error = %e, "Speech synthesis failed; sending reply without audio");
            String::new()
        }
    }
}
