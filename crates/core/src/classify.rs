//! Single-shot classification calls made alongside a chat reply.
//!
//! Both calls prepend a fixed instruction to the conversation and expect one
//! token back. Anything unparseable, including a provider failure, yields the
//! documented default instead of an error.

use crate::{history::Turn, llm_client::ChatProvider, prompts::Prompts};
use tracing::warn;

pub const DEFAULT_ANIMATION_INDEX: u32 = 1;
pub const DEFAULT_PHOTO_INTENT: bool = false;

/// Reads an animation index from a completion such as `"2"` or `" 7\n"`.
pub fn parse_animation_index(output: &str) -> u32 {
    output
        .trim()
        .trim_end_matches('.')
        .parse()
        .unwrap_or(DEFAULT_ANIMATION_INDEX)
}

/// Reads a photo-intent verdict; only `true` (any case) counts.
pub fn parse_photo_intent(output: &str) -> bool {
    output.trim().trim_end_matches('.').eq_ignore_ascii_case("true")
}

/// Picks the avatar animation for the conversation so far.
pub async fn select_animation(
    chat: &dyn ChatProvider,
    prompts: &Prompts,
    conversation: &[Turn],
    model: &str,
) -> u32 {
    match chat.complete(conversation, &prompts.animation_for(model)).await {
        Ok(output) => {
            let index = parse_animation_index(&output);
            if index == DEFAULT_ANIMATION_INDEX && output.trim() != "1" {
                warn!(%output, "Animation index was not a number, using default");
            }
            index
        }
        Err(e) => {
            warn!(error = %e, "Animation selection failed, using default");
            DEFAULT_ANIMATION_INDEX
        }
    }
}

/// Asks whether the user wants the client to take a photo.
pub async fn detect_photo_intent(
    chat: &dyn ChatProvider,
    prompts: &Prompts,
    conversation: &[Turn],
) -> bool {
    match chat.complete(conversation, &prompts.photo_intent).await {
        Ok(output) => parse_photo_intent(&output),
        Err(e) => {
            warn!(error = %e, "Photo intent detection failed, using default");
            DEFAULT_PHOTO_INTENT
        }
    }
}
