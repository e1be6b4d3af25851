//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like the connection registry and provider clients.

use crate::{config::Config, ws::registry::SessionManager};
use companion_core::{
    error::ProviderError,
    llm_client::{ChatProvider, VisionProvider},
    prompts::Prompts,
    speech::{SpeechToText, TextToSpeech, VoiceParams},
};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub chat: Arc<dyn ChatProvider>,
    pub vision: Option<Arc<dyn VisionProvider>>,
    pub transcriber: Option<Arc<dyn SpeechToText>>,
    /// `None` when speech synthesis is globally disabled.
    pub tts: Option<Arc<dyn TextToSpeech>>,
    pub voice: VoiceParams,
    pub prompts: Arc<Prompts>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn vision(&self) -> Result<&Arc<dyn VisionProvider>, ProviderError> {
        self.vision
            .as_ref()
            .ok_or(ProviderError::NotConfigured("vision"))
    }

    pub fn transcriber(&self) -> Result<&Arc<dyn SpeechToText>, ProviderError> {
        self.transcriber
            .as_ref()
            .ok_or(ProviderError::NotConfigured("speech-to-text"))
    }
}
