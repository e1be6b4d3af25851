//! Scripted providers and state builders shared by the handler tests.

use crate::{
    config::Config,
    state::AppState,
    ws::{dispatch::ConnectionContext, registry::SessionManager},
};
use async_trait::async_trait;
use bytes::Bytes;
use companion_core::{
    error::ProviderError,
    history::Turn,
    llm_client::{ChatProvider, VisionProvider},
    prompts::Prompts,
    speech::{SpeechToText, TextToSpeech, VoiceParams},
};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// A chat provider that answers by system prompt: the persona prompt gets
/// `reply`, the photo intent prompt gets `photo_intent`, anything else is
/// treated as the animation prompt.
pub(crate) struct ScriptedChat {
    prompts: Prompts,
    pub reply: String,
    pub animation: String,
    pub photo_intent: String,
    pub fail_replies: bool,
    calls: Mutex<Vec<(Vec<Turn>, String)>>,
}

impl ScriptedChat {
    pub fn new(reply: &str) -> Self {
        Self {
            prompts: Prompts::builtin(),
            reply: reply.to_string(),
            animation: "3".to_string(),
            photo_intent: "false".to_string(),
            fail_replies: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_replies: true,
            ..Self::new("")
        }
    }

    /// Conversations sent with the persona prompt, in call order.
    pub fn reply_calls(&self) -> Vec<Vec<Turn>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, system)| *system == self.prompts.system)
            .map(|(history, _)| history.clone())
            .collect()
    }

    pub fn photo_intent_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, system)| *system == self.prompts.photo_intent)
            .count()
    }
}

#[async_trait]
impl ChatProvider for ScriptedChat {
    async fn complete(&self, history: &[Turn], system_prompt: &str) -> Result<String, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push((history.to_vec(), system_prompt.to_string()));

        if system_prompt == self.prompts.system {
            if self.fail_replies {
                return Err(ProviderError::Status {
                    status: 503,
                    body: "overloaded".to_string(),
                });
            }
            Ok(self.reply.clone())
        } else if system_prompt == self.prompts.photo_intent {
            Ok(self.photo_intent.clone())
        } else {
            Ok(self.animation.clone())
        }
    }
}

pub(crate) struct FakeVision {
    pub description: String,
    pub mime_types: Mutex<Vec<String>>,
}

impl FakeVision {
    pub fn new(description: &str) -> Self {
        Self {
            description: description.to_string(),
            mime_types: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VisionProvider for FakeVision {
    async fn analyze(
        &self,
        _image: &[u8],
        mime_type: &str,
        _prompt: &str,
    ) -> Result<String, ProviderError> {
        self.mime_types.lock().unwrap().push(mime_type.to_string());
        Ok(self.description.clone())
    }
}

pub(crate) struct FakeTranscriber {
    pub text: String,
    pub received: Mutex<Vec<(Bytes, String)>>,
}

impl FakeTranscriber {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            received: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SpeechToText for FakeTranscriber {
    async fn transcribe(&self, audio: Bytes, file_name: &str) -> Result<String, ProviderError> {
        self.received
            .lock()
            .unwrap()
            .push((audio, file_name.to_string()));
        Ok(self.text.clone())
    }
}

pub(crate) struct FakeTts {
    pub spoken: Mutex<Vec<String>>,
}

impl FakeTts {
    pub fn new() -> Self {
        Self {
            spoken: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TextToSpeech for FakeTts {
    async fn synthesize(&self, text: &str, _voice: &VoiceParams) -> Result<String, ProviderError> {
        let mut spoken = self.spoken.lock().unwrap();
        spoken.push(text.to_string());
        Ok(format!("http://tts.local/audio/{}.mp3", spoken.len()))
    }
}

/// State with the given chat provider and no optional providers.
pub(crate) fn state_with(chat: Arc<ScriptedChat>) -> AppState {
    let config = Config::local("test-key");
    AppState {
        sessions: Arc::new(SessionManager::new(config.history_max_turns)),
        chat,
        vision: None,
        transcriber: None,
        tts: None,
        voice: VoiceParams::default(),
        prompts: Arc::new(Prompts::builtin()),
        config: Arc::new(config),
    }
}

pub(crate) fn test_state() -> AppState {
    state_with(Arc::new(ScriptedChat::new("Nice to meet you!")))
}

/// Registers `id` and returns the receiving end of its frame channel.
pub(crate) async fn connect(state: &AppState, id: &str) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(32);
    state.sessions.register(id, tx).await;
    rx
}

/// Registers `id` and returns its connection context with the receiving end
/// of its frame channel.
pub(crate) async fn open(
    state: &AppState,
    id: &str,
) -> (ConnectionContext, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel(32);
    let handle = state.sessions.register(id, tx).await;
    (ConnectionContext::new(handle), rx)
}

/// Every frame queued so far, decoded.
pub(crate) fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(serde_json::from_str(&frame).unwrap());
    }
    frames
}
