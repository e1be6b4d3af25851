//! Speech-to-text and text-to-speech clients.

use crate::error::ProviderError;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, error};

/// Voice settings forwarded to the TTS service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceParams {
    pub voice: String,
    pub rate: String,
    pub pitch: String,
    pub volume: String,
}

impl VoiceParams {
    pub fn new(voice: impl Into<String>) -> Self {
        Self {
            voice: voice.into(),
            ..Self::default()
        }
    }
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            voice: "zh-CN-XiaoxiaoNeural".to_string(),
            rate: "0%".to_string(),
            pitch: "0Hz".to_string(),
            volume: "0%".to_string(),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribes one complete recording uploaded as `file_name`.
    async fn transcribe(&self, audio: Bytes, file_name: &str) -> Result<String, ProviderError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Synthesizes `text` and returns a URL the client can play.
    async fn synthesize(&self, text: &str, voice: &VoiceParams) -> Result<String, ProviderError>;
}

/// Transcription through an OpenAI-style `/audio/transcriptions` endpoint
/// (SiliconFlow by default).
pub struct TranscriptionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl TranscriptionClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl SpeechToText for TranscriptionClient {
    async fn transcribe(&self, audio: Bytes, file_name: &str) -> Result<String, ProviderError> {
        let size = audio.len();
        let part = Part::bytes(audio.to_vec())
            .file_name(file_name.to_string())
            .mime_str("audio/wav")?;
        let form = Form::new()
            .part("file", part)
            .text("model", self.model.clone());

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), %body, "Transcription request failed");
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        debug!(bytes = size, text = %parsed.text, "Transcription received");
        Ok(parsed.text)
    }
}

/// Client for the speech service that renders text to an audio file and
/// answers with the file's path.
pub struct TtsClient {
    http: reqwest::Client,
    api_url: String,
    audio_url: String,
}

impl TtsClient {
    /// * `api_url` - Base URL of the TTS service.
    /// * `audio_url` - Prefix joined to the returned audio path to form a
    ///   URL reachable by clients.
    pub fn new(
        api_url: impl Into<String>,
        audio_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            audio_url: audio_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    #[serde(flatten)]
    voice: &'a VoiceParams,
}

#[derive(Deserialize)]
struct TtsResponse {
    #[serde(default)]
    success: bool,
    data: Option<TtsAudio>,
}

#[derive(Deserialize)]
struct TtsAudio {
    audio: String,
}

#[async_trait]
impl TextToSpeech for TtsClient {
    async fn synthesize(&self, text: &str, voice: &VoiceParams) -> Result<String, ProviderError> {
        let response = self
            .http
            .post(format!("{}/api/v1/tts/generate", self.api_url))
            .json(&TtsRequest { text, voice })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TtsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        match parsed.data {
            Some(data) if parsed.success => {
                let separator = if data.audio.starts_with('/') { "" } else { "/" };
                Ok(format!("{}{}{}", self.audio_url, separator, data.audio))
            }
            _ => Err(ProviderError::MalformedResponse(
                "TTS service did not report success".into(),
            )),
        }
    }
}

/// Pictographs, presentation emoji, skin tone modifiers and the joiners,
/// selectors and tags that glue emoji sequences together.
static EMOJI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"[\p{Extended_Pictographic}\p{Emoji_Presentation}\p{Emoji_Modifier}\x{FE0F}\x{200D}\x{20E3}\x{E0020}-\x{E007F}]",
    )
    .expect("emoji pattern compiles")
});

/// Removes emoji and the `（*^^*）` kaomoji so they are not read aloud.
pub fn strip_emoji(text: &str) -> String {
    EMOJI
        .replace_all(&text.replace("（*^^*）", ""), "")
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn timeout() -> Duration {
        Duration::from_secs(5)
    }

    #[test]
    fn strip_emoji_keeps_text() {
        assert_eq!(strip_emoji("Hi there 😊✨!"), "Hi there !");
        assert_eq!(strip_emoji("好的（*^^*）👍🏻"), "好的");
        assert_eq!(strip_emoji("plain, text. 123"), "plain, text. 123");
        assert_eq!(
            strip_emoji("wake up ⏰ time ⌛ done ✅"),
            "wake up  time  done "
        );
        assert_eq!(strip_emoji("flag 🇨🇳 family 👨‍👩‍👧 key #️⃣"), "flag  family  key #");
        assert_eq!(strip_emoji("價格 #1 * 2"), "價格 #1 * 2");
    }

    #[tokio::test]
    async fn transcription_uploads_the_recording() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .and(header("authorization", "Bearer stt-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "hello"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = TranscriptionClient::new(
            format!("{}/v1/", server.uri()),
            "stt-key",
            "FunAudioLLM/SenseVoiceSmall",
            timeout(),
        )
        .unwrap();
        let text = client
            .transcribe(Bytes::from_static(b"RIFF...."), "audio.wav")
            .await
            .unwrap();
        assert_eq!(text, "hello");

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("filename=\"audio.wav\""));
        assert!(body.contains("FunAudioLLM/SenseVoiceSmall"));
    }

    #[tokio::test]
    async fn transcription_reports_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("denied"))
            .mount(&server)
            .await;

        let client =
            TranscriptionClient::new(server.uri(), "bad", "model", timeout()).unwrap();
        let err = client
            .transcribe(Bytes::from_static(b"x"), "a.wav")
            .await
            .unwrap_err();
        match err {
            ProviderError::Status { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "denied");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn tts_returns_a_playable_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/tts/generate"))
            .and(body_json(json!({
                "text": "hello",
                "voice": "zh-CN-XiaoxiaoNeural",
                "rate": "0%",
                "pitch": "0Hz",
                "volume": "0%"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {"audio": "/audio/abc.mp3"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = TtsClient::new(server.uri(), "http://cdn.local/", timeout()).unwrap();
        let url = client
            .synthesize("hello", &VoiceParams::default())
            .await
            .unwrap();
        assert_eq!(url, "http://cdn.local/audio/abc.mp3");
    }

    #[tokio::test]
    async fn tts_without_success_flag_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false})))
            .mount(&server)
            .await;

        let client = TtsClient::new(server.uri(), server.uri(), timeout()).unwrap();
        let err = client
            .synthesize("hello", &VoiceParams::new("en-US-AriaNeural"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }
}
