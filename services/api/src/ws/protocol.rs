//! Defines the outbound WebSocket messages sent from the server to clients.
//!
//! Two shapes share the socket:
//!
//! - a chat reply, `{"type": 1, "content": ..., "audio": ..., ...}`;
//! - a status acknowledgement, `{"type": "response", "data": {...}}`.

use companion_core::envelope::{MessageKind, ParseError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `type` code of a text reply. The client also knows 2 (image) and 3 (audio).
pub const REPLY_TYPE_TEXT: u8 = 1;

/// A reply to be rendered by the avatar client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReplyMessage {
    #[serde(rename = "type")]
    pub kind: u8,
    pub content: String,
    /// URL of the synthesized speech, empty when none was produced.
    pub audio: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub should_take_photo: Option<bool>,
    /// The viewer line a broadcast reply answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl ReplyMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: REPLY_TYPE_TEXT,
            content: content.into(),
            audio: String::new(),
            animation_index: None,
            should_take_photo: None,
            prompt: None,
        }
    }

    pub fn with_audio(mut self, audio: impl Into<String>) -> Self {
        self.audio = audio.into();
        self
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// The request an acknowledgement refers to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Text,
    Audio,
    Image,
    Control,
    Comment,
    /// The frame could not be classified at all.
    Unknown,
}

impl From<MessageKind> for RequestType {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Text => RequestType::Text,
            MessageKind::Audio => RequestType::Audio,
            MessageKind::Image => RequestType::Image,
            MessageKind::Control => RequestType::Control,
            MessageKind::Comment => RequestType::Comment,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status: Status,
    pub message: String,
    pub request_type: RequestType,
    /// Kind-specific fields such as `transcription`.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseTag {
    Response,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusResponse {
    #[serde(rename = "type")]
    pub tag: ResponseTag,
    pub data: StatusReport,
}

/// Messages sent from the server to the client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ServerMessage {
    Reply(ReplyMessage),
    Status(StatusResponse),
}

impl ServerMessage {
    fn status(status: Status, request_type: RequestType, message: impl Into<String>) -> Self {
        ServerMessage::Status(StatusResponse {
            tag: ResponseTag::Response,
            data: StatusReport {
                status,
                message: message.into(),
                request_type,
                details: Map::new(),
            },
        })
    }

    pub fn success(request_type: RequestType, message: impl Into<String>) -> Self {
        Self::status(Status::Success, request_type, message)
    }

    pub fn error(request_type: RequestType, message: impl Into<String>) -> Self {
        Self::status(Status::Error, request_type, message)
    }

    /// Error acknowledgement for a frame that failed to parse.
    pub fn parse_error(err: &ParseError) -> Self {
        let request_type = err.kind().map(RequestType::from).unwrap_or(RequestType::Unknown);
        Self::error(request_type, format!("Malformed message: {}", err))
    }

    /// Adds a kind-specific field to a status acknowledgement. Replies are
    /// returned unchanged.
    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        if let ServerMessage::Status(response) = &mut self {
            response.data.details.insert(key.to_string(), value.into());
        }
        self
    }

    /// Serializes the message into a text frame.
    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<ReplyMessage> for ServerMessage {
    fn from(reply: ReplyMessage) -> Self {
        ServerMessage::Reply(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reply_omits_unset_optional_fields() {
        let frame = ServerMessage::from(ReplyMessage::text("hello")).to_frame().unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({"type": 1, "content": "hello", "audio": ""}));
    }

    #[test]
    fn reply_round_trip_preserves_present_fields() {
        let reply = ReplyMessage {
            animation_index: Some(7),
            should_take_photo: Some(false),
            ..ReplyMessage::text("hi").with_audio("http://tts/a.mp3")
        };
        let frame = ServerMessage::from(reply.clone()).to_frame().unwrap();
        assert!(!frame.contains("null"));
        assert!(!frame.contains("prompt"));

        let decoded: ServerMessage = serde_json::from_str(&frame).unwrap();
        assert_eq!(decoded, ServerMessage::Reply(reply));
    }

    #[test]
    fn status_response_has_the_response_envelope_shape() {
        let message = ServerMessage::success(RequestType::Control, "stopped")
            .with_detail("transcription", "hello");
        let value: Value = serde_json::from_str(&message.to_frame().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "response",
                "data": {
                    "status": "success",
                    "message": "stopped",
                    "request_type": "control",
                    "transcription": "hello"
                }
            })
        );

        let decoded: ServerMessage = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn parse_errors_map_to_request_types() {
        let missing = ParseError::MissingField {
            kind: MessageKind::Image,
            field: "image",
        };
        let ServerMessage::Status(response) = ServerMessage::parse_error(&missing) else {
            panic!("expected a status response");
        };
        assert_eq!(response.data.status, Status::Error);
        assert_eq!(response.data.request_type, RequestType::Image);

        let invalid = ParseError::InvalidJson("eof".into());
        let ServerMessage::Status(response) = ServerMessage::parse_error(&invalid) else {
            panic!("expected a status response");
        };
        assert_eq!(response.data.request_type, RequestType::Unknown);
    }
}
