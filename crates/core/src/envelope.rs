//! Inbound Message Parsing
//!
//! Turns a raw WebSocket text frame into a typed [`Envelope`]. Two wire shapes
//! converge here:
//!
//! - the typed envelope `{"type": "...", "data": {...}}`;
//! - a bare JSON array, the legacy comment-batch format pushed by the live
//!   stream relay.
//!
//! Parsing is pure and never partially succeeds: a frame either yields a
//! fully validated envelope or a [`ParseError`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The Live2D model assumed when a text message does not name one.
pub const DEFAULT_MODEL: &str = "Hiyori";

/// Live stream event method that carries a viewer chat message.
pub const CHAT_COMMENT_METHOD: &str = "WebcastChatMessage";

/// The kind of an inbound envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Audio,
    Image,
    Control,
    Comment,
}

impl MessageKind {
    /// The payload field that must be present for this kind.
    pub fn required_field(self) -> &'static str {
        match self {
            MessageKind::Text => "content",
            MessageKind::Audio => "chunk",
            MessageKind::Image => "image",
            MessageKind::Control => "action",
            MessageKind::Comment => "comments",
        }
    }

    fn from_wire(kind: &str) -> Option<Self> {
        match kind {
            "text" => Some(MessageKind::Text),
            "audio" => Some(MessageKind::Audio),
            "image" => Some(MessageKind::Image),
            "control" => Some(MessageKind::Control),
            "comment" => Some(MessageKind::Comment),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Text => "text",
            MessageKind::Audio => "audio",
            MessageKind::Image => "image",
            MessageKind::Control => "control",
            MessageKind::Comment => "comment",
        };
        f.write_str(name)
    }
}

/// Reasons a frame could not be turned into an [`Envelope`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("envelope must be an object with `type` and `data` fields")]
    NotAnEnvelope,
    #[error("unknown message type `{0}`")]
    UnknownKind(String),
    #[error("{kind} message is missing required field `{field}`")]
    MissingField {
        kind: MessageKind,
        field: &'static str,
    },
    #[error("{kind} message has an invalid payload: {reason}")]
    InvalidPayload { kind: MessageKind, reason: String },
}

impl ParseError {
    /// The envelope kind the error belongs to, when it could be determined.
    pub fn kind(&self) -> Option<MessageKind> {
        match self {
            ParseError::MissingField { kind, .. } | ParseError::InvalidPayload { kind, .. } => {
                Some(*kind)
            }
            _ => None,
        }
    }
}

/// A chat message typed by the user.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextPayload {
    pub content: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub is_audio: bool,
    #[serde(default)]
    pub has_image: bool,
}

impl TextPayload {
    /// A text payload with the default model and no flags set.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: default_model(),
            is_audio: false,
            has_image: false,
        }
    }
}

/// One base64 encoded slice of a recording.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AudioPayload {
    pub chunk: String,
    /// Advisory only. Finalization is driven by the `stop_audio_stream` action.
    #[serde(default)]
    pub is_final: bool,
}

/// A base64 encoded photo to be described by the vision provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImagePayload {
    pub image: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub is_audio: bool,
}

/// Control actions understood by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlAction {
    StartAudioStream,
    StopAudioStream,
    /// Kept verbatim so the error reply can name it.
    Unknown(String),
}

impl From<String> for ControlAction {
    fn from(action: String) -> Self {
        match action.as_str() {
            "start_audio_stream" => ControlAction::StartAudioStream,
            "stop_audio_stream" => ControlAction::StopAudioStream,
            _ => ControlAction::Unknown(action),
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlAction::StartAudioStream => f.write_str("start_audio_stream"),
            ControlAction::StopAudioStream => f.write_str("stop_audio_stream"),
            ControlAction::Unknown(action) => f.write_str(action),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ControlPayload {
    #[serde(deserialize_with = "deserialize_action")]
    pub action: ControlAction,
}

fn deserialize_action<'de, D>(deserializer: D) -> Result<ControlAction, D::Error>
where
    D: serde::Deserializer<'de>,
{
    String::deserialize(deserializer).map(ControlAction::from)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CommentUser {
    #[serde(default)]
    pub name: String,
}

/// One live stream event. Only chat events with content become comments;
/// gifts, likes and joins travel through the same batch and are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CommentEvent {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub user: CommentUser,
    #[serde(default)]
    pub content: String,
}

impl CommentEvent {
    pub fn is_chat(&self) -> bool {
        self.method == CHAT_COMMENT_METHOD && !self.content.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentBatch {
    pub comments: Vec<CommentEvent>,
}

impl CommentBatch {
    /// The events that are real viewer comments, in arrival order.
    pub fn chat_comments(&self) -> impl Iterator<Item = &CommentEvent> {
        self.comments.iter().filter(|event| event.is_chat())
    }
}

/// A validated inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Text(TextPayload),
    Audio(AudioPayload),
    Image(ImagePayload),
    Control(ControlPayload),
    Comment(CommentBatch),
}

impl Envelope {
    pub fn kind(&self) -> MessageKind {
        match self {
            Envelope::Text(_) => MessageKind::Text,
            Envelope::Audio(_) => MessageKind::Audio,
            Envelope::Image(_) => MessageKind::Image,
            Envelope::Control(_) => MessageKind::Control,
            Envelope::Comment(_) => MessageKind::Comment,
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

/// Parses one raw text frame.
pub fn parse_frame(raw: &str) -> Result<Envelope, ParseError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    match value {
        Value::Array(events) => Ok(Envelope::Comment(parse_comment_events(events))),
        Value::Object(object) => parse_typed(object),
        _ => Err(ParseError::NotAnEnvelope),
    }
}

fn parse_typed(mut object: Map<String, Value>) -> Result<Envelope, ParseError> {
    let kind_name = match object.get("type") {
        Some(Value::String(kind)) => kind.clone(),
        _ => return Err(ParseError::NotAnEnvelope),
    };
    let kind =
        MessageKind::from_wire(&kind_name).ok_or(ParseError::UnknownKind(kind_name))?;

    let data = match object.remove("data") {
        Some(Value::Object(data)) => data,
        Some(Value::Null) | None => Map::new(),
        Some(_) => {
            return Err(ParseError::InvalidPayload {
                kind,
                reason: "`data` must be an object".to_string(),
            });
        }
    };

    let field = kind.required_field();
    if !data.contains_key(field) {
        return Err(ParseError::MissingField { kind, field });
    }

    match kind {
        MessageKind::Text => payload(kind, data).map(Envelope::Text),
        MessageKind::Audio => payload(kind, data).map(Envelope::Audio),
        MessageKind::Image => payload(kind, data).map(Envelope::Image),
        MessageKind::Control => payload(kind, data).map(Envelope::Control),
        MessageKind::Comment => match data.get(field) {
            Some(Value::Array(events)) => {
                Ok(Envelope::Comment(parse_comment_events(events.clone())))
            }
            _ => Err(ParseError::InvalidPayload {
                kind,
                reason: "`comments` must be an array".to_string(),
            }),
        },
    }
}

fn payload<T>(kind: MessageKind, data: Map<String, Value>) -> Result<T, ParseError>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(Value::Object(data)).map_err(|e| ParseError::InvalidPayload {
        kind,
        reason: e.to_string(),
    })
}

/// Elements that do not look like events at all are dropped rather than
/// failing the batch; the relay mixes many event shapes into one array.
fn parse_comment_events(events: Vec<Value>) -> CommentBatch {
    let comments = events
        .into_iter()
        .filter_map(|event| serde_json::from_value::<CommentEvent>(event).ok())
        .collect();
    CommentBatch { comments }
}
