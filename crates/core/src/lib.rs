//! Companion Core
//!
//! Transport-independent pieces of the companion server: inbound message
//! parsing, per-connection audio assembly, conversation history, instruction
//! prompts, and the clients for the external chat, vision, transcription and
//! speech providers.

pub mod audio;
pub mod classify;
pub mod envelope;
pub mod error;
pub mod history;
pub mod image_check;
pub mod llm_client;
pub mod prompts;
pub mod speech;
