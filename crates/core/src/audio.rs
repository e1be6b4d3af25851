//! Streaming audio assembly.
//!
//! A connection's recording moves `Idle -> Recording -> Idle`. Chunks are kept
//! as they arrive and concatenated exactly once, when the stream is stopped.

use base64::Engine;
use bytes::{Bytes, BytesMut};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("audio stream has not been started")]
    NotRecording,
    #[error("audio stream ended without any audio data")]
    EmptyRecording,
    #[error("audio chunk is empty")]
    EmptyChunk,
    #[error("audio chunk is not valid base64: {0}")]
    InvalidChunk(String),
}

#[derive(Debug, Default)]
enum StreamState {
    #[default]
    Idle,
    Recording(Vec<Bytes>),
}

/// Per-connection recording buffer.
#[derive(Debug, Default)]
pub struct AudioBuffer {
    state: StreamState,
}

impl AudioBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, StreamState::Recording(_))
    }

    /// Number of chunks held by the current recording.
    pub fn chunk_count(&self) -> usize {
        match &self.state {
            StreamState::Recording(chunks) => chunks.len(),
            StreamState::Idle => 0,
        }
    }

    /// Starts a fresh recording. Returns the number of chunks discarded when a
    /// recording was already in progress.
    pub fn start(&mut self) -> usize {
        let discarded = self.chunk_count();
        self.state = StreamState::Recording(Vec::new());
        discarded
    }

    /// Appends one decoded chunk and returns its size in bytes.
    pub fn append_chunk(&mut self, chunk: Bytes) -> Result<usize, StateError> {
        match &mut self.state {
            StreamState::Recording(chunks) => {
                let len = chunk.len();
                chunks.push(chunk);
                Ok(len)
            }
            StreamState::Idle => Err(StateError::NotRecording),
        }
    }

    /// Decodes a base64 chunk and appends it. Nothing is touched on failure.
    pub fn append_base64(&mut self, encoded: &str) -> Result<usize, StateError> {
        if !self.is_recording() {
            return Err(StateError::NotRecording);
        }
        if encoded.is_empty() {
            return Err(StateError::EmptyChunk);
        }
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| StateError::InvalidChunk(e.to_string()))?;
        self.append_chunk(Bytes::from(decoded))
    }

    /// Ends the recording and returns every chunk joined in receipt order.
    ///
    /// The buffer is idle afterwards whatever the outcome.
    pub fn stop(&mut self) -> Result<Bytes, StateError> {
        let chunks = match std::mem::take(&mut self.state) {
            StreamState::Recording(chunks) => chunks,
            StreamState::Idle => return Err(StateError::NotRecording),
        };

        let total: usize = chunks.iter().map(Bytes::len).sum();
        if total == 0 {
            return Err(StateError::EmptyRecording);
        }
        let mut blob = BytesMut::with_capacity(total);
        for chunk in &chunks {
            blob.extend_from_slice(chunk);
        }
        Ok(blob.freeze())
    }
}
