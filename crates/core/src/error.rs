//! Error taxonomy for the serving stack
//!
//! Request-path errors map 1:1 onto transport status codes: `ModelNotFound`
//! becomes NOT_FOUND, `InvalidAudio`/`InvalidRequest` become INVALID_ARGUMENT,
//! `EngineInternal` becomes INTERNAL. `ModelLoad` and `DuplicateModel` occur
//! at startup only.

use thiserror::Error;

use crate::types::ModelId;

/// Convenience alias used across the serving crates.
pub type Result<T, E = ServeError> = std::result::Result<T, E>;

/// Errors from audio container/stream decoding.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("malformed wav stream: {0}")]
    Malformed(String),

    #[error("empty audio stream (no data)")]
    Empty,
}

/// Errors raised by the ASR engine library.
///
/// The engine has exactly two failure modes the core cares about: fatal
/// errors caused by the input (bad audio, mis-configured model) and
/// everything else.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine fatal error: {0}")]
    Fatal(String),

    #[error("engine error: {0}")]
    Internal(String),
}

/// Top-level serving errors.
#[derive(Error, Debug)]
pub enum ServeError {
    /// Model artifacts could not be loaded at startup.
    #[error("failed to load model {model}: {reason}")]
    ModelLoad { model: String, reason: String },

    /// Two model specs resolved to the same id at startup.
    #[error("duplicate model id {0}")]
    DuplicateModel(ModelId),

    /// The request named a model the dispatcher does not know.
    #[error("model {0} not found")]
    ModelNotFound(ModelId),

    /// Malformed WAV/PCM, read underrun, or an input-caused engine failure.
    #[error("invalid audio: {0}")]
    InvalidAudio(String),

    /// Malformed request outside the audio payload itself.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unexpected engine failure.
    #[error("internal error: {0}")]
    EngineInternal(String),

    /// The transport dropped the request; no response is produced.
    #[error("request cancelled")]
    Cancelled,
}

impl From<AudioError> for ServeError {
    fn from(err: AudioError) -> Self {
        ServeError::InvalidAudio(err.to_string())
    }
}

impl From<EngineError> for ServeError {
    fn from(err: EngineError) -> Self {
        match err {
            // Fatal engine errors are caused by the input, not by server state.
            EngineError::Fatal(msg) => ServeError::InvalidAudio(msg),
            EngineError::Internal(msg) => ServeError::EngineInternal(msg),
        }
    }
}
