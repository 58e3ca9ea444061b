//! Core types for the lattice-serve ASR serving system
//!
//! This crate provides the foundational pieces shared by the decoding core
//! and the transport layer:
//! - Recognition result and request/response types
//! - Audio stream decoding (WAV containers, raw PCM16)
//! - The error taxonomy
//! - The trait seam to the external ASR engine library

pub mod audio;
pub mod engine;
pub mod error;
pub mod types;

pub use audio::{chunk_length, read_raw_pcm, WavAudio};
pub use engine::{
    DecodableOpts, DecoderOpts, Engine, EngineModelConfig, LatticeHandle, MbrWord, ModelArtifacts,
    NbestPath, RnnlmOpts, RnnlmPaths, UtteranceState, WordAlignment,
};
pub use error::{AudioError, EngineError, Result, ServeError};
pub use types::{
    calculate_confidence, Alternative, ModelId, RecognitionConfig, RecognizeRequest,
    RecognizeResponse, SpeechRecognitionResult, UtteranceResult, Word,
};
