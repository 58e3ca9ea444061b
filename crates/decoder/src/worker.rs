//! Decoder worker: per-utterance mutable decoding state
//!
//! A worker is either *idle* (no utterance state) or *active* (all
//! per-utterance engine state present). It is exclusively owned by the
//! pool when idle and by exactly one request driver when active.

use std::sync::Arc;

use lattice_serve_core::audio::{chunk_length, read_raw_pcm, WavAudio};
use lattice_serve_core::engine::UtteranceState;
use lattice_serve_core::{Result, ServeError, UtteranceResult};

use crate::bundle::ModelBundle;
use crate::lattice;

/// Per-utterance state, constructed whole on `begin` and dropped on `end`.
struct ActiveUtterance {
    state: Box<dyn UtteranceState>,
    request_id: String,
}

/// One reusable decoder bound to a model bundle.
pub struct DecoderWorker {
    bundle: Arc<ModelBundle>,
    active: Option<ActiveUtterance>,
}

impl DecoderWorker {
    pub(crate) fn new(bundle: Arc<ModelBundle>) -> Self {
        Self {
            bundle,
            active: None,
        }
    }

    pub fn bundle(&self) -> &ModelBundle {
        &self.bundle
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.request_id.as_str())
    }

    /// Bind the worker to a request and construct fresh utterance state.
    ///
    /// Calling this on an already-active worker discards the previous
    /// utterance first, so `begin` is equivalent to `end(); begin()`.
    pub fn begin(&mut self, request_id: impl Into<String>) -> Result<()> {
        self.active = None;
        let state = self.bundle.artifacts().start_utterance()?;
        self.active = Some(ActiveUtterance {
            state,
            request_id: request_id.into(),
        });
        Ok(())
    }

    /// Return the worker to idle, tearing down all per-utterance state.
    pub fn end(&mut self) {
        self.active = None;
    }

    /// Decode one intermediate chunk of a WAV stream; each chunk carries
    /// its own header, from which the sample rate is taken.
    pub fn feed_wav_chunk(&mut self, bytes: &[u8]) -> Result<()> {
        let wav = WavAudio::parse(bytes)?;
        self.advance(&wav.samples, wav.sample_rate)
    }

    /// Decode one intermediate chunk of raw headerless mono 16-bit PCM.
    pub fn feed_raw_chunk(&mut self, bytes: &[u8], sample_rate: f32, data_bytes: usize) -> Result<()> {
        let samples = read_raw_pcm(bytes, data_bytes)?;
        self.advance(&samples, sample_rate)
    }

    /// Decode an independent WAV stream, slicing it internally into chunks
    /// of `floor(sample_rate * chunk_seconds)` samples.
    pub fn feed_full_wav(&mut self, bytes: &[u8], chunk_seconds: f32) -> Result<()> {
        let wav = WavAudio::parse(bytes)?;
        self.feed_sliced(&wav.samples, wav.sample_rate, chunk_seconds)
    }

    /// Decode an independent raw PCM stream, sliced like [`feed_full_wav`].
    ///
    /// [`feed_full_wav`]: DecoderWorker::feed_full_wav
    pub fn feed_full_raw(
        &mut self,
        bytes: &[u8],
        sample_rate: f32,
        data_bytes: usize,
        chunk_seconds: f32,
    ) -> Result<()> {
        let samples = read_raw_pcm(bytes, data_bytes)?;
        self.feed_sliced(&samples, sample_rate, chunk_seconds)
    }

    fn feed_sliced(&mut self, samples: &[f32], sample_rate: f32, chunk_seconds: f32) -> Result<()> {
        let chunk_len = chunk_length(sample_rate, chunk_seconds, samples.len());
        for part in samples.chunks(chunk_len) {
            self.advance(part, sample_rate)?;
        }
        Ok(())
    }

    /// Extract the current n-best alternatives.
    ///
    /// With `interim = false` the input is finalized first (end-of-input,
    /// drain, finalize) and no further audio may be fed. With
    /// `interim = true` the lattice reflects the current frontier and the
    /// worker stays fed-able. An utterance with zero decoded frames yields
    /// an empty result with a warning, not an error.
    pub fn results(
        &mut self,
        n_best: usize,
        word_level: bool,
        interim: bool,
    ) -> Result<UtteranceResult> {
        let bundle = Arc::clone(&self.bundle);
        let active = self.active_mut()?;

        if !interim {
            active.state.input_finished()?;
            active.state.advance_decoding()?;
            active.state.finalize_decoding()?;
        }

        if active.state.frames_decoded() == 0 {
            tracing::warn!(
                request_id = %active.request_id,
                "audio may be empty: decoded no frames"
            );
            return Ok(Vec::new());
        }

        let clat = active.state.lattice(true)?;
        lattice::find_alternatives(&bundle, &clat, n_best, word_level)
    }

    /// Advance decoding by one wave part. Ordering is strict: feature
    /// emission precedes silence re-weighting precedes decoder advance.
    fn advance(&mut self, samples: &[f32], sample_rate: f32) -> Result<()> {
        let active = self.active_mut()?;
        active.state.accept_waveform(sample_rate, samples)?;
        active.state.reweight_silence()?;
        active.state.advance_decoding()?;
        Ok(())
    }

    fn active_mut(&mut self) -> Result<&mut ActiveUtterance> {
        self.active
            .as_mut()
            .ok_or_else(|| ServeError::EngineInternal("decoder has no active utterance".into()))
    }
}

impl std::fmt::Debug for DecoderWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderWorker")
            .field("model", self.bundle.id())
            .field("active", &self.is_active())
            .finish()
    }
}
