//! Trait seam to the external ASR engine library
//!
//! The engine (acoustic model, feature pipeline, decoding graph, FST and
//! lattice algorithms, RNNLM) is an external collaborator. These traits
//! describe exactly the touch-points the serving core uses; nothing behind
//! them is reimplemented here.
//!
//! Artifact sets are shared read-only across workers (`Send + Sync`);
//! per-utterance state is exclusively owned and only needs `Send`.

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::EngineError;

/// Opaque, engine-owned lattice handle.
///
/// Only the engine that produced a handle can interpret it; the serving
/// core just threads handles between lattice primitives.
pub struct LatticeHandle(Box<dyn Any + Send>);

impl LatticeHandle {
    pub fn new<T: Any + Send>(inner: T) -> Self {
        Self(Box::new(inner))
    }

    pub fn downcast_ref<T: Any + Send>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl std::fmt::Debug for LatticeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatticeHandle").finish_non_exhaustive()
    }
}

/// One linear path extracted from a lattice, best paths first.
#[derive(Debug, Clone)]
pub struct NbestPath {
    pub word_ids: Vec<u32>,
    pub lm_score: f32,
    pub am_score: f32,
}

/// One word of the minimum-Bayes-risk one-best, with frame times.
#[derive(Debug, Clone)]
pub struct MbrWord {
    pub word_id: u32,
    pub begin_frame: f32,
    pub end_frame: f32,
    pub confidence: f32,
}

/// Outcome of word-aligning a compact lattice.
#[derive(Debug)]
pub enum WordAlignment {
    /// Alignment succeeded.
    Aligned(LatticeHandle),
    /// Alignment was flagged incomplete but produced a non-empty lattice.
    Partial(LatticeHandle),
    /// The aligned lattice came out empty.
    Empty,
}

/// Lattice decoder search options.
#[derive(Debug, Clone, Copy)]
pub struct DecoderOpts {
    pub beam: f32,
    pub min_active: usize,
    pub max_active: usize,
    pub lattice_beam: f32,
}

/// Options of the decodable (acoustic-likelihood) computation.
#[derive(Debug, Clone, Copy)]
pub struct DecodableOpts {
    pub acoustic_scale: f32,
    pub frame_subsampling_factor: u32,
}

/// Paths of the RNNLM artifact trio; all three are required together.
#[derive(Debug, Clone)]
pub struct RnnlmPaths {
    /// Raw neural LM (`rnnlm/final.raw`).
    pub nnet: PathBuf,
    /// Word embedding matrix (`rnnlm/word_embedding.mat`).
    pub word_embedding: PathBuf,
    /// Backoff n-gram LM to subtract (`rnnlm/G.fst`).
    pub backoff_lm: PathBuf,
}

/// RNNLM rescoring options.
#[derive(Debug, Clone, Copy)]
pub struct RnnlmOpts {
    pub weight: f32,
    pub max_ngram_order: u32,
    pub bos_index: u32,
    pub eos_index: u32,
}

/// Everything the engine needs to materialize one model's artifact set.
///
/// Paths are resolved and validated by the caller; optional fields being
/// `None` means the corresponding feature is disabled for this model.
#[derive(Debug, Clone)]
pub struct EngineModelConfig {
    /// Model root directory. Relative paths inside the i-vector extractor
    /// config are resolved against this directory before the feature
    /// pipeline is initialized.
    pub model_dir: PathBuf,
    pub graph: PathBuf,
    pub acoustic_model: PathBuf,
    pub words: PathBuf,
    pub mfcc_conf: PathBuf,
    /// `None` disables i-vector extraction and silence weighting.
    pub ivector_conf: Option<PathBuf>,
    /// `None` disables word-level output.
    pub word_boundary: Option<PathBuf>,
    /// `None` disables RNNLM rescoring.
    pub rnnlm: Option<RnnlmPaths>,
    pub decoder: DecoderOpts,
    pub decodable: DecodableOpts,
    pub silence_weight: f32,
    pub rnnlm_opts: RnnlmOpts,
}

/// Process-wide entry point of an engine implementation.
pub trait Engine: Send + Sync {
    /// Load one model's artifact set from disk.
    ///
    /// The acoustic network is prepared for inference here, once: batchnorm
    /// and dropout switched to test mode and the network collapsed.
    fn load(&self, config: &EngineModelConfig) -> Result<Arc<dyn ModelArtifacts>, EngineError>;
}

/// Immutable, shareable artifact set of one loaded model.
///
/// All methods take `&self`; implementations must be safe for concurrent
/// readers. Anything that mutates lives in [`UtteranceState`] instead.
pub trait ModelArtifacts: Send + Sync {
    /// Construct the complete per-utterance mutable state: feature
    /// pipeline, adaptation state, silence weighting, decoder.
    fn start_utterance(&self) -> Result<Box<dyn UtteranceState>, EngineError>;

    /// Symbol-table lookup.
    fn word(&self, id: u32) -> Option<String>;

    /// Scale the acoustic component of a lattice's weights.
    fn scale_acoustic(&self, lattice: &LatticeHandle, scale: f64) -> LatticeHandle;

    /// Scale both weight components of a lattice.
    fn scale_lattice(
        &self,
        lattice: &LatticeHandle,
        lm_scale: f64,
        acoustic_scale: f64,
    ) -> LatticeHandle;

    /// Topologically sort the lattice if it is not already sorted.
    fn top_sort_if_needed(&self, lattice: &LatticeHandle) -> LatticeHandle;

    /// Compose the lattice (pruned) with the on-demand RNNLM difference LM
    /// `scale(-w, backoff(G)) ∘ scale(w, rnnlm)`.
    ///
    /// Returns `Ok(None)` when the composition came out empty.
    fn compose_rnnlm_pruned(
        &self,
        lattice: &LatticeHandle,
    ) -> Result<Option<LatticeHandle>, EngineError>;

    /// The `n` shortest paths through the lattice as linear symbol
    /// sequences with their weight components.
    fn nbest(&self, lattice: &LatticeHandle, n: usize) -> Vec<NbestPath>;

    /// Word-align the lattice against the model's word-boundary info.
    fn word_align(&self, lattice: &LatticeHandle) -> WordAlignment;

    /// Minimum-Bayes-risk one-best words with per-word confidences
    /// (`decode_mbr = false`: confidences only, no MBR decoding).
    fn mbr_one_best(&self, lattice: &LatticeHandle) -> Vec<MbrWord>;
}

/// Per-utterance mutable decoding state, exclusively owned by one worker.
pub trait UtteranceState: Send {
    /// Push a wave part into the feature pipeline.
    fn accept_waveform(&mut self, sample_rate: f32, samples: &[f32]) -> Result<(), EngineError>;

    /// Recompute silence-weighting traceback and update the i-vector
    /// feature's per-frame weights. No-op when i-vectors or silence
    /// weighting are not in use for this model.
    fn reweight_silence(&mut self) -> Result<(), EngineError>;

    /// Advance decoding over the frames that are ready.
    fn advance_decoding(&mut self) -> Result<(), EngineError>;

    /// Signal end-of-input to the feature pipeline.
    fn input_finished(&mut self) -> Result<(), EngineError>;

    /// Finalize decoding; no further audio may be fed afterwards.
    fn finalize_decoding(&mut self) -> Result<(), EngineError>;

    /// Frames decoded so far.
    fn frames_decoded(&self) -> u32;

    /// Extract the compact lattice over everything decoded so far.
    fn lattice(&mut self, use_final_probs: bool) -> Result<LatticeHandle, EngineError>;
}
