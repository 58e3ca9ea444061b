//! Deterministic in-memory engine
//!
//! Stands in for the real ASR engine in tests and in builds where the
//! engine library is not linked. Everything it produces is a pure function
//! of the total samples fed, so feeding one chunk or the same audio split
//! into K chunks yields bit-identical results.

use std::sync::Arc;

use lattice_serve_core::engine::{
    Engine, EngineModelConfig, LatticeHandle, MbrWord, ModelArtifacts, NbestPath, UtteranceState,
    WordAlignment,
};
use lattice_serve_core::EngineError;

/// One frame per 10 ms of audio.
const FRAMES_PER_SECOND: u64 = 100;

/// Compositions with fewer frames than this come out empty, exercising the
/// keep-original fallback.
const MIN_COMPOSE_FRAMES: u32 = 5;

/// Fixed symbol table; id 0 is epsilon and never appears in output.
const LEXICON: [&str; 8] = [
    "<eps>", "alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf",
];

/// Deterministic engine with optional failure injection.
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    /// Raise a fatal (input-caused) engine error on decoder advance.
    pub fatal_on_advance: bool,
    /// Raise a generic engine error on lattice extraction.
    pub internal_on_lattice: bool,
    /// Flag word alignments as incomplete (partial-lattice path).
    pub partial_alignment: bool,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Engine for MockEngine {
    fn load(&self, config: &EngineModelConfig) -> Result<Arc<dyn ModelArtifacts>, EngineError> {
        Ok(Arc::new(MockArtifacts {
            config: config.clone(),
            behavior: self.clone(),
        }))
    }
}

struct MockArtifacts {
    config: EngineModelConfig,
    behavior: MockEngine,
}

#[derive(Debug, Clone)]
struct MockLattice {
    frames: u32,
    rescored: bool,
    aligned: bool,
}

fn lat(handle: &LatticeHandle) -> &MockLattice {
    handle
        .downcast_ref()
        .expect("lattice handle from a different engine")
}

/// Word count of every path through a lattice with this many frames.
fn path_words(frames: u32) -> usize {
    ((frames / 25) as usize).clamp(1, 6)
}

fn path_word_ids(frames: u32, rank: u32) -> Vec<u32> {
    (0..path_words(frames) as u32)
        .map(|j| (frames + rank + j) % 7 + 1)
        .collect()
}

impl ModelArtifacts for MockArtifacts {
    fn start_utterance(&self) -> Result<Box<dyn UtteranceState>, EngineError> {
        Ok(Box::new(MockUtterance {
            samples: 0,
            sample_rate: 0,
            input_done: false,
            behavior: self.behavior.clone(),
        }))
    }

    fn word(&self, id: u32) -> Option<String> {
        LEXICON.get(id as usize).map(|w| (*w).to_string())
    }

    fn scale_acoustic(&self, lattice: &LatticeHandle, _scale: f64) -> LatticeHandle {
        LatticeHandle::new(lat(lattice).clone())
    }

    fn scale_lattice(
        &self,
        lattice: &LatticeHandle,
        _lm_scale: f64,
        _acoustic_scale: f64,
    ) -> LatticeHandle {
        LatticeHandle::new(lat(lattice).clone())
    }

    fn top_sort_if_needed(&self, lattice: &LatticeHandle) -> LatticeHandle {
        LatticeHandle::new(lat(lattice).clone())
    }

    fn compose_rnnlm_pruned(
        &self,
        lattice: &LatticeHandle,
    ) -> Result<Option<LatticeHandle>, EngineError> {
        if self.config.rnnlm.is_none() {
            return Err(EngineError::Internal(
                "model has no rnnlm artifacts".into(),
            ));
        }
        let inner = lat(lattice);
        if inner.frames < MIN_COMPOSE_FRAMES {
            return Ok(None);
        }
        Ok(Some(LatticeHandle::new(MockLattice {
            rescored: true,
            ..inner.clone()
        })))
    }

    fn nbest(&self, lattice: &LatticeHandle, n: usize) -> Vec<NbestPath> {
        let inner = lat(lattice);
        if inner.frames == 0 {
            return Vec::new();
        }

        let frames = inner.frames;
        let base_lm = (frames % 17) as f32 + 8.0 - if inner.rescored { 1.0 } else { 0.0 };

        // the lattice holds four distinct paths, cheapest first
        (0..n.min(4) as u32)
            .map(|rank| NbestPath {
                word_ids: path_word_ids(frames, rank),
                lm_score: base_lm + 2.0 * rank as f32,
                am_score: -(frames as f32) * 0.35 - 1.5 * rank as f32,
            })
            .collect()
    }

    fn word_align(&self, lattice: &LatticeHandle) -> WordAlignment {
        let inner = lat(lattice);
        if self.config.word_boundary.is_none() || inner.frames == 0 {
            return WordAlignment::Empty;
        }
        let aligned = LatticeHandle::new(MockLattice {
            aligned: true,
            ..inner.clone()
        });
        if self.behavior.partial_alignment {
            WordAlignment::Partial(aligned)
        } else {
            WordAlignment::Aligned(aligned)
        }
    }

    fn mbr_one_best(&self, lattice: &LatticeHandle) -> Vec<MbrWord> {
        let inner = lat(lattice);
        debug_assert!(inner.aligned, "mbr on an unaligned lattice");
        if inner.frames == 0 {
            return Vec::new();
        }

        let frames = inner.frames;
        let n_words = path_words(frames);
        let span = frames as f32 / n_words as f32;

        path_word_ids(frames, 0)
            .into_iter()
            .enumerate()
            .map(|(j, word_id)| MbrWord {
                word_id,
                begin_frame: j as f32 * span,
                end_frame: (j + 1) as f32 * span,
                confidence: (0.95 - 0.07 * j as f32).max(0.2),
            })
            .collect()
    }
}

struct MockUtterance {
    samples: u64,
    sample_rate: u32,
    input_done: bool,
    behavior: MockEngine,
}

impl UtteranceState for MockUtterance {
    fn accept_waveform(&mut self, sample_rate: f32, samples: &[f32]) -> Result<(), EngineError> {
        if self.input_done {
            return Err(EngineError::Internal(
                "waveform accepted after input finished".into(),
            ));
        }
        self.sample_rate = sample_rate as u32;
        self.samples += samples.len() as u64;
        Ok(())
    }

    fn reweight_silence(&mut self) -> Result<(), EngineError> {
        // the deterministic engine has no i-vector feature to reweight
        Ok(())
    }

    fn advance_decoding(&mut self) -> Result<(), EngineError> {
        if self.behavior.fatal_on_advance {
            return Err(EngineError::Fatal(
                "wave data malformed or model mismatch".into(),
            ));
        }
        Ok(())
    }

    fn input_finished(&mut self) -> Result<(), EngineError> {
        self.input_done = true;
        Ok(())
    }

    fn finalize_decoding(&mut self) -> Result<(), EngineError> {
        debug_assert!(self.input_done, "finalize before input finished");
        Ok(())
    }

    fn frames_decoded(&self) -> u32 {
        if self.sample_rate == 0 {
            return 0;
        }
        // frame count depends only on the totals, never on chunking
        (self.samples * FRAMES_PER_SECOND / u64::from(self.sample_rate)) as u32
    }

    fn lattice(&mut self, _use_final_probs: bool) -> Result<LatticeHandle, EngineError> {
        if self.behavior.internal_on_lattice {
            return Err(EngineError::Internal(
                "unexpected error during lattice extraction".into(),
            ));
        }
        Ok(LatticeHandle::new(MockLattice {
            frames: self.frames_decoded(),
            rescored: false,
            aligned: false,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utterance() -> Box<dyn UtteranceState> {
        let engine = MockEngine::new();
        let artifacts = engine
            .load(&minimal_config())
            .expect("mock load never fails");
        artifacts.start_utterance().unwrap()
    }

    fn minimal_config() -> EngineModelConfig {
        use lattice_serve_core::engine::{DecodableOpts, DecoderOpts, RnnlmOpts};
        EngineModelConfig {
            model_dir: ".".into(),
            graph: "HCLG.fst".into(),
            acoustic_model: "final.mdl".into(),
            words: "words.txt".into(),
            mfcc_conf: "mfcc.conf".into(),
            ivector_conf: None,
            word_boundary: None,
            rnnlm: None,
            decoder: DecoderOpts {
                beam: 16.0,
                min_active: 200,
                max_active: 7000,
                lattice_beam: 6.0,
            },
            decodable: DecodableOpts {
                acoustic_scale: 1.0,
                frame_subsampling_factor: 3,
            },
            silence_weight: 1.0,
            rnnlm_opts: RnnlmOpts {
                weight: 0.5,
                max_ngram_order: 3,
                bos_index: 1,
                eos_index: 2,
            },
        }
    }

    #[test]
    fn frames_depend_on_totals_not_chunking() {
        let samples = vec![0.0f32; 4503];

        let mut whole = utterance();
        whole.accept_waveform(16000.0, &samples).unwrap();

        let mut split = utterance();
        for part in samples.chunks(150) {
            split.accept_waveform(16000.0, part).unwrap();
        }

        assert_eq!(whole.frames_decoded(), split.frames_decoded());
        assert_eq!(whole.frames_decoded(), 28);
    }

    #[test]
    fn zero_audio_decodes_zero_frames() {
        let state = utterance();
        assert_eq!(state.frames_decoded(), 0);
    }

    #[test]
    fn feeding_after_input_finished_fails() {
        let mut state = utterance();
        state.input_finished().unwrap();
        assert!(state.accept_waveform(16000.0, &[0.0]).is_err());
    }
}
