//! Model bundle: the immutable artifact set shared by a pool's workers

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lattice_serve_config::ModelSpec;
use lattice_serve_core::engine::{
    DecodableOpts, DecoderOpts, Engine, EngineModelConfig, ModelArtifacts, RnnlmOpts, RnnlmPaths,
};
use lattice_serve_core::{ModelId, ServeError};

/// Resolved layout of a model directory.
///
/// ```text
/// <path>/HCLG.fst                    (required)
/// <path>/final.mdl                   (required)
/// <path>/words.txt                   (required)
/// <path>/conf/mfcc.conf              (required)
/// <path>/conf/ivector_extractor.conf (optional; absent disables i-vectors)
/// <path>/word_boundary.int           (optional; enables word timings)
/// <path>/rnnlm/{final.raw, word_embedding.mat, G.fst}
///                                    (optional; all three enable rescoring)
/// ```
#[derive(Debug, Clone)]
pub struct ModelLayout {
    pub graph: PathBuf,
    pub acoustic_model: PathBuf,
    pub words: PathBuf,
    pub mfcc_conf: PathBuf,
    pub ivector_conf: Option<PathBuf>,
    pub word_boundary: Option<PathBuf>,
    pub rnnlm: Option<RnnlmPaths>,
}

impl ModelLayout {
    /// Check the directory layout; required artifacts missing is an error,
    /// optional artifacts missing disables the corresponding feature.
    pub fn resolve(model_dir: &Path) -> Result<Self, String> {
        let graph = required(model_dir.join("HCLG.fst"))?;
        let acoustic_model = required(model_dir.join("final.mdl"))?;
        let words = required(model_dir.join("words.txt"))?;

        let conf_dir = model_dir.join("conf");
        let mfcc_conf = required(conf_dir.join("mfcc.conf"))?;

        let ivector_conf = conf_dir.join("ivector_extractor.conf");
        let ivector_conf = if ivector_conf.is_file() {
            Some(ivector_conf)
        } else {
            tracing::warn!(
                path = %ivector_conf.display(),
                "i-vector extractor config not found, disabling i-vector extraction"
            );
            None
        };

        let word_boundary = model_dir.join("word_boundary.int");
        let word_boundary = if word_boundary.is_file() {
            Some(word_boundary)
        } else {
            tracing::warn!(
                path = %word_boundary.display(),
                "word boundary file not found, disabling word level features"
            );
            None
        };

        let rnnlm_dir = model_dir.join("rnnlm");
        let rnnlm = RnnlmPaths {
            nnet: rnnlm_dir.join("final.raw"),
            word_embedding: rnnlm_dir.join("word_embedding.mat"),
            backoff_lm: rnnlm_dir.join("G.fst"),
        };
        let rnnlm = if rnnlm.nnet.is_file()
            && rnnlm.word_embedding.is_file()
            && rnnlm.backoff_lm.is_file()
        {
            Some(rnnlm)
        } else {
            tracing::warn!(
                path = %rnnlm_dir.display(),
                "rnnlm artefacts not found, disabling rnnlm rescoring"
            );
            None
        };

        Ok(Self {
            graph,
            acoustic_model,
            words,
            mfcc_conf,
            ivector_conf,
            word_boundary,
            rnnlm,
        })
    }
}

fn required(path: PathBuf) -> Result<PathBuf, String> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(format!("missing required artifact {}", path.display()))
    }
}

fn load_err(id: &ModelId, reason: String) -> ServeError {
    ServeError::ModelLoad {
        model: id.to_string(),
        reason,
    }
}

/// Immutable, shareable container of one model's loaded artifacts.
///
/// Constructed once per pool at startup, shared by reference across all
/// of the pool's workers, destroyed only at process shutdown.
pub struct ModelBundle {
    id: ModelId,
    spec: ModelSpec,
    artifacts: Arc<dyn ModelArtifacts>,
    use_ivectors: bool,
    has_word_boundary: bool,
    has_rnnlm: bool,
}

impl ModelBundle {
    /// Load the bundle described by `spec` through the engine.
    pub fn load(engine: &dyn Engine, spec: &ModelSpec) -> Result<Self, ServeError> {
        let id = spec.model_id();

        let layout = ModelLayout::resolve(&spec.path).map_err(|reason| load_err(&id, reason))?;
        let (bos_index, eos_index) = spec
            .symbol_indices()
            .map_err(|e| load_err(&id, e.to_string()))?;

        let use_ivectors = layout.ivector_conf.is_some();
        let has_word_boundary = layout.word_boundary.is_some();
        let has_rnnlm = layout.rnnlm.is_some();

        let config = EngineModelConfig {
            model_dir: spec.path.clone(),
            graph: layout.graph,
            acoustic_model: layout.acoustic_model,
            words: layout.words,
            mfcc_conf: layout.mfcc_conf,
            ivector_conf: layout.ivector_conf,
            word_boundary: layout.word_boundary,
            rnnlm: layout.rnnlm,
            decoder: DecoderOpts {
                beam: spec.beam,
                min_active: spec.min_active,
                max_active: spec.max_active,
                lattice_beam: spec.lattice_beam,
            },
            decodable: DecodableOpts {
                acoustic_scale: spec.acoustic_scale,
                frame_subsampling_factor: spec.frame_subsampling_factor,
            },
            silence_weight: spec.silence_weight,
            rnnlm_opts: RnnlmOpts {
                weight: spec.rnnlm_weight,
                max_ngram_order: spec.max_ngram_order,
                bos_index,
                eos_index,
            },
        };

        let artifacts = engine
            .load(&config)
            .map_err(|e| load_err(&id, e.to_string()))?;

        tracing::info!(
            model = %id,
            path = %spec.path.display(),
            use_ivectors,
            has_word_boundary,
            has_rnnlm,
            "model bundle loaded"
        );

        Ok(Self {
            id,
            spec: spec.clone(),
            artifacts,
            use_ivectors,
            has_word_boundary,
            has_rnnlm,
        })
    }

    pub fn id(&self) -> &ModelId {
        &self.id
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    /// Engine-side read-only artifact set.
    pub fn artifacts(&self) -> &dyn ModelArtifacts {
        self.artifacts.as_ref()
    }

    pub fn use_ivectors(&self) -> bool {
        self.use_ivectors
    }

    pub fn has_word_boundary(&self) -> bool {
        self.has_word_boundary
    }

    pub fn has_rnnlm(&self) -> bool {
        self.has_rnnlm
    }

    pub fn acoustic_scale(&self) -> f32 {
        self.spec.acoustic_scale
    }

    pub fn frame_subsampling_factor(&self) -> u32 {
        self.spec.frame_subsampling_factor
    }
}

impl std::fmt::Debug for ModelBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBundle")
            .field("id", &self.id)
            .field("use_ivectors", &self.use_ivectors)
            .field("has_word_boundary", &self.has_word_boundary)
            .field("has_rnnlm", &self.has_rnnlm)
            .finish_non_exhaustive()
    }
}
