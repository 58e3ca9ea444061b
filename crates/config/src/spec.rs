//! Model specification table
//!
//! Models to serve are listed in a TOML file as a `[[model]]` array. Each
//! entry is a non-owning description of a model directory plus its decoding
//! parameters; defaults match the engine's conventional values.
//!
//! ```toml
//! [[model]]
//! name = "general"
//! language_code = "en"
//! path = "/models/general-en"
//! n_decoders = 4
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use lattice_serve_core::ModelId;

use crate::ConfigError;

/// Specification of one model to load, keyed by `(name, language_code)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub language_code: String,
    /// Model root directory.
    pub path: PathBuf,
    /// Decoder pool capacity for this model.
    #[serde(default = "defaults::n_decoders")]
    pub n_decoders: usize,

    // decoding parameters
    #[serde(default = "defaults::beam")]
    pub beam: f32,
    #[serde(default = "defaults::min_active")]
    pub min_active: usize,
    #[serde(default = "defaults::max_active")]
    pub max_active: usize,
    #[serde(default = "defaults::lattice_beam")]
    pub lattice_beam: f32,
    #[serde(default = "defaults::acoustic_scale")]
    pub acoustic_scale: f32,
    #[serde(default = "defaults::frame_subsampling_factor")]
    pub frame_subsampling_factor: u32,
    #[serde(default = "defaults::silence_weight")]
    pub silence_weight: f32,

    // rnnlm rescoring parameters
    #[serde(default = "defaults::max_ngram_order")]
    pub max_ngram_order: u32,
    #[serde(default = "defaults::rnnlm_weight")]
    pub rnnlm_weight: f32,
    /// Begin-of-sentence symbol index, kept as a string in the file format.
    #[serde(default = "defaults::bos_index")]
    pub bos_index: String,
    /// End-of-sentence symbol index, kept as a string in the file format.
    #[serde(default = "defaults::eos_index")]
    pub eos_index: String,
}

mod defaults {
    pub fn n_decoders() -> usize {
        1
    }
    pub fn beam() -> f32 {
        16.0
    }
    pub fn min_active() -> usize {
        200
    }
    pub fn max_active() -> usize {
        7000
    }
    pub fn lattice_beam() -> f32 {
        6.0
    }
    pub fn acoustic_scale() -> f32 {
        1.0
    }
    pub fn frame_subsampling_factor() -> u32 {
        3
    }
    pub fn silence_weight() -> f32 {
        1.0
    }
    pub fn max_ngram_order() -> u32 {
        3
    }
    pub fn rnnlm_weight() -> f32 {
        0.5
    }
    pub fn bos_index() -> String {
        "1".to_string()
    }
    pub fn eos_index() -> String {
        "2".to_string()
    }
}

impl ModelSpec {
    pub fn model_id(&self) -> ModelId {
        ModelId::new(&self.name, &self.language_code)
    }

    /// Parse the bos/eos symbol indices. The file format keeps them as
    /// strings; non-numeric values are rejected here, at load time.
    pub fn symbol_indices(&self) -> Result<(u32, u32), ConfigError> {
        let bos = self
            .bos_index
            .trim()
            .parse::<u32>()
            .map_err(|_| ConfigError::SymbolIndex {
                field: "bos",
                value: self.bos_index.clone(),
            })?;
        let eos = self
            .eos_index
            .trim()
            .parse::<u32>()
            .map_err(|_| ConfigError::SymbolIndex {
                field: "eos",
                value: self.eos_index.clone(),
            })?;
        Ok((bos, eos))
    }
}

#[derive(Debug, Deserialize)]
struct ModelSpecFile {
    #[serde(default, rename = "model")]
    models: Vec<ModelSpec>,
}

/// Read the model spec table from a TOML file.
///
/// An empty list is not an error here; the binary decides whether serving
/// zero models is acceptable.
pub fn parse_model_specs(path: impl AsRef<Path>) -> Result<Vec<ModelSpec>, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let file: ModelSpecFile = toml::from_str(&raw)?;
    Ok(file.models)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_spec_list_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [[model]]
            name = "general"
            language_code = "en"
            path = "/models/general-en"

            [[model]]
            name = "general"
            language_code = "hi"
            path = "/models/general-hi"
            n_decoders = 4
            beam = 13.0
            "#
        )
        .unwrap();

        let specs = parse_model_specs(file.path()).unwrap();
        assert_eq!(specs.len(), 2);

        assert_eq!(specs[0].n_decoders, 1);
        assert_eq!(specs[0].beam, 16.0);
        assert_eq!(specs[0].min_active, 200);
        assert_eq!(specs[0].max_active, 7000);
        assert_eq!(specs[0].lattice_beam, 6.0);
        assert_eq!(specs[0].acoustic_scale, 1.0);
        assert_eq!(specs[0].frame_subsampling_factor, 3);
        assert_eq!(specs[0].max_ngram_order, 3);
        assert_eq!(specs[0].rnnlm_weight, 0.5);

        assert_eq!(specs[1].n_decoders, 4);
        assert_eq!(specs[1].beam, 13.0);
        assert_eq!(specs[1].model_id(), ModelId::new("general", "hi"));
    }

    #[test]
    fn empty_file_parses_to_no_models() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let specs = parse_model_specs(file.path()).unwrap();
        assert!(specs.is_empty());
    }

    #[test]
    fn symbol_indices_parse_or_reject() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [[model]]
            name = "m"
            language_code = "en"
            path = "/m"
            bos_index = "5"
            eos_index = "six"
            "#
        )
        .unwrap();

        let specs = parse_model_specs(file.path()).unwrap();
        let err = specs[0].symbol_indices().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::SymbolIndex { field: "eos", .. }
        ));
    }
}
