//! Configuration for the lattice-serve server
//!
//! Two concerns live here: the model specification table loaded at startup
//! (one [`ModelSpec`] per decoder pool) and the [`Settings`] of the server
//! process itself.

pub mod settings;
pub mod spec;

pub use settings::Settings;
pub use spec::{parse_model_specs, ModelSpec};

use thiserror::Error;

/// Configuration errors, all fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse model spec file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid {field} index {value:?}: expected a non-negative integer")]
    SymbolIndex { field: &'static str, value: String },
}
