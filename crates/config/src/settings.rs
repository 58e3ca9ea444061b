//! Server process settings

use serde::{Deserialize, Serialize};

/// Settings of the server process, independent of the models it serves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Chunk length in seconds used when slicing unary audio internally.
    #[serde(default = "default_chunk_seconds")]
    pub chunk_seconds: f32,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5016
}

fn default_chunk_seconds() -> f32 {
    1.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            chunk_seconds: default_chunk_seconds(),
        }
    }
}

impl Settings {
    /// Defaults overridden by `LATTICE_SERVE_HOST` / `LATTICE_SERVE_PORT`.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(host) = std::env::var("LATTICE_SERVE_HOST") {
            settings.host = host;
        }
        if let Ok(port) = std::env::var("LATTICE_SERVE_PORT") {
            match port.parse() {
                Ok(port) => settings.port = port,
                Err(_) => tracing::warn!(value = %port, "ignoring unparsable LATTICE_SERVE_PORT"),
            }
        }
        settings
    }
}
