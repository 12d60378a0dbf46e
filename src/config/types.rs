use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub compose: ComposeConfig,

    #[serde(default)]
    pub ingest: IngestConfig,
}

/// How existing tracks are laid out in `mdat`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ComposeConfig {
    /// Criteria track preference, highest first (`vide`, `soun`, `tast`, `scnt`).
    #[serde(default = "default_priority")]
    pub priority: Vec<String>,

    /// Keep samples as references into the source `mdat` instead of copying them.
    #[serde(default)]
    pub streaming: bool,
}

fn default_priority() -> Vec<String> {
    ["vide", "soun", "tast", "scnt"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            priority: default_priority(),
            streaming: false,
        }
    }
}

/// Settings for tracks created by `add-track`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    #[serde(default = "default_chunk_samples")]
    pub chunk_samples: usize,

    #[serde(default = "default_handler_name")]
    pub handler_name: String,
}

fn default_chunk_samples() -> usize {
    50
}

fn default_handler_name() -> String {
    "TTTV3".to_string()
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_samples: default_chunk_samples(),
            handler_name: default_handler_name(),
        }
    }
}
