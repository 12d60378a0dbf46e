mod types;

pub use types::*;

use anyhow::{Context, Result};
use flavmux_media::{ComposeOptions, DecodeMode, MediaKind};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = ["./flavmux.toml", "~/.config/flavmux/config.toml"];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.compose.priority.is_empty() {
        anyhow::bail!("compose.priority must name at least one track kind");
    }

    let kinds = parse_priority(&config.compose.priority)?;
    for (i, kind) in kinds.iter().enumerate() {
        if kinds[..i].contains(kind) {
            anyhow::bail!("compose.priority lists {} more than once", kind);
        }
    }

    if config.ingest.chunk_samples == 0 {
        anyhow::bail!("ingest.chunk_samples must be at least 1");
    }

    if config.ingest.handler_name.contains('\0') {
        anyhow::bail!("ingest.handler_name cannot contain NUL");
    }

    Ok(())
}

fn parse_priority(names: &[String]) -> Result<Vec<MediaKind>> {
    names
        .iter()
        .map(|name| {
            name.parse::<MediaKind>()
                .with_context(|| format!("Unknown track kind in compose.priority: {:?}", name))
        })
        .collect()
}

impl Config {
    /// Composer settings described by this config.
    pub fn to_compose_options(&self) -> Result<ComposeOptions> {
        Ok(ComposeOptions {
            priority: parse_priority(&self.compose.priority)?,
            mode: if self.compose.streaming {
                DecodeMode::Streaming
            } else {
                DecodeMode::Eager
            },
            chunk_samples: self.ingest.chunk_samples,
            handler_name: self.ingest.handler_name.clone(),
        })
    }
}
