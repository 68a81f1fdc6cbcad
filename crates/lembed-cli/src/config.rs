//! Configuration loading from TOML files.
//!
//! Lookup order:
//! 1. `$LEMBED_CONFIG` environment variable
//! 2. `~/.config/lembed/config.toml`
//! 3. Built-in defaults (everything is optional)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lembed_core::EmbeddingConfig;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub embedding: EmbeddingConfig,
    pub output: OutputConfig,
}

/// Where the model comes from.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Local directory holding `model.onnx` and `tokenizer.json`.
    pub path: Option<String>,
    /// Hugging Face repo id, used when `path` is unset.
    pub hub_repo: Option<String>,
}

/// Terminal output settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Leading values shown when printing an embedding.
    pub preview: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { preview: 5 }
    }
}

/// Load config from disk. Returns defaults if no config file exists.
pub fn load_config() -> Result<Config> {
    match config_path() {
        Some(p) if p.exists() => load_config_from(&p),
        _ => Ok(Config::default()),
    }
}

/// Parse a specific config file.
pub fn load_config_from(path: &Path) -> Result<Config> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

/// Resolve the config file path.
fn config_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("LEMBED_CONFIG") {
        return Some(PathBuf::from(p));
    }

    dirs_home().map(|home| home.join(".config").join("lembed").join("config.toml"))
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

/// Show the active config path (for `lembed config`).
pub fn show_config_path() -> String {
    match config_path() {
        Some(p) if p.exists() => format!("{} (loaded)", p.display()),
        Some(p) => format!("{} (not found, using defaults)", p.display()),
        None => "no config path resolved (using defaults)".into(),
    }
}
