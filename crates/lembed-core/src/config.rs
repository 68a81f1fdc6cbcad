use std::fmt;

use serde::Deserialize;

use crate::error::{EmbedError, EmbedResult};
use crate::strategy::Strategy;

/// Default context window, matching common embedding model setups.
pub const DEFAULT_CONTEXT_SIZE: usize = 512;

/// Engine and long-text settings, fixed for the lifetime of a model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Maximum tokens per decode call.
    pub context_size: usize,
    /// Inference threads. 0 lets the runtime decide.
    pub threads: usize,
    pub pooling: PoolingMode,
    /// L2-normalize every returned vector.
    pub normalize: bool,
    /// Strategy for inputs longer than `context_size`.
    pub strategy: Strategy,
    /// Chunk tail threshold. Defaults to the chunk overlap.
    pub min_tail_tokens: Option<usize>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            context_size: DEFAULT_CONTEXT_SIZE,
            threads: 0,
            pooling: PoolingMode::Mean,
            normalize: false,
            strategy: Strategy::Auto,
            min_tail_tokens: None,
        }
    }
}

impl EmbeddingConfig {
    /// Reject settings that could only fail later, on the first long input.
    pub fn validate(&self) -> EmbedResult<()> {
        if self.context_size == 0 {
            return Err(EmbedError::Config("context_size must be at least 1".into()));
        }
        self.strategy.validate(self.context_size)
    }
}

/// How per-token hidden states collapse into one vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolingMode {
    #[default]
    Mean,
    Cls,
    Last,
}

impl fmt::Display for PoolingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mean => write!(f, "mean"),
            Self::Cls => write!(f, "cls"),
            Self::Last => write!(f, "last"),
        }
    }
}

impl std::str::FromStr for PoolingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "cls" => Ok(Self::Cls),
            "last" => Ok(Self::Last),
            _ => Err(format!("invalid pooling mode: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.context_size, 512);
        assert_eq!(config.pooling, PoolingMode::Mean);
        assert_eq!(config.strategy, Strategy::Auto);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_context_rejected() {
        let config = EmbeddingConfig {
            context_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EmbedError::Config(_))));
    }

    #[test]
    fn test_strategy_checked_against_context() {
        let config = EmbeddingConfig {
            context_size: 4,
            strategy: "chunk:3:3".parse().unwrap(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EmbedError::Config(_))));

        let config = EmbeddingConfig {
            strategy: Strategy::SlidingWindow { window_size: 0 },
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EmbeddingConfig {
            context_size: 4,
            strategy: "chunk:100:2".parse().unwrap(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config: EmbeddingConfig = toml::from_str(
            r#"
context_size = 1024
threads = 4
pooling = "cls"
strategy = "chunk:300:50"
min_tail_tokens = 0
"#,
        )
        .unwrap();
        assert_eq!(config.context_size, 1024);
        assert_eq!(config.threads, 4);
        assert_eq!(config.pooling, PoolingMode::Cls);
        assert_eq!(
            config.strategy,
            Strategy::Chunk {
                max_chunk_size: 300,
                overlap: 50
            }
        );
        assert_eq!(config.min_tail_tokens, Some(0));
        assert!(!config.normalize);
    }

    #[test]
    fn test_parse_toml_bad_strategy() {
        let result: Result<EmbeddingConfig, _> = toml::from_str(r#"strategy = "summarize""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_pooling_from_str() {
        assert_eq!("MEAN".parse::<PoolingMode>().unwrap(), PoolingMode::Mean);
        assert!("max".parse::<PoolingMode>().is_err());
    }
}
