use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::embedder::Embedder;
use crate::engine::{InferenceEngine, Token};
use crate::error::{EmbedError, EmbedResult};
use crate::long_text::LongTextEmbedder;
use crate::strategy::{Plan, Strategy, StructuralSignal};
use crate::vector;

/// An inference engine paired with the settings used to embed text with it.
pub struct EmbeddingModel<E> {
    engine: E,
    config: EmbeddingConfig,
    long_text: LongTextEmbedder,
}

impl<E: InferenceEngine> EmbeddingModel<E> {
    pub fn new(engine: E, config: EmbeddingConfig) -> EmbedResult<Self> {
        config.validate()?;
        let long_text = LongTextEmbedder::new(config.context_size, engine.embedding_dimension())?
            .with_min_tail_tokens(config.min_tail_tokens);
        Ok(Self {
            engine,
            config,
            long_text,
        })
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn embedding_dimension(&self) -> usize {
        self.engine.embedding_dimension()
    }

    /// Embed `text` with the configured strategy.
    pub fn embed(&self, text: &str) -> EmbedResult<Vec<f32>> {
        self.embed_with(text, self.config.strategy)
    }

    /// Embed `text`, overriding the configured long-text strategy.
    pub fn embed_with(&self, text: &str, strategy: Strategy) -> EmbedResult<Vec<f32>> {
        let tokens = self.tokenize_checked(text)?;
        debug!(tokens = tokens.len(), chars = text.len(), "tokenized input");

        let signal = StructuralSignal::from_text(text);
        let embedding = self
            .long_text
            .embed(&tokens, strategy, signal, |chunk| self.engine.decode(chunk))?;

        Ok(if self.config.normalize {
            vector::normalize(&embedding)
        } else {
            embedding
        })
    }

    /// The plan `embed_with` would use for `text`, or `None` if it fits the
    /// context window and needs no splitting.
    pub fn plan(&self, text: &str, strategy: Strategy) -> EmbedResult<Option<Plan>> {
        let tokens = self.tokenize_checked(text)?;
        if tokens.len() <= self.config.context_size {
            return Ok(None);
        }
        self.long_text
            .plan(strategy, tokens.len(), StructuralSignal::from_text(text))
            .map(Some)
    }

    fn tokenize_checked(&self, text: &str) -> EmbedResult<Vec<Token>> {
        if text.trim().is_empty() {
            return Err(EmbedError::TokenizationFailed("input text is empty".into()));
        }
        let tokens = self.engine.tokenize(text)?;
        if tokens.is_empty() {
            return Err(EmbedError::TokenizationFailed("tokenizer produced no tokens".into()));
        }
        Ok(tokens)
    }
}

impl<E: InferenceEngine> Embedder for EmbeddingModel<E> {
    fn embed(&self, text: &str) -> EmbedResult<Vec<f32>> {
        EmbeddingModel::embed(self, text)
    }

    fn embed_batch(&self, texts: &[&str]) -> EmbedResult<Vec<Vec<f32>>> {
        texts.iter().map(|t| EmbeddingModel::embed(self, t)).collect()
    }

    fn dimensions(&self) -> usize {
        self.embedding_dimension()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Whitespace tokenizer; each word maps to its length. Decode returns
    /// `[token count, sum of tokens, 1]`.
    #[derive(Default)]
    struct WordEngine {
        decodes: Mutex<Vec<usize>>,
        fail_decode: bool,
    }

    impl InferenceEngine for WordEngine {
        fn tokenize(&self, text: &str) -> EmbedResult<Vec<Token>> {
            Ok(text.split_whitespace().map(|w| w.len() as Token).collect())
        }

        fn decode(&self, tokens: &[Token]) -> EmbedResult<Vec<f32>> {
            if self.fail_decode {
                return Err(EmbedError::EncodingFailed("decode error -1".into()));
            }
            self.decodes.lock().unwrap().push(tokens.len());
            let sum: Token = tokens.iter().sum();
            Ok(vec![tokens.len() as f32, sum as f32, 1.0])
        }

        fn embedding_dimension(&self) -> usize {
            3
        }
    }

    fn model(context_size: usize) -> EmbeddingModel<WordEngine> {
        let config = EmbeddingConfig {
            context_size,
            ..Default::default()
        };
        EmbeddingModel::new(WordEngine::default(), config).unwrap()
    }

    #[test]
    fn test_empty_and_whitespace_rejected() {
        let m = model(8);
        assert!(matches!(m.embed(""), Err(EmbedError::TokenizationFailed(_))));
        assert!(matches!(m.embed(" \n\t"), Err(EmbedError::TokenizationFailed(_))));
        assert!(m.engine().decodes.lock().unwrap().is_empty());
    }

    #[test]
    fn test_short_text_single_decode() {
        let m = model(8);
        let v = m.embed("the cat sat").unwrap();
        assert_eq!(v, vec![3.0, 9.0, 1.0]);
        assert_eq!(*m.engine().decodes.lock().unwrap(), vec![3]);
    }

    #[test]
    fn test_long_text_truncate_override() {
        let m = model(4);
        let v = m.embed_with("a b c d e f g h i j", Strategy::Truncate).unwrap();
        assert_eq!(v, vec![4.0, 4.0, 1.0]);
    }

    #[test]
    fn test_long_text_auto_splits() {
        let m = model(4);
        let v = m.embed("a b c d e f g h i j k l").unwrap();
        assert_eq!(v.len(), 3);
        assert!(m.engine().decodes.lock().unwrap().len() > 1);
        assert!(m.engine().decodes.lock().unwrap().iter().all(|&n| n <= 4));
    }

    #[test]
    fn test_normalize_option() {
        let config = EmbeddingConfig {
            normalize: true,
            ..Default::default()
        };
        let m = EmbeddingModel::new(WordEngine::default(), config).unwrap();
        let v = m.embed("hello world").unwrap();
        assert!((vector::l2_norm(&v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_failure_propagates() {
        let engine = WordEngine {
            fail_decode: true,
            ..Default::default()
        };
        let m = EmbeddingModel::new(engine, EmbeddingConfig::default()).unwrap();
        assert!(matches!(m.embed("hello"), Err(EmbedError::EncodingFailed(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EmbeddingConfig {
            context_size: 0,
            ..Default::default()
        };
        assert!(EmbeddingModel::new(WordEngine::default(), config).is_err());
    }

    #[test]
    fn test_plan_reports_split() {
        let m = model(4);
        assert_eq!(m.plan("a b", Strategy::Auto).unwrap(), None);
        let plan = m.plan("a b c d e f", Strategy::Auto).unwrap().unwrap();
        assert_eq!(plan, Plan::SlidingWindow { window_size: 3 });
    }

    #[test]
    fn test_plan_rejects_blank_text() {
        let m = model(4);
        assert!(matches!(
            m.plan("   ", Strategy::Auto),
            Err(EmbedError::TokenizationFailed(_))
        ));
    }

    #[test]
    fn test_bad_chunk_strategy_rejected_at_construction() {
        let config = EmbeddingConfig {
            context_size: 4,
            strategy: Strategy::Chunk {
                max_chunk_size: 3,
                overlap: 3,
            },
            ..Default::default()
        };
        let result = EmbeddingModel::new(WordEngine::default(), config);
        assert!(matches!(result, Err(EmbedError::Config(_))));
    }

    #[test]
    fn test_embedder_trait_batch() {
        let m = model(8);
        let emb: &dyn Embedder = &m;
        let out = emb.embed_batch(&["one", "two words"]).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(emb.dimensions(), 3);
        assert!(emb.embed_batch(&["ok", "  "]).is_err());
    }
}
