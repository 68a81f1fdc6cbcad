//! Embedding of token sequences that may exceed the engine's context window.

use tracing::{debug, warn};

use crate::engine::Token;
use crate::error::{EmbedError, EmbedResult};
use crate::strategy::{self, Plan, Strategy, StructuralSignal};
use crate::vector::mean_pool;

/// Splits over-long inputs into decode calls and averages the results.
///
/// Holds only read-only settings; each `embed` call is independent.
#[derive(Debug, Clone)]
pub struct LongTextEmbedder {
    context_size: usize,
    dimension: usize,
    min_tail_tokens: Option<usize>,
}

impl LongTextEmbedder {
    pub fn new(context_size: usize, dimension: usize) -> EmbedResult<Self> {
        if context_size == 0 {
            return Err(EmbedError::Config("context size must be at least 1".into()));
        }
        Ok(Self {
            context_size,
            dimension,
            min_tail_tokens: None,
        })
    }

    /// Override the chunk tail threshold (defaults to the chunk overlap).
    pub fn with_min_tail_tokens(mut self, min_tail_tokens: Option<usize>) -> Self {
        self.min_tail_tokens = min_tail_tokens;
        self
    }

    pub fn context_size(&self) -> usize {
        self.context_size
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Plan used for an over-long input of `token_count` tokens.
    pub fn plan(
        &self,
        strategy: Strategy,
        token_count: usize,
        signal: StructuralSignal,
    ) -> EmbedResult<Plan> {
        strategy::resolve(
            strategy,
            token_count,
            self.context_size,
            signal,
            self.min_tail_tokens,
        )
    }

    /// Embed `tokens` into one vector of `dimension` values.
    ///
    /// Inputs that fit the context are decoded once and returned as-is.
    /// Longer inputs are split per the resolved plan; the first failing
    /// decode aborts the call as `EncodingFailed`.
    pub fn embed<F>(
        &self,
        tokens: &[Token],
        strategy: Strategy,
        signal: StructuralSignal,
        mut decode: F,
    ) -> EmbedResult<Vec<f32>>
    where
        F: FnMut(&[Token]) -> EmbedResult<Vec<f32>>,
    {
        if tokens.is_empty() {
            return Err(EmbedError::TokenizationFailed("no tokens to embed".into()));
        }

        if tokens.len() <= self.context_size {
            return self.decode_checked(tokens, &mut decode);
        }

        let plan = self.plan(strategy, tokens.len(), signal)?;
        let windows = plan.windows(tokens.len());
        warn!(
            tokens = tokens.len(),
            context_size = self.context_size,
            "input exceeds context size, using {plan}"
        );
        debug!(chunks = windows.len(), "long-text plan: {plan}");

        let mut vectors = Vec::with_capacity(windows.len());
        for range in windows {
            vectors.push(self.decode_checked(&tokens[range], &mut decode)?);
        }

        mean_pool(vectors).ok_or_else(|| EmbedError::EncodingFailed("no chunk embeddings".into()))
    }

    fn decode_checked<F>(&self, tokens: &[Token], decode: &mut F) -> EmbedResult<Vec<f32>>
    where
        F: FnMut(&[Token]) -> EmbedResult<Vec<f32>>,
    {
        let vector = decode(tokens).map_err(EmbedError::into_encoding)?;
        if vector.len() != self.dimension {
            return Err(EmbedError::EncodingFailed(format!(
                "decode returned {} values, expected {}",
                vector.len(),
                self.dimension
            )));
        }
        Ok(vector)
    }
}
