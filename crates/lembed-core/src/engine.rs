use crate::error::EmbedResult;

/// Opaque token identifier produced by an engine's tokenizer.
pub type Token = u32;

/// A loaded embedding model that can tokenize text and run one forward pass.
///
/// Implementations own their model and session resources; dropping the
/// engine releases them. `decode` must never be handed more tokens than the
/// configured context size, and must fail rather than return a vector whose
/// length differs from `embedding_dimension`.
pub trait InferenceEngine: Send + Sync {
    fn tokenize(&self, text: &str) -> EmbedResult<Vec<Token>>;
    fn decode(&self, tokens: &[Token]) -> EmbedResult<Vec<f32>>;
    fn embedding_dimension(&self) -> usize;
}
