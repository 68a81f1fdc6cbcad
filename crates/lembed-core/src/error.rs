use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("invalid model path: {0}")]
    InvalidModelPath(String),

    #[error("failed to load model: {0}")]
    ModelLoad(String),

    #[error("failed to create inference context: {0}")]
    ContextCreation(String),

    #[error("failed to tokenize input text: {0}")]
    TokenizationFailed(String),

    #[error("failed to encode tokens to embeddings: {0}")]
    EncodingFailed(String),

    #[error("config error: {0}")]
    Config(String),
}

impl EmbedError {
    /// Re-tag any decode-side failure as `EncodingFailed`.
    pub(crate) fn into_encoding(self) -> Self {
        match self {
            Self::EncodingFailed(_) => self,
            other => Self::EncodingFailed(other.to_string()),
        }
    }
}

pub type EmbedResult<T> = Result<T, EmbedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_encoding_keeps_encoding_failed() {
        let err = EmbedError::EncodingFailed("boom".into()).into_encoding();
        assert_eq!(err.to_string(), "failed to encode tokens to embeddings: boom");
    }

    #[test]
    fn test_into_encoding_wraps_other_variants() {
        let err = EmbedError::ContextCreation("no device".into()).into_encoding();
        assert!(matches!(err, EmbedError::EncodingFailed(ref m) if m.contains("no device")));
    }
}
