use crate::error::EmbedResult;

pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> EmbedResult<Vec<f32>>;
    fn embed_batch(&self, texts: &[&str]) -> EmbedResult<Vec<Vec<f32>>>;
    fn dimensions(&self) -> usize;
}
