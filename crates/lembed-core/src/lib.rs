pub mod config;
pub mod embedder;
pub mod engine;
pub mod error;
pub mod long_text;
pub mod model;
#[cfg(feature = "onnx")]
pub mod onnx_engine;
pub mod strategy;
pub mod vector;

pub use config::{EmbeddingConfig, PoolingMode, DEFAULT_CONTEXT_SIZE};
pub use embedder::Embedder;
pub use engine::{InferenceEngine, Token};
pub use error::{EmbedError, EmbedResult};
pub use long_text::LongTextEmbedder;
pub use model::EmbeddingModel;
#[cfg(feature = "onnx")]
pub use onnx_engine::OnnxEngine;
pub use strategy::{resolve, resolve_auto, ChunkPlan, Plan, Strategy, StructuralSignal};
pub use vector::{cosine_similarity, l2_norm, mean_pool, normalize};
