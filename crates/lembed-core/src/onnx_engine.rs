//! ONNX Runtime inference engine (feature-gated behind `onnx`).
//!
//! Loads `model.onnx` and `tokenizer.json` from a local directory or from
//! the Hugging Face hub, tokenizes with `tokenizers`, runs one forward pass
//! per decode via `ort`, and pools the hidden states per [`PoolingMode`].

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::config::{EmbeddingConfig, PoolingMode};
use crate::engine::{InferenceEngine, Token};
use crate::error::{EmbedError, EmbedResult};

const MODEL_FILES: &[&str] = &["model.onnx", "onnx/model.onnx"];
const TOKENIZER_FILE: &str = "tokenizer.json";

pub struct OnnxEngine {
    // `Session::run` needs `&mut`; decodes are serialized through the lock.
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    pooling: PoolingMode,
    token_type_ids: bool,
    dimension: usize,
}

impl OnnxEngine {
    /// Load a model directory containing an ONNX graph and `tokenizer.json`.
    pub fn load(model_dir: impl AsRef<Path>, config: &EmbeddingConfig) -> EmbedResult<Self> {
        let dir = model_dir.as_ref();
        if !dir.is_dir() {
            return Err(EmbedError::InvalidModelPath(dir.display().to_string()));
        }
        let model_path = MODEL_FILES
            .iter()
            .map(|f| dir.join(f))
            .find(|p| p.is_file())
            .ok_or_else(|| {
                EmbedError::InvalidModelPath(format!("{}: no model.onnx", dir.display()))
            })?;
        let tokenizer_path = dir.join(TOKENIZER_FILE);
        if !tokenizer_path.is_file() {
            return Err(EmbedError::InvalidModelPath(format!(
                "{}: no {TOKENIZER_FILE}",
                dir.display()
            )));
        }
        Self::from_files(&model_path, &tokenizer_path, config)
    }

    /// Fetch `onnx/model.onnx` and `tokenizer.json` for `repo_id` into the
    /// local cache, then load them.
    pub fn from_hub(repo_id: &str, config: &EmbeddingConfig) -> EmbedResult<Self> {
        let cache_dir = hub_cache_dir()?;
        debug!(repo = repo_id, cache = %cache_dir.display(), "fetching model via hf-hub");

        let api = hf_hub::api::sync::ApiBuilder::new()
            .with_cache_dir(cache_dir)
            .build()
            .map_err(|e| EmbedError::ModelLoad(format!("hf-hub api: {e}")))?;
        let repo = api.model(repo_id.to_string());
        let model_path = repo
            .get("onnx/model.onnx")
            .map_err(|e| EmbedError::ModelLoad(format!("model download: {e}")))?;
        let tokenizer_path = repo
            .get(TOKENIZER_FILE)
            .map_err(|e| EmbedError::ModelLoad(format!("tokenizer download: {e}")))?;

        Self::from_files(&model_path, &tokenizer_path, config)
    }

    fn from_files(
        model_path: &Path,
        tokenizer_path: &Path,
        config: &EmbeddingConfig,
    ) -> EmbedResult<Self> {
        config.validate()?;
        info!(model = %model_path.display(), "loading ONNX model");

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| EmbedError::ModelLoad(format!("tokenizer load: {e}")))?;
        // Long inputs are split by the caller, so the tokenizer must not cut them.
        tokenizer
            .with_truncation(None)
            .map_err(|e| EmbedError::ModelLoad(format!("tokenizer truncation: {e}")))?;
        tokenizer.with_padding(None);

        let mut builder = Session::builder()
            .map_err(|e| EmbedError::ContextCreation(format!("session builder: {e}")))?;
        if config.threads > 0 {
            builder = builder
                .with_intra_threads(config.threads)
                .map_err(|e| EmbedError::ContextCreation(format!("thread config: {e}")))?;
        }
        let session = builder
            .commit_from_file(model_path)
            .map_err(|e| EmbedError::ModelLoad(format!("{}: {e}", model_path.display())))?;

        let token_type_ids = session.inputs.iter().any(|i| i.name == "token_type_ids");

        let mut engine = Self {
            session: Mutex::new(session),
            tokenizer,
            pooling: config.pooling,
            token_type_ids,
            dimension: 0,
        };
        engine.dimension = engine.probe_dimension()?;
        info!(dimension = engine.dimension, pooling = %engine.pooling, "ONNX model ready");
        Ok(engine)
    }

    /// Run one tiny input to learn the embedding width.
    fn probe_dimension(&self) -> EmbedResult<usize> {
        let tokens = self.tokenize("dimension probe")?;
        let vector = self.run(&tokens)?;
        if vector.is_empty() {
            return Err(EmbedError::ModelLoad("model produced an empty embedding".into()));
        }
        Ok(vector.len())
    }

    fn run(&self, tokens: &[Token]) -> EmbedResult<Vec<f32>> {
        let seq_len = tokens.len();
        let shape = vec![1i64, seq_len as i64];
        let input_ids: Vec<i64> = tokens.iter().map(|&t| i64::from(t)).collect();

        let tensor = |name: &str, data: Vec<i64>| {
            Tensor::from_array((shape.clone(), data))
                .map_err(|e| EmbedError::EncodingFailed(format!("{name} tensor: {e}")))
        };
        let ids = tensor("input_ids", input_ids)?;
        let mask = tensor("attention_mask", vec![1i64; seq_len])?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbedError::EncodingFailed(format!("session lock poisoned: {e}")))?;

        let outputs = if self.token_type_ids {
            let types = tensor("token_type_ids", vec![0i64; seq_len])?;
            session.run(ort::inputs![
                "input_ids" => ids,
                "attention_mask" => mask,
                "token_type_ids" => types
            ])
        } else {
            session.run(ort::inputs![
                "input_ids" => ids,
                "attention_mask" => mask
            ])
        }
        .map_err(|e| EmbedError::EncodingFailed(format!("inference: {e}")))?;

        let (out_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedError::EncodingFailed(format!("extract tensor: {e}")))?;
        let dims: Vec<usize> = out_shape.iter().map(|&d| d as usize).collect();

        match dims.as_slice() {
            [1, seq, hidden] => Ok(pool(data, *seq, *hidden, self.pooling)),
            [1, hidden] => Ok(data[..*hidden].to_vec()),
            _ => Err(EmbedError::EncodingFailed(format!(
                "unexpected output shape: {dims:?}"
            ))),
        }
    }
}

impl InferenceEngine for OnnxEngine {
    fn tokenize(&self, text: &str) -> EmbedResult<Vec<Token>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbedError::TokenizationFailed(e.to_string()))?;
        let ids = encoding.get_ids().to_vec();
        if ids.is_empty() {
            return Err(EmbedError::TokenizationFailed("tokenizer produced no tokens".into()));
        }
        Ok(ids)
    }

    fn decode(&self, tokens: &[Token]) -> EmbedResult<Vec<f32>> {
        if tokens.is_empty() {
            return Err(EmbedError::EncodingFailed("empty token slice".into()));
        }
        self.run(tokens)
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }
}

/// Collapse a `[seq, hidden]` row-major block into one vector.
fn pool(data: &[f32], seq: usize, hidden: usize, mode: PoolingMode) -> Vec<f32> {
    if seq == 0 {
        return vec![0.0; hidden];
    }
    match mode {
        PoolingMode::Cls => data[..hidden].to_vec(),
        PoolingMode::Last => data[(seq - 1) * hidden..seq * hidden].to_vec(),
        PoolingMode::Mean => {
            let mut pooled = vec![0.0f32; hidden];
            for row in data[..seq * hidden].chunks_exact(hidden) {
                for (acc, x) in pooled.iter_mut().zip(row) {
                    *acc += x;
                }
            }
            for x in pooled.iter_mut() {
                *x /= seq as f32;
            }
            pooled
        }
    }
}

fn hub_cache_dir() -> EmbedResult<PathBuf> {
    directories::ProjectDirs::from("", "", "lembed")
        .map(|dirs| dirs.cache_dir().join("models"))
        .ok_or_else(|| EmbedError::Config("cannot resolve a cache directory".into()))
}
