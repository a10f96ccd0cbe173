//! Sentence-transformer encoder on ONNX Runtime, behind the `onnx` feature.
//!
//! Loads a MiniLM-style export (`model.onnx` + `tokenizer.json`) and
//! produces mean-pooled, L2-normalized sentence vectors.  Paraphrases that
//! share no words with a corpus sentence still land near it, which the
//! hashing encoder cannot do.

use std::path::Path;
use std::sync::Mutex;

use ort::{session::Session, value::TensorRef};
use tokenizers::Tokenizer;
use tracing::info;

use triage_contracts::error::{TriageError, TriageResult};

use crate::embedding::{l2_normalize, EmbeddingModel, DEFAULT_DIMENSION};

fn backend_error(reason: impl std::fmt::Display) -> TriageError {
    TriageError::ExtractionBackend {
        reason: reason.to_string(),
    }
}

/// ONNX sentence encoder.
///
/// `ort::Session::run` needs `&mut self`, so the session sits behind a
/// `Mutex`; `EmbeddingModel` is shared across sessions through `&self`.
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dimension: usize,
}

impl OnnxEmbedder {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`.
    pub fn load(model_dir: &Path) -> TriageResult<Self> {
        Self::load_with_dimension(model_dir, DEFAULT_DIMENSION)
    }

    /// Load a model whose hidden size is not 384.
    pub fn load_with_dimension(model_dir: &Path, dimension: usize) -> TriageResult<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");
        for path in [&model_path, &tokenizer_path] {
            if !path.exists() {
                return Err(TriageError::ConfigError {
                    reason: format!("embedding model file '{}' not found", path.display()),
                });
            }
        }

        let session = Session::builder()
            .map_err(|e: ort::Error| backend_error(e))?
            .with_intra_threads(2)
            .map_err(|e: ort::Error| backend_error(e))?
            .commit_from_file(&model_path)
            .map_err(|e: ort::Error| backend_error(format!("ONNX load failed: {e}")))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| backend_error(format!("tokenizer load failed: {e}")))?;

        info!(model_dir = %model_dir.display(), dimension, "ONNX embedder loaded");
        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimension,
        })
    }

    fn infer(&self, text: &str) -> TriageResult<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| backend_error(format!("tokenization failed: {e}")))?;

        let to_i64 = |xs: &[u32]| xs.iter().map(|&x| x as i64).collect::<Vec<i64>>();
        let attention_mask = to_i64(encoding.get_attention_mask());
        let seq_len = attention_mask.len();

        let shape = (1, seq_len);
        let ids = ndarray::Array2::from_shape_vec(shape, to_i64(encoding.get_ids()))
            .map_err(backend_error)?;
        let mask = ndarray::Array2::from_shape_vec(shape, attention_mask.clone())
            .map_err(backend_error)?;
        let types = ndarray::Array2::from_shape_vec(shape, to_i64(encoding.get_type_ids()))
            .map_err(backend_error)?;

        let ids = TensorRef::from_array_view(&ids).map_err(backend_error)?;
        let mask = TensorRef::from_array_view(&mask).map_err(backend_error)?;
        let types = TensorRef::from_array_view(&types).map_err(backend_error)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| backend_error("ONNX session lock poisoned"))?;
        let outputs = session
            .run(ort::inputs![ids, mask, types])
            .map_err(|e| backend_error(format!("ONNX inference failed: {e}")))?;

        // Token embeddings: [1, seq_len, dimension].
        let (out_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| backend_error(format!("output extraction failed: {e}")))?;
        if out_shape.len() != 3 || out_shape[2] as usize != self.dimension {
            return Err(backend_error(format!(
                "unexpected output shape {out_shape:?}, expected [1, {seq_len}, {}]",
                self.dimension
            )));
        }

        Ok(mean_pool(data, &attention_mask, self.dimension))
    }
}

/// Attention-masked mean over token vectors, then L2-normalized.
pub(crate) fn mean_pool(tokens: &[f32], mask: &[i64], dimension: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; dimension];
    let mut weight = 0.0f32;
    for (row, &m) in tokens.chunks_exact(dimension).zip(mask) {
        let m = m as f32;
        weight += m;
        for (p, t) in pooled.iter_mut().zip(row) {
            *p += t * m;
        }
    }
    if weight > 0.0 {
        pooled.iter_mut().for_each(|p| *p /= weight);
    }
    l2_normalize(&mut pooled);
    pooled
}

impl EmbeddingModel for OnnxEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> TriageResult<Vec<f32>> {
        self.infer(text)
    }
}
