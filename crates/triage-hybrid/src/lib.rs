//! # triage-hybrid
//!
//! The similarity fallback that wraps the rule-layer extractor.
//!
//! - `EmbeddingModel` / `HashingEmbedder`: text to vectors
//! - `OnnxEmbedder` (feature `onnx`): sentence-transformer encoder on ONNX Runtime
//! - `Corpus`: annotated example sentences loaded from TOML
//! - `EmbeddingBackend`: the once-built corpus index, shared across sessions
//! - `HybridExtractor`: the `CaseExtractor` the dialogue engine is given
//!
//! ## Usage
//!
//! ```rust,ignore
//! let backend = Arc::new(EmbeddingBackend::new(
//!     Arc::new(HashingEmbedder::default()),
//!     Corpus::from_toml_str(include_str!("corpus.toml"))?,
//! ));
//! let extractor = HybridExtractor::new(Box::new(rules), backend, HybridConfig::default());
//! ```

pub mod corpus;
pub mod embedding;
pub mod orchestrator;

#[cfg(feature = "onnx")]
pub mod onnx;

pub use corpus::{Corpus, CorpusExample, WeakSignalLabel};
pub use embedding::{cosine_similarity, EmbeddingModel, HashingEmbedder};
pub use orchestrator::{EmbeddingBackend, HybridConfig, HybridExtractor};

#[cfg(feature = "onnx")]
pub use onnx::OnnxEmbedder;
