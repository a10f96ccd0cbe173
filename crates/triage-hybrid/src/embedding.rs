//! Sentence embeddings for the similarity fallback.
//!
//! `EmbeddingModel` is the seam for any encoder.  The default
//! `HashingEmbedder` is deterministic and needs no model files: words and
//! character trigrams are feature-hashed with SHA-256 into a fixed number
//! of signed buckets, then L2-normalized.  With the `onnx` feature,
//! `OnnxEmbedder` runs a sentence-transformer model instead.

use sha2::{Digest, Sha256};

use triage_contracts::error::TriageResult;
use triage_nlu::normalize;

pub const DEFAULT_DIMENSION: usize = 384;

/// Trigram features weigh less than whole words.
const TRIGRAM_WEIGHT: f32 = 0.5;

/// Encodes text into fixed-size vectors.
pub trait EmbeddingModel: Send + Sync {
    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> TriageResult<Vec<f32>>;

    fn embed_batch(&self, texts: &[String]) -> TriageResult<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Deterministic feature-hashing encoder.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Bucket index and sign for one feature.
    fn bucket(&self, feature: &str) -> (usize, f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        let h = u64::from_le_bytes(bytes);
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        ((h % self.dimension as u64) as usize, sign)
    }
}

impl EmbeddingModel for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> TriageResult<Vec<f32>> {
        let mut v = vec![0.0f32; self.dimension];
        for word in normalize(text)
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let (i, sign) = self.bucket(&format!("w:{word}"));
            v[i] += sign;

            let padded: Vec<char> = format!(" {word} ").chars().collect();
            for tri in padded.windows(3) {
                let tri: String = tri.iter().collect();
                let (i, sign) = self.bucket(&format!("t:{tri}"));
                v[i] += sign * TRIGRAM_WEIGHT;
            }
        }
        l2_normalize(&mut v);
        Ok(v)
    }
}

pub(crate) fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Cosine similarity; 0 when either vector is zero or the sizes differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    (dot / (na * nb)).clamp(-1.0, 1.0)
}

/// Strip what the encoder should not see: numbers and bare units, which
/// would otherwise dominate short clinical notes.
pub fn preprocess_for_embedding(text: &str) -> String {
    const UNITS: &[&str] = &[
        "h", "hour", "hours", "day", "days", "week", "weeks", "month", "months", "year", "years",
        "heure", "heures", "jour", "jours", "semaine", "semaines", "mois", "an", "ans",
    ];
    let normalized = normalize(text);
    let mut kept: Vec<&str> = Vec::new();
    let mut after_number = false;
    for token in normalized.split_whitespace() {
        let bare = token.trim_matches(|c: char| !c.is_alphanumeric());
        if bare.chars().any(|c| c.is_ascii_digit()) {
            after_number = true;
            continue;
        }
        if after_number && UNITS.contains(&bare) {
            after_number = false;
            continue;
        }
        after_number = false;
        kept.push(token);
    }
    kept.join(" ")
}
