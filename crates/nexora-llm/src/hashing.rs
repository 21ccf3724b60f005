//! Deterministic offline embedder based on signed feature hashing.
//!
//! Tokens are lowercase alphanumeric runs. Each token that is not a stopword is hashed
//! with blake3 into one of `dimension` buckets with a ±1 sign, and the result is
//! L2-normalized. Texts sharing vocabulary get a positive cosine similarity; text with no
//! content tokens maps to the zero vector.

use crate::error::LlmError;
use crate::provider::{Embedder, Generator, Message};

pub const DEFAULT_DIMENSION: usize = 384;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "do", "does", "for", "from", "how", "i",
    "in", "is", "it", "its", "me", "my", "of", "on", "or", "that", "the", "this", "to", "was",
    "what", "when", "where", "which", "who", "why", "with", "you", "your",
];

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashingEmbedder {
    /// # Panics
    ///
    /// Panics if `dimension` is zero.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        assert!(dimension > 0, "hashing embedder dimension must be positive");
        Self {
            dimension,
            model_id: format!("hashing-{dimension}"),
        }
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokens(text) {
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();
            let mut idx_bytes = [0u8; 8];
            idx_bytes.copy_from_slice(&bytes[..8]);
            #[allow(clippy::cast_possible_truncation)]
            let idx = (u64::from_le_bytes(idx_bytes) % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[idx] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
}

impl Embedder for HashingEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "hashing"
    }
}

impl Generator for HashingEmbedder {
    async fn generate(&self, _messages: &[Message]) -> Result<String, LlmError> {
        Err(LlmError::GenerateUnsupported {
            provider: "hashing",
        })
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "hashing"
    }
}
