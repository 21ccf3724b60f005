//! Embedding wrapper shared by ingestion and retrieval.
//!
//! Every batch is checked for one vector per input and a stable dimension. The first
//! successful call fixes the dimension for the lifetime of the process.

use std::time::Duration;

use nexora_llm::{Embedder, LlmError};
use tokio::sync::OnceCell;

use crate::error::{RagError, Stage};

const DIMENSION_SAMPLE: &str = "dimension sample";

#[derive(Debug)]
pub struct EmbeddingService<E> {
    embedder: E,
    dimension: OnceCell<usize>,
    timeout: Duration,
}

impl<E: Embedder> EmbeddingService<E> {
    #[must_use]
    pub fn new(embedder: E, timeout: Duration) -> Self {
        Self {
            embedder,
            dimension: OnceCell::new(),
            timeout,
        }
    }

    #[must_use]
    pub fn model_id(&self) -> &str {
        self.embedder.model_id()
    }

    #[must_use]
    pub fn inner(&self) -> &E {
        &self.embedder
    }

    /// Output dimension, probing the model once if nothing has been embedded yet.
    ///
    /// # Errors
    ///
    /// Returns a dependency error if the sample request fails.
    pub async fn dimension(&self) -> Result<usize, RagError> {
        self.dimension
            .get_or_try_init(|| async {
                let vectors = self.call(&[DIMENSION_SAMPLE.to_owned()]).await?;
                let dim = vectors.first().map_or(0, Vec::len);
                if dim == 0 {
                    return Err(RagError::Embedding(LlmError::EmptyResponse {
                        provider: "embedder",
                    }));
                }
                tracing::debug!(model = self.model_id(), dim, "embedding dimension detected");
                Ok(dim)
            })
            .await
            .copied()
    }

    /// Embed `texts`, one vector per input in order.
    ///
    /// # Errors
    ///
    /// Returns a dependency error when the model fails, times out, or returns vectors
    /// of the wrong count or dimension.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.call(texts).await?;

        let first = vectors.first().map_or(0, Vec::len);
        let expected = match self.dimension.get() {
            Some(dim) => *dim,
            None if first > 0 => {
                let _ = self.dimension.set(first);
                first
            }
            None => {
                return Err(RagError::Embedding(LlmError::EmptyResponse {
                    provider: "embedder",
                }));
            }
        };
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(RagError::Embedding(LlmError::Other(format!(
                "embedding dimension changed: expected {expected}, got {}",
                bad.len()
            ))));
        }
        Ok(vectors)
    }

    /// # Errors
    ///
    /// See [`Self::embed`].
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut vectors = self.embed(&[text.to_owned()]).await?;
        vectors
            .pop()
            .ok_or(RagError::Embedding(LlmError::BatchMismatch {
                expected: 1,
                got: 0,
            }))
    }

    async fn call(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let vectors = tokio::time::timeout(self.timeout, self.embedder.embed_batch(texts))
            .await
            .map_err(|_| RagError::Timeout {
                stage: Stage::Embedding,
            })?
            .map_err(RagError::Embedding)?;
        if vectors.len() != texts.len() {
            return Err(RagError::Embedding(LlmError::BatchMismatch {
                expected: texts.len(),
                got: vectors.len(),
            }));
        }
        Ok(vectors)
    }
}
