use std::cmp::Ordering;
use std::future::Future;
use std::pin::Pin;

use crate::types::{Chunk, ScoredChunk, TenantId};

#[derive(Debug, thiserror::Error)]
pub enum VectorIndexError {
    #[error("vector index unavailable: {0}")]
    Unavailable(String),

    #[error("vector index error: {0}")]
    Backend(String),

    #[error("chunk belongs to tenant {found}, expected {expected}")]
    TenantMismatch { expected: String, found: String },

    #[error("vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl VectorIndexError {
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Tenant-scoped chunk storage with cosine similarity queries.
///
/// Every operation takes the tenant explicitly and must never observe or modify another
/// tenant's chunks. Upserts are idempotent on `(tenant_id, source_url, chunk_index)`.
/// Query results are ordered by [`rank`] and carry an empty `embedding`.
pub trait VectorIndex: Send + Sync {
    fn name(&self) -> &'static str;

    /// Prepare storage for vectors of `dimension`. Idempotent.
    fn ensure_ready(&self, dimension: usize) -> BoxFuture<'_, Result<(), VectorIndexError>>;

    fn upsert<'a>(
        &'a self,
        tenant: &'a TenantId,
        chunks: Vec<Chunk>,
    ) -> BoxFuture<'a, Result<(), VectorIndexError>>;

    fn query<'a>(
        &'a self,
        tenant: &'a TenantId,
        vector: Vec<f32>,
        top_k: usize,
    ) -> BoxFuture<'a, Result<Vec<ScoredChunk>, VectorIndexError>>;

    fn delete_by_source<'a>(
        &'a self,
        tenant: &'a TenantId,
        source_url: &'a str,
    ) -> BoxFuture<'a, Result<u64, VectorIndexError>>;

    /// Remove chunks of `source_url` whose index is `>= keep_below`.
    fn delete_stale<'a>(
        &'a self,
        tenant: &'a TenantId,
        source_url: &'a str,
        keep_below: u32,
    ) -> BoxFuture<'a, Result<u64, VectorIndexError>>;

    fn delete_all<'a>(&'a self, tenant: &'a TenantId)
    -> BoxFuture<'a, Result<u64, VectorIndexError>>;

    fn count<'a>(&'a self, tenant: &'a TenantId) -> BoxFuture<'a, Result<u64, VectorIndexError>>;
}

/// Reject chunks that do not belong to `tenant`.
///
/// # Errors
///
/// Returns [`VectorIndexError::TenantMismatch`] for the first foreign chunk.
pub fn check_tenant(tenant: &TenantId, chunks: &[Chunk]) -> Result<(), VectorIndexError> {
    match chunks.iter().find(|c| c.tenant_id != *tenant) {
        Some(c) => Err(VectorIndexError::TenantMismatch {
            expected: tenant.to_string(),
            found: c.tenant_id.to_string(),
        }),
        None => Ok(()),
    }
}

#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Total order for results: score descending, newest first, then chunk key ascending.
#[must_use]
pub fn compare_scored(a: &ScoredChunk, b: &ScoredChunk) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.chunk.created_at.cmp(&a.chunk.created_at))
        .then_with(|| a.chunk.key().cmp(&b.chunk.key()))
}

/// Sort by [`compare_scored`] and keep the first `top_k`.
pub fn rank(results: &mut Vec<ScoredChunk>, top_k: usize) {
    results.sort_by(compare_scored);
    results.truncate(top_k);
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, TimeZone, Utc};

    use crate::types::{Chunk, SourceType, TenantId};

    pub fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    pub fn chunk(tenant: &str, source: &str, index: u32, vector: Vec<f32>) -> Chunk {
        let tenant_id = TenantId::new(tenant).unwrap();
        Chunk {
            id: Chunk::point_id(&tenant_id, source, index).to_string(),
            tenant_id,
            source_url: source.into(),
            source_type: SourceType::Web,
            content: format!("{source}#{index}"),
            chunk_index: index,
            total_chunks: index + 1,
            embedding: vector,
            embedding_model: "test-model".into(),
            created_at: ts(1_700_000_000),
        }
    }
}
