use std::collections::HashMap;
use std::sync::RwLock;

use crate::types::{Chunk, ScoredChunk, TenantId};
use crate::vector_index::{
    BoxFuture, VectorIndex, VectorIndexError, check_tenant, cosine_similarity, rank,
};

type ChunkKey = (String, u32);

/// Process-local index for tests and single-node offline use.
pub struct InMemoryIndex {
    tenants: RwLock<HashMap<TenantId, HashMap<ChunkKey, Chunk>>>,
}

impl InMemoryIndex {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryIndex").finish_non_exhaustive()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> VectorIndexError {
    VectorIndexError::Backend(e.to_string())
}

fn removed(before: usize, after: usize) -> u64 {
    (before - after) as u64
}

impl VectorIndex for InMemoryIndex {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn ensure_ready(&self, _dimension: usize) -> BoxFuture<'_, Result<(), VectorIndexError>> {
        Box::pin(async { Ok(()) })
    }

    fn upsert<'a>(
        &'a self,
        tenant: &'a TenantId,
        chunks: Vec<Chunk>,
    ) -> BoxFuture<'a, Result<(), VectorIndexError>> {
        Box::pin(async move {
            check_tenant(tenant, &chunks)?;
            let mut tenants = self.tenants.write().map_err(poisoned)?;
            let entries = tenants.entry(tenant.clone()).or_default();
            for c in chunks {
                entries.insert((c.source_url.clone(), c.chunk_index), c);
            }
            Ok(())
        })
    }

    fn query<'a>(
        &'a self,
        tenant: &'a TenantId,
        vector: Vec<f32>,
        top_k: usize,
    ) -> BoxFuture<'a, Result<Vec<ScoredChunk>, VectorIndexError>> {
        Box::pin(async move {
            let tenants = self.tenants.read().map_err(poisoned)?;
            let Some(entries) = tenants.get(tenant) else {
                return Ok(Vec::new());
            };

            let mut scored = Vec::with_capacity(entries.len());
            for c in entries.values() {
                if c.embedding.len() != vector.len() {
                    return Err(VectorIndexError::DimensionMismatch {
                        expected: c.embedding.len(),
                        got: vector.len(),
                    });
                }
                let score = cosine_similarity(&vector, &c.embedding);
                let mut chunk = c.clone();
                chunk.embedding = Vec::new();
                scored.push(ScoredChunk { chunk, score });
            }
            rank(&mut scored, top_k);
            Ok(scored)
        })
    }

    fn delete_by_source<'a>(
        &'a self,
        tenant: &'a TenantId,
        source_url: &'a str,
    ) -> BoxFuture<'a, Result<u64, VectorIndexError>> {
        Box::pin(async move {
            let mut tenants = self.tenants.write().map_err(poisoned)?;
            let Some(entries) = tenants.get_mut(tenant) else {
                return Ok(0);
            };
            let before = entries.len();
            entries.retain(|(src, _), _| src != source_url);
            Ok(removed(before, entries.len()))
        })
    }

    fn delete_stale<'a>(
        &'a self,
        tenant: &'a TenantId,
        source_url: &'a str,
        keep_below: u32,
    ) -> BoxFuture<'a, Result<u64, VectorIndexError>> {
        Box::pin(async move {
            let mut tenants = self.tenants.write().map_err(poisoned)?;
            let Some(entries) = tenants.get_mut(tenant) else {
                return Ok(0);
            };
            let before = entries.len();
            entries.retain(|(src, idx), _| src != source_url || *idx < keep_below);
            Ok(removed(before, entries.len()))
        })
    }

    fn delete_all<'a>(
        &'a self,
        tenant: &'a TenantId,
    ) -> BoxFuture<'a, Result<u64, VectorIndexError>> {
        Box::pin(async move {
            let mut tenants = self.tenants.write().map_err(poisoned)?;
            Ok(tenants.remove(tenant).map_or(0, |e| e.len() as u64))
        })
    }

    fn count<'a>(&'a self, tenant: &'a TenantId) -> BoxFuture<'a, Result<u64, VectorIndexError>> {
        Box::pin(async move {
            let tenants = self.tenants.read().map_err(poisoned)?;
            Ok(tenants.get(tenant).map_or(0, |e| e.len() as u64))
        })
    }
}
