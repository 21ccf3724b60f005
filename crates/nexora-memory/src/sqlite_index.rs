//! Document-store vector backend on SQLite.
//!
//! Chunks are rows keyed by `(tenant_id, source_url, chunk_index)` with the embedding
//! stored as a little-endian `f32` blob. Queries load the tenant's rows and score them
//! with exact cosine similarity, which suits corpora of up to a few hundred thousand
//! chunks per tenant.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::is_sqlx_unavailable;
use crate::types::{Chunk, ScoredChunk, SourceType, TenantId};
use crate::vector_index::{
    BoxFuture, VectorIndex, VectorIndexError, check_tenant, cosine_similarity, rank,
};

#[derive(Debug, Clone)]
pub struct SqliteIndex {
    pool: SqlitePool,
}

type ChunkRow = (
    String,
    String,
    i64,
    String,
    String,
    String,
    i64,
    Vec<u8>,
    String,
    DateTime<Utc>,
);

fn map_sqlx(e: sqlx::Error) -> VectorIndexError {
    if is_sqlx_unavailable(&e) {
        VectorIndexError::Unavailable(e.to_string())
    } else {
        VectorIndexError::Backend(e.to_string())
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>, VectorIndexError> {
    if bytes.len() % 4 != 0 {
        return Err(VectorIndexError::Serialization(format!(
            "embedding blob of {} bytes is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn serialization<E: std::fmt::Display>(e: E) -> VectorIndexError {
    VectorIndexError::Serialization(e.to_string())
}

fn row_to_chunk(row: ChunkRow) -> Result<(Chunk, Vec<f32>), VectorIndexError> {
    let (
        tenant_id,
        source_url,
        chunk_index,
        id,
        source_type,
        content,
        total_chunks,
        embedding,
        embedding_model,
        created_at,
    ) = row;
    let chunk = Chunk {
        id,
        tenant_id: TenantId::new(tenant_id).map_err(serialization)?,
        source_url,
        source_type: source_type.parse::<SourceType>().map_err(serialization)?,
        content,
        chunk_index: u32::try_from(chunk_index).map_err(serialization)?,
        total_chunks: u32::try_from(total_chunks).map_err(serialization)?,
        embedding: Vec::new(),
        embedding_model,
        created_at,
    };
    Ok((chunk, decode_vector(&embedding)?))
}

impl SqliteIndex {
    /// Use a pool whose schema was migrated by [`crate::sqlite::SqliteStore`].
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn delete_where(
        &self,
        sql: &'static str,
        tenant: &TenantId,
        source_url: Option<&str>,
        keep_below: Option<u32>,
    ) -> Result<u64, VectorIndexError> {
        let mut query = sqlx::query(sql).bind(tenant);
        if let Some(source_url) = source_url {
            query = query.bind(source_url.to_owned());
        }
        if let Some(keep_below) = keep_below {
            query = query.bind(i64::from(keep_below));
        }
        let result = query.execute(&self.pool).await.map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }
}

impl VectorIndex for SqliteIndex {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn ensure_ready(&self, _dimension: usize) -> BoxFuture<'_, Result<(), VectorIndexError>> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
            Ok(())
        })
    }

    fn upsert<'a>(
        &'a self,
        tenant: &'a TenantId,
        chunks: Vec<Chunk>,
    ) -> BoxFuture<'a, Result<(), VectorIndexError>> {
        Box::pin(async move {
            check_tenant(tenant, &chunks)?;
            let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
            for c in &chunks {
                sqlx::query(
                    "INSERT INTO chunks (tenant_id, source_url, chunk_index, id, source_type, \
                     content, total_chunks, embedding, embedding_model, created_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                     ON CONFLICT(tenant_id, source_url, chunk_index) DO UPDATE SET \
                     id = excluded.id, source_type = excluded.source_type, \
                     content = excluded.content, total_chunks = excluded.total_chunks, \
                     embedding = excluded.embedding, embedding_model = excluded.embedding_model, \
                     created_at = excluded.created_at",
                )
                .bind(&c.tenant_id)
                .bind(&c.source_url)
                .bind(i64::from(c.chunk_index))
                .bind(&c.id)
                .bind(c.source_type.as_str())
                .bind(&c.content)
                .bind(i64::from(c.total_chunks))
                .bind(encode_vector(&c.embedding))
                .bind(&c.embedding_model)
                .bind(c.created_at)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
            }
            tx.commit().await.map_err(map_sqlx)?;
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
            let rows: Vec<ChunkRow> = sqlx::query_as(
                "SELECT tenant_id, source_url, chunk_index, id, source_type, content, \
                 total_chunks, embedding, embedding_model, created_at \
                 FROM chunks WHERE tenant_id = ?",
            )
            .bind(tenant)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

            let mut scored = Vec::with_capacity(rows.len());
            for row in rows {
                let (chunk, embedding) = row_to_chunk(row)?;
                if embedding.len() != vector.len() {
                    return Err(VectorIndexError::DimensionMismatch {
                        expected: embedding.len(),
                        got: vector.len(),
                    });
                }
                let score = cosine_similarity(&vector, &embedding);
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
        Box::pin(self.delete_where(
            "DELETE FROM chunks WHERE tenant_id = ? AND source_url = ?",
            tenant,
            Some(source_url),
            None,
        ))
    }

    fn delete_stale<'a>(
        &'a self,
        tenant: &'a TenantId,
        source_url: &'a str,
        keep_below: u32,
    ) -> BoxFuture<'a, Result<u64, VectorIndexError>> {
        Box::pin(self.delete_where(
            "DELETE FROM chunks WHERE tenant_id = ? AND source_url = ? AND chunk_index >= ?",
            tenant,
            Some(source_url),
            Some(keep_below),
        ))
    }

    fn delete_all<'a>(
        &'a self,
        tenant: &'a TenantId,
    ) -> BoxFuture<'a, Result<u64, VectorIndexError>> {
        Box::pin(self.delete_where(
            "DELETE FROM chunks WHERE tenant_id = ?",
            tenant,
            None,
            None,
        ))
    }

    fn count<'a>(&'a self, tenant: &'a TenantId) -> BoxFuture<'a, Result<u64, VectorIndexError>> {
        Box::pin(async move {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE tenant_id = ?")
                .bind(tenant)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx)?;
            u64::try_from(count).map_err(serialization)
        })
    }
}
