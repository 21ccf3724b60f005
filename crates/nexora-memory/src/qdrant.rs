//! Qdrant backend. One collection holds every tenant; isolation is a mandatory
//! `tenant_id` payload filter on each request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    DeletePointsBuilder, Distance, FieldType, Filter, PointStruct, Range, ScoredPoint,
    SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder, value::Kind,
};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;
use crate::types::{Chunk, ScoredChunk, SourceType, TenantId};
use crate::vector_index::{BoxFuture, VectorIndex, VectorIndexError, check_tenant, rank};

pub const DEFAULT_COLLECTION: &str = "nexora_chunks";

#[derive(Serialize, Deserialize)]
struct ChunkPayload {
    tenant_id: TenantId,
    source_url: String,
    source_type: SourceType,
    content: String,
    chunk_index: u32,
    total_chunks: u32,
    embedding_model: String,
    created_at: DateTime<Utc>,
}

pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
    ready: AtomicBool,
}

impl std::fmt::Debug for QdrantIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantIndex")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

fn unavailable(e: qdrant_client::QdrantError) -> VectorIndexError {
    VectorIndexError::Unavailable(e.to_string())
}

fn tenant_filter(tenant: &TenantId) -> Filter {
    Filter::must([Condition::matches("tenant_id", tenant.to_string())])
}

fn source_filter(tenant: &TenantId, source_url: &str) -> Filter {
    Filter::must([
        Condition::matches("tenant_id", tenant.to_string()),
        Condition::matches("source_url", source_url.to_owned()),
    ])
}

impl QdrantIndex {
    /// Create a client for `url` using `collection`.
    ///
    /// # Errors
    ///
    /// Returns an error if the Qdrant client cannot be created.
    pub fn new(url: &str, collection: impl Into<String>) -> Result<Self, MemoryError> {
        let client = Qdrant::from_url(url).build().map_err(Box::new)?;
        Ok(Self {
            client,
            collection: collection.into(),
            ready: AtomicBool::new(false),
        })
    }

    /// Whether the collection exists. Reads and deletes against a missing collection
    /// behave as if it were empty.
    async fn exists(&self) -> Result<bool, VectorIndexError> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(true);
        }
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(unavailable)?;
        if exists {
            self.ready.store(true, Ordering::Release);
        }
        Ok(exists)
    }

    async fn count_matching(&self, filter: Filter) -> Result<u64, VectorIndexError> {
        let response = self
            .client
            .count(
                CountPointsBuilder::new(&self.collection)
                    .filter(filter)
                    .exact(true),
            )
            .await
            .map_err(unavailable)?;
        Ok(response.result.map_or(0, |r| r.count))
    }

    async fn delete_matching(&self, filter: Filter) -> Result<u64, VectorIndexError> {
        if !self.exists().await? {
            return Ok(0);
        }
        let count = self.count_matching(filter.clone()).await?;
        if count == 0 {
            return Ok(0);
        }
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(filter)
                    .wait(true),
            )
            .await
            .map_err(unavailable)?;
        Ok(count)
    }
}

fn chunk_to_point(chunk: Chunk) -> Result<PointStruct, VectorIndexError> {
    let payload = ChunkPayload {
        tenant_id: chunk.tenant_id,
        source_url: chunk.source_url,
        source_type: chunk.source_type,
        content: chunk.content,
        chunk_index: chunk.chunk_index,
        total_chunks: chunk.total_chunks,
        embedding_model: chunk.embedding_model,
        created_at: chunk.created_at,
    };
    let json = serde_json::to_value(payload)
        .map_err(|e| VectorIndexError::Serialization(e.to_string()))?;
    let payload: HashMap<String, qdrant_client::qdrant::Value> = serde_json::from_value(json)
        .map_err(|e| VectorIndexError::Serialization(e.to_string()))?;
    Ok(PointStruct::new(chunk.id, chunk.embedding, payload))
}

fn scored_point_to_chunk(point: ScoredPoint) -> Result<ScoredChunk, VectorIndexError> {
    let payload: serde_json::Map<String, serde_json::Value> = point
        .payload
        .into_iter()
        .filter_map(|(k, v)| {
            let json_val = match v.kind? {
                Kind::StringValue(s) => serde_json::Value::String(s),
                Kind::IntegerValue(i) => serde_json::Value::Number(i.into()),
                Kind::DoubleValue(d) => {
                    serde_json::Number::from_f64(d).map(serde_json::Value::Number)?
                }
                Kind::BoolValue(b) => serde_json::Value::Bool(b),
                _ => return None,
            };
            Some((k, json_val))
        })
        .collect();

    let payload: ChunkPayload = serde_json::from_value(serde_json::Value::Object(payload))
        .map_err(|e| VectorIndexError::Serialization(e.to_string()))?;

    let id = match point.id.and_then(|pid| pid.point_id_options) {
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u)) => u,
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    };

    Ok(ScoredChunk {
        chunk: Chunk {
            id,
            tenant_id: payload.tenant_id,
            source_url: payload.source_url,
            source_type: payload.source_type,
            content: payload.content,
            chunk_index: payload.chunk_index,
            total_chunks: payload.total_chunks,
            embedding: Vec::new(),
            embedding_model: payload.embedding_model,
            created_at: payload.created_at,
        },
        score: point.score,
    })
}

impl VectorIndex for QdrantIndex {
    fn name(&self) -> &'static str {
        "qdrant"
    }

    fn ensure_ready(&self, dimension: usize) -> BoxFuture<'_, Result<(), VectorIndexError>> {
        Box::pin(async move {
            if self.exists().await? {
                return Ok(());
            }
            tracing::info!(
                collection = %self.collection,
                dimension,
                "creating Qdrant collection"
            );
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection).vectors_config(
                        VectorParamsBuilder::new(dimension as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(unavailable)?;
            self.client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    &self.collection,
                    "tenant_id",
                    FieldType::Keyword,
                ))
                .await
                .map_err(unavailable)?;
            self.ready.store(true, Ordering::Release);
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
            if chunks.is_empty() {
                return Ok(());
            }
            let points = chunks
                .into_iter()
                .map(chunk_to_point)
                .collect::<Result<Vec<_>, _>>()?;
            self.client
                .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
                .await
                .map_err(unavailable)?;
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
            if top_k == 0 || !self.exists().await? {
                return Ok(Vec::new());
            }
            // Over-fetch so the local tie-break can reorder equal scores at the cut.
            let limit = (top_k as u64).saturating_mul(2);
            let response = self
                .client
                .search_points(
                    SearchPointsBuilder::new(&self.collection, vector, limit)
                        .filter(tenant_filter(tenant))
                        .with_payload(true),
                )
                .await
                .map_err(unavailable)?;

            let mut results = Vec::with_capacity(response.result.len());
            for point in response.result {
                let scored = scored_point_to_chunk(point)?;
                if scored.chunk.tenant_id == *tenant {
                    results.push(scored);
                } else {
                    tracing::error!(
                        tenant = %tenant,
                        "Qdrant returned a point outside the tenant filter; dropped"
                    );
                }
            }
            rank(&mut results, top_k);
            Ok(results)
        })
    }

    fn delete_by_source<'a>(
        &'a self,
        tenant: &'a TenantId,
        source_url: &'a str,
    ) -> BoxFuture<'a, Result<u64, VectorIndexError>> {
        Box::pin(async move { self.delete_matching(source_filter(tenant, source_url)).await })
    }

    fn delete_stale<'a>(
        &'a self,
        tenant: &'a TenantId,
        source_url: &'a str,
        keep_below: u32,
    ) -> BoxFuture<'a, Result<u64, VectorIndexError>> {
        Box::pin(async move {
            let mut filter = source_filter(tenant, source_url);
            filter.must.push(Condition::range(
                "chunk_index",
                Range {
                    gte: Some(f64::from(keep_below)),
                    ..Default::default()
                },
            ));
            self.delete_matching(filter).await
        })
    }

    fn delete_all<'a>(
        &'a self,
        tenant: &'a TenantId,
    ) -> BoxFuture<'a, Result<u64, VectorIndexError>> {
        Box::pin(async move { self.delete_matching(tenant_filter(tenant)).await })
    }

    fn count<'a>(&'a self, tenant: &'a TenantId) -> BoxFuture<'a, Result<u64, VectorIndexError>> {
        Box::pin(async move {
            if !self.exists().await? {
                return Ok(0);
            }
            self.count_matching(tenant_filter(tenant)).await
        })
    }
}
