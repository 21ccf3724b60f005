use axum::Json;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::IntoResponse;
use nexora_core::{AskRequest, JobStatus, PurgeReport, RagError, TenantStats};
use nexora_llm::{Embedder, Generator};
use nexora_memory::{ChatMessage, SessionId, SourceType, TenantId};
use uuid::Uuid;

use crate::error::ApiError;
use crate::server::AppState;

pub const TENANT_HEADER: &str = "x-tenant-id";

/// Tenant of the request, from the `X-Tenant-Id` header.
pub(crate) struct Tenant(pub TenantId);

impl<S: Send + Sync> FromRequestParts<S> for Tenant {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| RagError::Validation("missing X-Tenant-Id header".into()))?;
        Ok(Self(TenantId::new(value)?))
    }
}

#[derive(serde::Deserialize)]
pub(crate) struct ChatRequest {
    pub question: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_ref: Option<String>,
}

#[derive(serde::Deserialize)]
pub(crate) struct ChunksRequest {
    pub source_url: String,
    #[serde(default)]
    pub source_type: SourceType,
    pub chunks: Vec<String>,
}

#[derive(serde::Deserialize)]
pub(crate) struct DocumentRequest {
    pub source_url: String,
    #[serde(default)]
    pub source_type: SourceType,
    pub text: String,
}

#[derive(serde::Deserialize)]
pub(crate) struct SourceQuery {
    pub source_url: String,
}

#[derive(serde::Serialize)]
struct StoredResponse {
    stored: usize,
}

#[derive(serde::Serialize)]
struct DeletedResponse<T> {
    deleted: T,
}

#[derive(serde::Serialize)]
struct JobAccepted {
    job_id: Uuid,
}

#[derive(serde::Serialize)]
struct CancelResponse {
    cancelled: bool,
}

#[derive(serde::Serialize)]
struct HistoryResponse {
    session_id: SessionId,
    messages: Vec<ChatMessage>,
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    index: &'static str,
}

fn job_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError(RagError::NotFound(format!("job {raw}"))))
}

pub(crate) async fn health_handler<E, G>(State(state): State<AppState<E, G>>) -> impl IntoResponse
where
    E: Embedder + 'static,
    G: Generator + 'static,
{
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
        index: state.service.index_backend(),
    })
}

pub(crate) async fn chat_handler<E, G>(
    State(state): State<AppState<E, G>>,
    Tenant(tenant): Tenant,
    Json(req): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    E: Embedder + 'static,
    G: Generator + 'static,
{
    let mut request = AskRequest::new(tenant, req.question);
    if let Some(raw) = req.session_id.filter(|s| !s.is_empty()) {
        request = request.in_session(SessionId::parse(raw)?);
    }
    request.user_ref = req.user_ref;
    let answer = state.service.ask(request).await?;
    Ok(Json(answer))
}

pub(crate) async fn ingest_chunks_handler<E, G>(
    State(state): State<AppState<E, G>>,
    Tenant(tenant): Tenant,
    Json(req): Json<ChunksRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    E: Embedder + 'static,
    G: Generator + 'static,
{
    let stored = state
        .service
        .ingest_chunks(&tenant, &req.source_url, req.source_type, req.chunks)
        .await?;
    Ok(Json(StoredResponse { stored }))
}

pub(crate) async fn ingest_document_handler<E, G>(
    State(state): State<AppState<E, G>>,
    Tenant(tenant): Tenant,
    Json(req): Json<DocumentRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    E: Embedder + 'static,
    G: Generator + 'static,
{
    let stored = state
        .service
        .ingest_document(&tenant, &req.source_url, req.source_type, &req.text)
        .await?;
    Ok(Json(StoredResponse { stored }))
}

pub(crate) async fn submit_job_handler<E, G>(
    State(state): State<AppState<E, G>>,
    Tenant(tenant): Tenant,
    Json(req): Json<DocumentRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    E: Embedder + 'static,
    G: Generator + 'static,
{
    nexora_memory::types::validate_source_url(&req.source_url)?;
    let job_id = state
        .service
        .submit_document(tenant, req.source_url, req.source_type, req.text);
    Ok((StatusCode::ACCEPTED, Json(JobAccepted { job_id })))
}

pub(crate) async fn job_status_handler<E, G>(
    State(state): State<AppState<E, G>>,
    Tenant(tenant): Tenant,
    Path(id): Path<String>,
) -> Result<Json<JobStatus>, ApiError>
where
    E: Embedder + 'static,
    G: Generator + 'static,
{
    Ok(Json(state.service.job_status(&tenant, job_id(&id)?)?))
}

pub(crate) async fn cancel_job_handler<E, G>(
    State(state): State<AppState<E, G>>,
    Tenant(tenant): Tenant,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    E: Embedder + 'static,
    G: Generator + 'static,
{
    let cancelled = state.service.jobs().cancel(&tenant, job_id(&id)?)?;
    Ok(Json(CancelResponse { cancelled }))
}

pub(crate) async fn delete_source_handler<E, G>(
    State(state): State<AppState<E, G>>,
    Tenant(tenant): Tenant,
    Query(query): Query<SourceQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    E: Embedder + 'static,
    G: Generator + 'static,
{
    let deleted = state
        .service
        .delete_source(&tenant, &query.source_url)
        .await?;
    Ok(Json(DeletedResponse { deleted }))
}

pub(crate) async fn purge_handler<E, G>(
    State(state): State<AppState<E, G>>,
    Tenant(tenant): Tenant,
) -> Result<Json<PurgeReport>, ApiError>
where
    E: Embedder + 'static,
    G: Generator + 'static,
{
    Ok(Json(state.service.purge_tenant(&tenant).await?))
}

pub(crate) async fn history_handler<E, G>(
    State(state): State<AppState<E, G>>,
    Tenant(tenant): Tenant,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    E: Embedder + 'static,
    G: Generator + 'static,
{
    let session_id = SessionId::parse(id)?;
    let messages = state.service.get_history(&tenant, &session_id).await?;
    Ok(Json(HistoryResponse {
        session_id,
        messages,
    }))
}

pub(crate) async fn delete_session_handler<E, G>(
    State(state): State<AppState<E, G>>,
    Tenant(tenant): Tenant,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    E: Embedder + 'static,
    G: Generator + 'static,
{
    let deleted = state
        .service
        .delete_session(&tenant, &SessionId::parse(id)?)
        .await?;
    Ok(Json(DeletedResponse { deleted }))
}

pub(crate) async fn stats_handler<E, G>(
    State(state): State<AppState<E, G>>,
    Tenant(tenant): Tenant,
) -> Result<Json<TenantStats>, ApiError>
where
    E: Embedder + 'static,
    G: Generator + 'static,
{
    Ok(Json(state.service.stats(&tenant).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_session_is_optional() {
        let req: ChatRequest = serde_json::from_str(r#"{"question":"What is Python?"}"#).unwrap();
        assert_eq!(req.question, "What is Python?");
        assert!(req.session_id.is_none());
    }

    #[test]
    fn chunks_request_defaults_source_type() {
        let req: ChunksRequest =
            serde_json::from_str(r#"{"source_url":"doc","chunks":["a","b"]}"#).unwrap();
        assert_eq!(req.source_type, SourceType::default());
        assert_eq!(req.chunks.len(), 2);
    }

    #[test]
    fn malformed_job_id_is_not_found() {
        assert!(job_id("not-a-uuid").is_err());
        assert!(job_id("67e55044-10b1-426f-9247-bb680e5fe0c8").is_ok());
    }
}
