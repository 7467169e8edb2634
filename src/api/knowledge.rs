use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::auth::{require_permission, Session};
use super::state::AppState;
use super::{ApiError, ApiResult};
use crate::error::DeskError;
use crate::knowledge::models::{DocumentType, KnowledgeDocument, RetrievalResult};

pub async fn list(
    State(state): State<AppState>,
    Session(session): Session,
) -> ApiResult<Json<Vec<KnowledgeDocument>>> {
    require_permission(&session, "knowledge:read")?;
    Ok(Json(state.knowledge.list().await.map_err(ApiError)?))
}

pub async fn get_one(
    State(state): State<AppState>,
    Session(session): Session,
    Path(id): Path<String>,
) -> ApiResult<Json<KnowledgeDocument>> {
    require_permission(&session, "knowledge:read")?;
    state
        .knowledge
        .get(&id)
        .await
        .map_err(ApiError)?
        .map(Json)
        .ok_or_else(|| ApiError(DeskError::NotFound(format!("document {id}"))))
}

#[derive(Debug, Deserialize)]
pub struct CreateDocumentRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub document_type: Option<DocumentType>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// POST /api/knowledge/documents. Indexing runs as a background job so the
/// request returns as soon as the document is queued.
pub async fn create(
    State(state): State<AppState>,
    Session(session): Session,
    Json(request): Json<CreateDocumentRequest>,
) -> ApiResult<Json<Value>> {
    require_permission(&session, "knowledge:write")?;
    if request.title.trim().is_empty() || request.content.trim().is_empty() {
        return Err(ApiError(DeskError::Validation(
            "title and content must not be empty".into(),
        )));
    }

    let mut document = KnowledgeDocument::new(request.title.clone(), request.content.clone());
    document.document_type = request.document_type.unwrap_or(DocumentType::Other);
    document.tags = request.tags.clone();
    state.knowledge.upsert(&document).await.map_err(ApiError)?;

    let job = state
        .jobs
        .submit(
            "indexing",
            json!({
                "document_id": document.id,
                "title": request.title,
                "content": request.content,
                "tags": request.tags,
            }),
        )
        .await
        .map_err(ApiError)?;

    Ok(Json(json!({"document_id": document.id, "job_id": job.id})))
}

pub async fn delete(
    State(state): State<AppState>,
    Session(session): Session,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    require_permission(&session, "knowledge:write")?;
    if state.knowledge.get(&id).await.map_err(ApiError)?.is_none() {
        return Err(ApiError(DeskError::NotFound(format!("document {id}"))));
    }
    state.indexer.delete_document(&id).await.map_err(ApiError)?;
    Ok(Json(json!({"status": "deleted"})))
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// POST /api/knowledge/search
pub async fn search(
    State(state): State<AppState>,
    Session(session): Session,
    Json(request): Json<SearchRequest>,
) -> ApiResult<Json<Vec<RetrievalResult>>> {
    require_permission(&session, "knowledge:read")?;
    let top_k = request.top_k.unwrap_or(state.config.rag_top_k).min(50);
    let results = state
        .retriever
        .retrieve_filtered(&request.query, top_k, request.tags.as_deref())
        .await
        .map_err(ApiError)?;
    Ok(Json(results))
}
