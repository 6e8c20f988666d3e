//! Review workflow endpoints
//!
//! Thin adapters over the transition engine: parse, call, serialize. All
//! guards (roles, source states, self-review) live in the engine.

use crate::api::CurrentUser;
use crate::db::annotations::AnnotationPatch;
use crate::db::{annotations, statuses, statuses::StatusFilter};
use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use genatlas_common::db::{AnnotationStatus, GeneAnnotation, ReviewState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct StatusListQuery {
    pub state: Option<String>,
    pub reviewer: Option<String>,
}

/// GET /api/statuses?state=&reviewer=
pub async fn list_statuses(
    State(state): State<AppState>,
    Query(query): Query<StatusListQuery>,
) -> ApiResult<Json<Vec<AnnotationStatus>>> {
    let state_filter = match query.state.as_deref() {
        Some(s) => Some(
            ReviewState::parse(s)
                .map_err(|_| ApiError::BadRequest(format!("unknown review state: {}", s)))?,
        ),
        None => None,
    };
    let filter = StatusFilter {
        state: state_filter,
        reviewer: query.reviewer,
    };
    Ok(Json(statuses::list_statuses(&state.db, &filter).await?))
}

/// GET /api/statuses/:gene
pub async fn get_status(
    State(state): State<AppState>,
    Path(gene): Path<String>,
) -> ApiResult<Json<AnnotationStatus>> {
    Ok(Json(statuses::get_status(&state.db, &gene).await?))
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub genes: Vec<String>,
}

/// POST /api/statuses/assign
pub async fn assign(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<AssignRequest>,
) -> ApiResult<Json<Vec<AnnotationStatus>>> {
    Ok(Json(state.engine.assign(&req.genes, &user).await?))
}

/// POST /api/statuses/:gene/submit
pub async fn submit(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(gene): Path<String>,
) -> ApiResult<Json<AnnotationStatus>> {
    Ok(Json(state.engine.submit(&gene, &user).await?))
}

/// POST /api/statuses/:gene/approve
pub async fn approve(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(gene): Path<String>,
) -> ApiResult<Json<AnnotationStatus>> {
    Ok(Json(state.engine.approve(&gene, &user).await?))
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

/// POST /api/statuses/:gene/reject
pub async fn reject(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(gene): Path<String>,
    Json(req): Json<RejectRequest>,
) -> ApiResult<Json<AnnotationStatus>> {
    Ok(Json(state.engine.reject(&gene, &user, &req.reason).await?))
}

/// GET /api/annotations/:gene
pub async fn get_annotation(
    State(state): State<AppState>,
    Path(gene): Path<String>,
) -> ApiResult<Json<GeneAnnotation>> {
    Ok(Json(annotations::get_annotation(&state.db, &gene).await?))
}

#[derive(Debug, Serialize)]
pub struct AnnotationWriteResponse {
    pub annotation: GeneAnnotation,
    /// True when the write moved the review back to ONGOING
    pub review_reset: bool,
}

/// PUT /api/annotations/:gene
pub async fn put_annotation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(gene): Path<String>,
    Json(patch): Json<AnnotationPatch>,
) -> ApiResult<Json<AnnotationWriteResponse>> {
    let (annotation, review_reset) = state.engine.edit_annotation(&gene, &patch, &user).await?;
    Ok(Json(AnnotationWriteResponse {
        annotation,
        review_reset,
    }))
}
