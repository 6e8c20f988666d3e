//! External-job endpoints over the dedup cache
//!
//! `POST /api/tasks/:kind` is get-or-create: a cached result answers with
//! 200 and the payload; anything in flight (or newly started) answers with
//! 202 and an opaque tracking key the caller polls via
//! `GET /api/tasks/:key?kind=`.

use crate::api::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::tasks::cache::{RetrieveOutcome, SubmitOutcome};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use genatlas_common::db::JobKind;
use serde::Deserialize;
use serde_json::{json, Value};

/// POST /api/tasks/:kind
pub async fn submit_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(kind): Path<String>,
    Json(params): Json<Value>,
) -> ApiResult<Response> {
    let kind = JobKind::parse(&kind)
        .map_err(|_| ApiError::BadRequest(format!("unknown job kind: {}", kind)))?;
    if !params.is_object() {
        return Err(ApiError::BadRequest(
            "job parameters must be a JSON object".to_string(),
        ));
    }

    let outcome = state.cache.get_or_create(kind, &params, &user.id).await?;
    Ok(match outcome {
        SubmitOutcome::Completed(result) => (StatusCode::OK, Json(result)).into_response(),
        SubmitOutcome::InFlight { tracking_key } => (
            StatusCode::ACCEPTED,
            Json(json!({"tracking_key": tracking_key, "accepted": false})),
        )
            .into_response(),
        SubmitOutcome::Accepted { tracking_key } => (
            StatusCode::ACCEPTED,
            Json(json!({"tracking_key": tracking_key, "accepted": true})),
        )
            .into_response(),
    })
}

#[derive(Debug, Deserialize)]
pub struct RetrieveQuery {
    pub kind: String,
}

/// GET /api/tasks/:key?kind=
pub async fn retrieve_task(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(key): Path<String>,
    Query(query): Query<RetrieveQuery>,
) -> ApiResult<Response> {
    let kind = JobKind::parse(&query.kind)
        .map_err(|_| ApiError::BadRequest(format!("unknown job kind: {}", query.kind)))?;

    let outcome = state.cache.retrieve(&key, kind).await?;
    Ok(match outcome {
        RetrieveOutcome::Completed(result) => (StatusCode::OK, Json(result)).into_response(),
        RetrieveOutcome::InProgress { state } => (
            StatusCode::ACCEPTED,
            Json(json!({"state": state.as_str()})),
        )
            .into_response(),
    })
}
