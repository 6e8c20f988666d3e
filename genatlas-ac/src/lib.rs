//! genatlas-ac library - Annotation Curation service
//!
//! Collaborative review of gene annotations (assign/submit/approve/reject
//! with derived per-gene and per-genome completeness flags) plus a
//! deduplicating cache in front of long-running external bioinformatics
//! jobs.

use axum::routing::{get, post};
use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod db;
pub mod error;
pub mod review;
pub mod tasks;

use review::StatusEngine;
use tasks::queue::TaskQueue;
use tasks::TaskCache;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub engine: Arc<StatusEngine>,
    pub cache: Arc<TaskCache>,
}

impl AppState {
    pub fn new(db: SqlitePool, queue: Arc<dyn TaskQueue>, task_retention_hours: i64) -> Self {
        Self {
            engine: Arc::new(StatusEngine::new(db.clone())),
            cache: Arc::new(TaskCache::new(db.clone(), queue, task_retention_hours)),
            db,
        }
    }
}

/// Build the application router
///
/// `/health` is open; everything under `/api` that mutates state resolves
/// the caller via the `X-User-Id` header.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/genomes", post(api::registry::create_genome))
        .route("/api/genomes/:name", get(api::registry::get_genome))
        .route("/api/genomes/:name/genes", get(api::registry::list_genome_genes))
        .route("/api/genes", post(api::registry::create_gene))
        .route("/api/genes/:name", get(api::registry::get_gene))
        .route("/api/statuses", get(api::review::list_statuses))
        .route("/api/statuses/assign", post(api::review::assign))
        .route("/api/statuses/:gene", get(api::review::get_status))
        .route("/api/statuses/:gene/submit", post(api::review::submit))
        .route("/api/statuses/:gene/approve", post(api::review::approve))
        .route("/api/statuses/:gene/reject", post(api::review::reject))
        .route(
            "/api/annotations/:gene",
            get(api::review::get_annotation).put(api::review::put_annotation),
        )
        // One segment serves both directions: POST treats it as the job
        // kind, GET as the tracking key.
        .route(
            "/api/tasks/:id",
            post(api::tasks::submit_task).get(api::tasks::retrieve_task),
        );

    Router::new()
        .merge(api)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
