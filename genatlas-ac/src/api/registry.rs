//! Genome/gene registry endpoints
//!
//! Reads are open to any caller; registrations require a curator role
//! (READER is rejected). Gene creation goes through the transition engine so
//! the RAW status row and the genome aggregate reset happen atomically.

use crate::api::CurrentUser;
use crate::db::registry;
use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use genatlas_common::db::{Gene, Genome, Role};
use genatlas_common::Error;
use serde::Deserialize;

fn require_curator(role: Role, what: &str) -> ApiResult<()> {
    if role == Role::Reader {
        return Err(ApiError::Core(Error::Forbidden(format!(
            "role READER cannot {}",
            what
        ))));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct CreateGenomeRequest {
    pub name: String,
    #[serde(default)]
    pub species: String,
}

/// POST /api/genomes
pub async fn create_genome(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<CreateGenomeRequest>,
) -> ApiResult<(StatusCode, Json<Genome>)> {
    require_curator(user.role, "register genomes")?;
    let genome = registry::create_genome(&state.db, &req.name, &req.species).await?;
    Ok((StatusCode::CREATED, Json(genome)))
}

/// GET /api/genomes/:name
pub async fn get_genome(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Genome>> {
    Ok(Json(registry::get_genome(&state.db, &name).await?))
}

/// GET /api/genomes/:name/genes
pub async fn list_genome_genes(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Vec<Gene>>> {
    Ok(Json(registry::get_genome_genes(&state.db, &name).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateGeneRequest {
    pub name: String,
    pub genome: String,
}

/// POST /api/genes
pub async fn create_gene(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<CreateGeneRequest>,
) -> ApiResult<(StatusCode, Json<Gene>)> {
    require_curator(user.role, "register genes")?;
    let gene = state.engine.create_gene(&req.name, &req.genome).await?;
    Ok((StatusCode::CREATED, Json(gene)))
}

/// GET /api/genes/:name
pub async fn get_gene(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Gene>> {
    Ok(Json(registry::get_gene(&state.db, &name).await?))
}
