//! Annotation status store queries
//!
//! All mutation goes through the Status Transition Engine; this module only
//! maps rows and serves reads.

use genatlas_common::db::{AnnotationStatus, ReviewState};
use genatlas_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

const STATUS_COLUMNS: &str =
    "gene, state, reviewer, created_at, updated_at, validated_at, rejection_reason";

pub fn map_status(row: &SqliteRow) -> Result<AnnotationStatus> {
    let state_str: String = row.get("state");
    Ok(AnnotationStatus {
        gene: row.get("gene"),
        state: ReviewState::parse(&state_str)?,
        reviewer: row.get("reviewer"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        validated_at: row.get("validated_at"),
        rejection_reason: row.get("rejection_reason"),
    })
}

pub async fn get_status(pool: &SqlitePool, gene: &str) -> Result<AnnotationStatus> {
    let sql = format!("SELECT {} FROM annotation_statuses WHERE gene = ?", STATUS_COLUMNS);
    let row = sqlx::query(&sql).bind(gene).fetch_optional(pool).await?;

    match row {
        Some(row) => map_status(&row),
        None => Err(Error::NotFound(format!("no annotation status for gene {}", gene))),
    }
}

/// Typed filter set for the status worklist
#[derive(Debug, Default, Clone)]
pub struct StatusFilter {
    pub state: Option<ReviewState>,
    pub reviewer: Option<String>,
}

pub async fn list_statuses(pool: &SqlitePool, filter: &StatusFilter) -> Result<Vec<AnnotationStatus>> {
    let mut sql = format!("SELECT {} FROM annotation_statuses WHERE 1 = 1", STATUS_COLUMNS);
    if filter.state.is_some() {
        sql.push_str(" AND state = ?");
    }
    if filter.reviewer.is_some() {
        sql.push_str(" AND reviewer = ?");
    }
    // Most recently touched first, untouched (RAW) last
    sql.push_str(" ORDER BY updated_at IS NULL, updated_at DESC, gene");

    let mut query = sqlx::query(&sql);
    if let Some(state) = filter.state {
        query = query.bind(state.as_str());
    }
    if let Some(reviewer) = &filter.reviewer {
        query = query.bind(reviewer);
    }

    let rows = query.fetch_all(pool).await?;
    rows.iter().map(map_status).collect()
}

/// Status row plus owning genome, read on the engine's open transaction
pub async fn fetch_status_with_genome(
    conn: &mut SqliteConnection,
    gene: &str,
) -> Result<(AnnotationStatus, String)> {
    let row = sqlx::query(
        "SELECT s.gene, s.state, s.reviewer, s.created_at, s.updated_at, \
                s.validated_at, s.rejection_reason, g.genome AS owning_genome \
         FROM annotation_statuses s JOIN genes g ON g.name = s.gene \
         WHERE s.gene = ?",
    )
    .bind(gene)
    .fetch_optional(conn)
    .await?;

    match row {
        Some(row) => {
            let genome: String = row.get("owning_genome");
            Ok((map_status(&row)?, genome))
        }
        None => Err(Error::NotFound(format!("no annotation status for gene {}", gene))),
    }
}
