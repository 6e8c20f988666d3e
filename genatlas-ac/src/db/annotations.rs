//! Annotation content records
//!
//! Content lives apart from the review status; writing content while the
//! status is PENDING or REJECTED resets the review (handled by the engine,
//! which calls `apply_patch` on its own transaction).

use genatlas_common::db::GeneAnnotation;
use genatlas_common::{Error, Result};
use serde::Deserialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

/// Partial update of annotation content; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnnotationPatch {
    pub strand: Option<i64>,
    pub gene_symbol: Option<String>,
    pub gene_biotype: Option<String>,
    pub transcript_biotype: Option<String>,
    pub description: Option<String>,
}

impl AnnotationPatch {
    pub fn is_empty(&self) -> bool {
        self.strand.is_none()
            && self.gene_symbol.is_none()
            && self.gene_biotype.is_none()
            && self.transcript_biotype.is_none()
            && self.description.is_none()
    }
}

fn map_annotation(row: &SqliteRow) -> GeneAnnotation {
    GeneAnnotation {
        gene: row.get("gene"),
        strand: row.get("strand"),
        gene_symbol: row.get("gene_symbol"),
        gene_biotype: row.get("gene_biotype"),
        transcript_biotype: row.get("transcript_biotype"),
        description: row.get("description"),
        updated_at: row.get("updated_at"),
    }
}

pub async fn get_annotation(pool: &SqlitePool, gene: &str) -> Result<GeneAnnotation> {
    let row = sqlx::query(
        "SELECT gene, strand, gene_symbol, gene_biotype, transcript_biotype, \
                description, updated_at \
         FROM gene_annotations WHERE gene = ?",
    )
    .bind(gene)
    .fetch_optional(pool)
    .await?;

    row.map(|r| map_annotation(&r))
        .ok_or_else(|| Error::NotFound(format!("no annotation for gene {}", gene)))
}

/// Apply a partial content update on the caller's transaction
pub async fn apply_patch(
    conn: &mut SqliteConnection,
    gene: &str,
    patch: &AnnotationPatch,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE gene_annotations SET \
            strand = COALESCE(?, strand), \
            gene_symbol = COALESCE(?, gene_symbol), \
            gene_biotype = COALESCE(?, gene_biotype), \
            transcript_biotype = COALESCE(?, transcript_biotype), \
            description = COALESCE(?, description), \
            updated_at = datetime('now') \
         WHERE gene = ?",
    )
    .bind(patch.strand)
    .bind(&patch.gene_symbol)
    .bind(&patch.gene_biotype)
    .bind(&patch.transcript_biotype)
    .bind(&patch.description)
    .bind(gene)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("no annotation for gene {}", gene)));
    }
    Ok(())
}
