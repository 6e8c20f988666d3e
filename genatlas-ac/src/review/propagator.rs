//! Consistency propagator
//!
//! After any annotation-status write the derived flags are re-derived so
//! they remain exact functions of the current status records:
//! - `genes.annotated` reflects the approved/not-approved axis only
//! - `genomes.fully_annotated` is recomputed from the full distinct set of
//!   states across the genome's genes, never incrementally patched
//!
//! All functions run on the caller's open transaction; the engine holds the
//! per-genome lock and commits status write and propagation together, so a
//! failure here aborts the status change as well.

use crate::db::registry;
use genatlas_common::db::ReviewState;
use genatlas_common::Result;
use sqlx::SqliteConnection;
use tracing::debug;

/// Re-derive both flags after a status transition
pub async fn on_status_change(
    conn: &mut SqliteConnection,
    gene: &str,
    genome: &str,
    new_state: ReviewState,
) -> Result<()> {
    apply_gene_flag(conn, gene, new_state).await?;
    recompute_genome(conn, genome).await?;
    Ok(())
}

/// APPROVED sets the gene flag, REJECTED clears it, anything else leaves it
pub async fn apply_gene_flag(
    conn: &mut SqliteConnection,
    gene: &str,
    new_state: ReviewState,
) -> Result<()> {
    match new_state {
        ReviewState::Approved => registry::set_gene_annotated(conn, gene, true).await,
        ReviewState::Rejected => registry::set_gene_annotated(conn, gene, false).await,
        _ => Ok(()),
    }
}

/// Full recomputation of the genome aggregate
///
/// Fully annotated iff the distinct set of states across the genome's genes
/// is exactly {APPROVED}. A genome with no genes is not fully annotated.
pub async fn recompute_genome(conn: &mut SqliteConnection, genome: &str) -> Result<bool> {
    let states: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT s.state \
         FROM annotation_statuses s JOIN genes g ON g.name = s.gene \
         WHERE g.genome = ?",
    )
    .bind(genome)
    .fetch_all(&mut *conn)
    .await?;

    let fully = states.len() == 1 && states[0] == ReviewState::Approved.as_str();
    registry::set_genome_fully_annotated(conn, genome, fully).await?;

    debug!(genome = %genome, fully_annotated = fully, "Recomputed genome aggregate");
    Ok(fully)
}

/// Gene creation hook: create the single RAW status row and mark the owning
/// genome incomplete (a newly-grown genome is never complete by default)
pub async fn on_gene_created(
    conn: &mut SqliteConnection,
    gene: &str,
    genome: &str,
) -> Result<()> {
    sqlx::query("INSERT INTO annotation_statuses (gene) VALUES (?)")
        .bind(gene)
        .execute(&mut *conn)
        .await?;

    registry::set_genome_fully_annotated(conn, genome, false).await?;
    Ok(())
}
