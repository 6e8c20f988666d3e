//! Gene/Genome registry access
//!
//! The registry owns gene and genome records; the curation core only reads
//! them and maintains the two derived flags. `set_gene_annotated` and
//! `set_genome_fully_annotated` take a transaction connection because only
//! the Consistency Propagator is permitted to call them, always inside the
//! transaction of the triggering status write.

use genatlas_common::db::{Gene, Genome};
use genatlas_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

fn map_genome(row: &SqliteRow) -> Genome {
    Genome {
        name: row.get("name"),
        species: row.get("species"),
        fully_annotated: row.get::<i64, _>("fully_annotated") != 0,
        created_at: row.get("created_at"),
    }
}

fn map_gene(row: &SqliteRow) -> Gene {
    Gene {
        name: row.get("name"),
        genome: row.get("genome"),
        annotated: row.get::<i64, _>("annotated") != 0,
        created_at: row.get("created_at"),
    }
}

/// Register a new genome. A newly created genome is never fully annotated.
pub async fn create_genome(pool: &SqlitePool, name: &str, species: &str) -> Result<Genome> {
    if name.trim().is_empty() {
        return Err(Error::Validation("genome name must not be empty".to_string()));
    }

    let existing: Option<i64> = sqlx::query_scalar("SELECT 1 FROM genomes WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Err(Error::Validation(format!("genome {} already exists", name)));
    }

    sqlx::query("INSERT INTO genomes (name, species) VALUES (?, ?)")
        .bind(name)
        .bind(species)
        .execute(pool)
        .await?;

    get_genome(pool, name).await
}

pub async fn get_genome(pool: &SqlitePool, name: &str) -> Result<Genome> {
    let row = sqlx::query(
        "SELECT name, species, fully_annotated, created_at FROM genomes WHERE name = ?",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    row.map(|r| map_genome(&r))
        .ok_or_else(|| Error::NotFound(format!("genome {} not found", name)))
}

pub async fn get_gene(pool: &SqlitePool, name: &str) -> Result<Gene> {
    let row = sqlx::query("SELECT name, genome, annotated, created_at FROM genes WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;

    row.map(|r| map_gene(&r))
        .ok_or_else(|| Error::NotFound(format!("gene {} not found", name)))
}

/// Owning genome of a gene, or NotFound
pub async fn get_gene_genome(pool: &SqlitePool, gene: &str) -> Result<String> {
    let genome: Option<String> = sqlx::query_scalar("SELECT genome FROM genes WHERE name = ?")
        .bind(gene)
        .fetch_optional(pool)
        .await?;

    genome.ok_or_else(|| Error::NotFound(format!("gene {} not found", gene)))
}

pub async fn get_genome_genes(pool: &SqlitePool, genome: &str) -> Result<Vec<Gene>> {
    // Distinguish "no genes" from "no such genome"
    get_genome(pool, genome).await?;

    let rows = sqlx::query(
        "SELECT name, genome, annotated, created_at FROM genes WHERE genome = ? ORDER BY name",
    )
    .bind(genome)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(map_gene).collect())
}

/// Derived-flag write, propagator only
pub async fn set_gene_annotated(
    conn: &mut SqliteConnection,
    name: &str,
    annotated: bool,
) -> Result<()> {
    sqlx::query("UPDATE genes SET annotated = ?, updated_at = datetime('now') WHERE name = ?")
        .bind(annotated as i64)
        .bind(name)
        .execute(conn)
        .await?;
    Ok(())
}

/// Derived-flag write, propagator only
pub async fn set_genome_fully_annotated(
    conn: &mut SqliteConnection,
    name: &str,
    fully_annotated: bool,
) -> Result<()> {
    sqlx::query(
        "UPDATE genomes SET fully_annotated = ?, updated_at = datetime('now') WHERE name = ?",
    )
    .bind(fully_annotated as i64)
    .bind(name)
    .execute(conn)
    .await?;
    Ok(())
}
