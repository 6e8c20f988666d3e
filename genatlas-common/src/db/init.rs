//! Database initialization
//!
//! Creates the database on first run and brings the schema up idempotently
//! (`CREATE TABLE IF NOT EXISTS` only; no destructive migrations).

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL allows concurrent readers with one writer; the review engine and
    // the worker queue write from different tasks.
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_users_table(&pool).await?;
    create_genomes_table(&pool).await?;
    create_genes_table(&pool).await?;
    create_annotation_statuses_table(&pool).await?;
    create_gene_annotations_table(&pool).await?;
    create_cached_tasks_table(&pool).await?;
    create_task_results_table(&pool).await?;

    Ok(pool)
}

/// Identity collaborator's user records (id, role) as the core consumes them
async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            role TEXT NOT NULL DEFAULT 'READER',
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_genomes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS genomes (
            name TEXT PRIMARY KEY,
            species TEXT NOT NULL DEFAULT '',
            fully_annotated INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_genes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS genes (
            name TEXT PRIMARY KEY,
            genome TEXT NOT NULL REFERENCES genomes(name) ON DELETE CASCADE,
            annotated INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_genes_genome ON genes(genome)")
        .execute(pool)
        .await?;
    Ok(())
}

/// One row per gene; created with the gene, never deleted while it exists
async fn create_annotation_statuses_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS annotation_statuses (
            gene TEXT PRIMARY KEY REFERENCES genes(name) ON DELETE CASCADE,
            state TEXT NOT NULL DEFAULT 'RAW',
            reviewer TEXT REFERENCES users(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT,
            validated_at TEXT,
            rejection_reason TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_statuses_reviewer ON annotation_statuses(reviewer)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_statuses_state ON annotation_statuses(state)")
        .execute(pool)
        .await?;
    Ok(())
}

async fn create_gene_annotations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS gene_annotations (
            gene TEXT PRIMARY KEY REFERENCES genes(name) ON DELETE CASCADE,
            strand INTEGER,
            gene_symbol TEXT,
            gene_biotype TEXT,
            transcript_biotype TEXT,
            description TEXT,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Content-addressed record of in-flight/completed external jobs
///
/// The unique (job_kind, params_hash) index is what resolves two concurrent
/// submissions of identical parameters to a single record.
async fn create_cached_tasks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cached_tasks (
            key TEXT PRIMARY KEY,
            job_kind TEXT NOT NULL,
            params_hash TEXT NOT NULL,
            params TEXT NOT NULL,
            requester TEXT NOT NULL,
            state TEXT NOT NULL DEFAULT 'PENDING',
            external_handle TEXT UNIQUE,
            error TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_cached_tasks_dedup \
         ON cached_tasks(job_kind, params_hash)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Result store for finished job payloads; may be purged out-of-band,
/// which the cache detects and self-heals.
async fn create_task_results_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_results (
            handle TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
