//! Status transition engine
//!
//! Single entry point for every annotation-status mutation. Each transition:
//! 1. checks the role capability table, then object-level rules
//! 2. validates the move against the current state
//! 3. writes the status row and runs the consistency propagator on the same
//!    transaction, under the owning genome's lock
//!
//! A failed guard returns a typed error and leaves state untouched; there is
//! no silent no-op path.

use crate::db::{annotations, annotations::AnnotationPatch, registry, statuses};
use crate::review::propagator;
use crate::review::roles::{self, Operation};
use genatlas_common::db::{AnnotationStatus, Gene, GeneAnnotation, ReviewState, Role, User};
use genatlas_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;

pub struct StatusEngine {
    db: SqlitePool,
    // Serializes status-write + genome recomputation per genome
    genome_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl StatusEngine {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            genome_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn genome_lock(&self, genome: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.genome_locks.lock().await;
            locks
                .entry(genome.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Acquire locks for a set of genomes in sorted order (deadlock-free for
    /// overlapping bulk assignments)
    async fn genome_locks_sorted(&self, genomes: &BTreeSet<String>) -> Vec<OwnedMutexGuard<()>> {
        let mut guards = Vec::with_capacity(genomes.len());
        for genome in genomes {
            guards.push(self.genome_lock(genome).await);
        }
        guards
    }

    /// Register a gene and atomically create its RAW status row, its empty
    /// annotation record, and reset the owning genome's aggregate
    pub async fn create_gene(&self, name: &str, genome: &str) -> Result<Gene> {
        if name.trim().is_empty() {
            return Err(Error::Validation("gene name must not be empty".to_string()));
        }
        registry::get_genome(&self.db, genome).await?;
        if registry::get_gene(&self.db, name).await.is_ok() {
            return Err(Error::Validation(format!("gene {} already exists", name)));
        }

        let _guard = self.genome_lock(genome).await;
        let mut tx = self.db.begin().await?;

        sqlx::query("INSERT INTO genes (name, genome) VALUES (?, ?)")
            .bind(name)
            .bind(genome)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO gene_annotations (gene) VALUES (?)")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        propagator::on_gene_created(&mut tx, name, genome).await?;

        tx.commit().await?;
        info!(gene = %name, genome = %genome, "Gene registered with RAW status");

        registry::get_gene(&self.db, name).await
    }

    /// Assign a batch of genes to a reviewer, all-or-nothing
    ///
    /// Every gene must currently be RAW; otherwise the whole batch is
    /// rejected and nothing is assigned.
    pub async fn assign(&self, genes: &[String], user: &User) -> Result<Vec<AnnotationStatus>> {
        roles::authorize(Operation::Assign, user)?;
        if genes.is_empty() {
            return Err(Error::Validation("no genes provided".to_string()));
        }

        let unique: BTreeSet<String> = genes.iter().cloned().collect();
        let mut genomes = BTreeSet::new();
        for gene in &unique {
            genomes.insert(registry::get_gene_genome(&self.db, gene).await?);
        }

        let _guards = self.genome_locks_sorted(&genomes).await;
        let mut tx = self.db.begin().await?;

        let mut offenders = Vec::new();
        for gene in &unique {
            let (status, _) = statuses::fetch_status_with_genome(&mut tx, gene).await?;
            if status.state != ReviewState::Raw {
                offenders.push(format!("{} ({})", gene, status.state.as_str()));
            }
        }
        if !offenders.is_empty() {
            return Err(Error::InvalidState(format!(
                "assign requires RAW state for the whole batch; not RAW: {}",
                offenders.join(", ")
            )));
        }

        for gene in &unique {
            sqlx::query(
                "UPDATE annotation_statuses \
                 SET state = 'ONGOING', reviewer = ?, updated_at = datetime('now') \
                 WHERE gene = ?",
            )
            .bind(&user.id)
            .bind(gene)
            .execute(&mut *tx)
            .await?;
        }
        for genome in &genomes {
            propagator::recompute_genome(&mut tx, genome).await?;
        }

        tx.commit().await?;
        info!(reviewer = %user.id, count = unique.len(), "Assigned genes for review");

        let mut updated = Vec::with_capacity(unique.len());
        for gene in &unique {
            updated.push(statuses::get_status(&self.db, gene).await?);
        }
        Ok(updated)
    }

    /// Submit an ONGOING gene for validation; assigned reviewer only
    pub async fn submit(&self, gene: &str, user: &User) -> Result<AnnotationStatus> {
        roles::authorize(Operation::Submit, user)?;
        let genome = registry::get_gene_genome(&self.db, gene).await?;

        let _guard = self.genome_lock(&genome).await;
        let mut tx = self.db.begin().await?;

        let (status, _) = statuses::fetch_status_with_genome(&mut tx, gene).await?;
        if status.state != ReviewState::Ongoing {
            return Err(Error::InvalidState(format!(
                "submit requires ONGOING state, gene {} is {}",
                gene,
                status.state.as_str()
            )));
        }
        if status.reviewer.as_deref() != Some(user.id.as_str()) {
            return Err(Error::Forbidden(format!(
                "only the assigned reviewer may submit gene {}",
                gene
            )));
        }

        sqlx::query(
            "UPDATE annotation_statuses \
             SET state = 'PENDING', updated_at = datetime('now') \
             WHERE gene = ?",
        )
        .bind(gene)
        .execute(&mut *tx)
        .await?;
        propagator::on_status_change(&mut tx, gene, &genome, ReviewState::Pending).await?;

        tx.commit().await?;
        info!(gene = %gene, reviewer = %user.id, "Submitted for validation");

        statuses::get_status(&self.db, gene).await
    }

    /// Approve a PENDING or REJECTED gene; validators only, never the
    /// assigned reviewer's own work
    pub async fn approve(&self, gene: &str, user: &User) -> Result<AnnotationStatus> {
        roles::authorize(Operation::Approve, user)?;
        let genome = registry::get_gene_genome(&self.db, gene).await?;

        let _guard = self.genome_lock(&genome).await;
        let mut tx = self.db.begin().await?;

        let (status, _) = statuses::fetch_status_with_genome(&mut tx, gene).await?;
        if !matches!(status.state, ReviewState::Pending | ReviewState::Rejected) {
            return Err(Error::InvalidState(format!(
                "approve requires PENDING or REJECTED state, gene {} is {}",
                gene,
                status.state.as_str()
            )));
        }
        if status.reviewer.as_deref() == Some(user.id.as_str()) {
            return Err(Error::Forbidden(
                "reviewers may not approve their own work".to_string(),
            ));
        }

        sqlx::query(
            "UPDATE annotation_statuses \
             SET state = 'APPROVED', validated_at = datetime('now'), \
                 rejection_reason = NULL, updated_at = datetime('now') \
             WHERE gene = ?",
        )
        .bind(gene)
        .execute(&mut *tx)
        .await?;
        propagator::on_status_change(&mut tx, gene, &genome, ReviewState::Approved).await?;

        tx.commit().await?;
        info!(gene = %gene, validator = %user.id, "Annotation approved");

        statuses::get_status(&self.db, gene).await
    }

    /// Reject a PENDING or APPROVED gene with a non-empty reason
    pub async fn reject(&self, gene: &str, user: &User, reason: &str) -> Result<AnnotationStatus> {
        roles::authorize(Operation::Reject, user)?;
        if reason.trim().is_empty() {
            return Err(Error::Validation(
                "rejection reason must not be empty".to_string(),
            ));
        }
        let genome = registry::get_gene_genome(&self.db, gene).await?;

        let _guard = self.genome_lock(&genome).await;
        let mut tx = self.db.begin().await?;

        let (status, _) = statuses::fetch_status_with_genome(&mut tx, gene).await?;
        if !matches!(status.state, ReviewState::Pending | ReviewState::Approved) {
            return Err(Error::InvalidState(format!(
                "reject requires PENDING or APPROVED state, gene {} is {}",
                gene,
                status.state.as_str()
            )));
        }
        if status.reviewer.as_deref() == Some(user.id.as_str()) {
            return Err(Error::Forbidden(
                "reviewers may not reject their own work".to_string(),
            ));
        }

        sqlx::query(
            "UPDATE annotation_statuses \
             SET state = 'REJECTED', rejection_reason = ?, validated_at = NULL, \
                 updated_at = datetime('now') \
             WHERE gene = ?",
        )
        .bind(reason.trim())
        .bind(gene)
        .execute(&mut *tx)
        .await?;
        propagator::on_status_change(&mut tx, gene, &genome, ReviewState::Rejected).await?;

        tx.commit().await?;
        info!(gene = %gene, validator = %user.id, "Annotation rejected");

        statuses::get_status(&self.db, gene).await
    }

    /// Write annotation content; a write while the status is PENDING or
    /// REJECTED resets the review to ONGOING (the prior judgment is stale).
    ///
    /// Returns the updated content and whether the status was reset.
    pub async fn edit_annotation(
        &self,
        gene: &str,
        patch: &AnnotationPatch,
        user: &User,
    ) -> Result<(GeneAnnotation, bool)> {
        if user.role == Role::Reader {
            return Err(Error::Forbidden(
                "role READER cannot edit annotations".to_string(),
            ));
        }
        if patch.is_empty() {
            return Err(Error::Validation(
                "annotation update carries no fields".to_string(),
            ));
        }
        let genome = registry::get_gene_genome(&self.db, gene).await?;

        let _guard = self.genome_lock(&genome).await;
        let mut tx = self.db.begin().await?;

        let (status, _) = statuses::fetch_status_with_genome(&mut tx, gene).await?;
        // Annotators may only touch their own assignment; validators any
        if user.role == Role::Annotator {
            if let Some(reviewer) = &status.reviewer {
                if reviewer != &user.id {
                    return Err(Error::Forbidden(format!(
                        "gene {} is assigned to another reviewer",
                        gene
                    )));
                }
            }
        }

        annotations::apply_patch(&mut tx, gene, patch).await?;

        let reset = matches!(status.state, ReviewState::Pending | ReviewState::Rejected);
        if reset {
            sqlx::query(
                "UPDATE annotation_statuses \
                 SET state = 'ONGOING', rejection_reason = NULL, validated_at = NULL, \
                     updated_at = datetime('now') \
                 WHERE gene = ?",
            )
            .bind(gene)
            .execute(&mut *tx)
            .await?;
            propagator::on_status_change(&mut tx, gene, &genome, ReviewState::Ongoing).await?;
            info!(gene = %gene, previous = status.state.as_str(), "Content changed, review reset to ONGOING");
        }

        tx.commit().await?;

        let annotation = annotations::get_annotation(&self.db, gene).await?;
        Ok((annotation, reset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genatlas_common::db::init_database;

    async fn setup() -> (tempfile::TempDir, StatusEngine, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("test.db")).await.unwrap();

        for (id, role) in [("ann_a", "ANNOTATOR"), ("ann_b", "ANNOTATOR"), ("val_v", "VALIDATOR"), ("reader_r", "READER")] {
            sqlx::query("INSERT INTO users (id, username, email, role) VALUES (?, ?, ?, ?)")
                .bind(id)
                .bind(id)
                .bind(format!("{}@example.org", id))
                .bind(role)
                .execute(&pool)
                .await
                .unwrap();
        }
        sqlx::query("INSERT INTO genomes (name, species) VALUES ('gm1', 'E. coli')")
            .execute(&pool)
            .await
            .unwrap();

        (dir, StatusEngine::new(pool.clone()), pool)
    }

    fn user(id: &str, role: Role) -> User {
        User {
            id: id.to_string(),
            username: id.to_string(),
            email: format!("{}@example.org", id),
            role,
        }
    }

    fn annotator() -> User {
        user("ann_a", Role::Annotator)
    }

    fn validator() -> User {
        user("val_v", Role::Validator)
    }

    async fn gene_annotated(pool: &SqlitePool, gene: &str) -> bool {
        let v: i64 = sqlx::query_scalar("SELECT annotated FROM genes WHERE name = ?")
            .bind(gene)
            .fetch_one(pool)
            .await
            .unwrap();
        v != 0
    }

    async fn genome_complete(pool: &SqlitePool) -> bool {
        let v: i64 = sqlx::query_scalar("SELECT fully_annotated FROM genomes WHERE name = 'gm1'")
            .fetch_one(pool)
            .await
            .unwrap();
        v != 0
    }

    #[tokio::test]
    async fn test_full_review_scenario() {
        let (_dir, engine, pool) = setup().await;

        // Gene creation produces exactly one RAW status
        engine.create_gene("g1", "gm1").await.unwrap();
        let status = statuses::get_status(&pool, "g1").await.unwrap();
        assert_eq!(status.state, ReviewState::Raw);
        assert!(status.reviewer.is_none());
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM annotation_statuses WHERE gene = 'g1'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 1);

        // assign -> ONGOING with reviewer
        let statuses_out = engine.assign(&["g1".to_string()], &annotator()).await.unwrap();
        assert_eq!(statuses_out[0].state, ReviewState::Ongoing);
        assert_eq!(statuses_out[0].reviewer.as_deref(), Some("ann_a"));

        // submit by the assigned reviewer -> PENDING
        let status = engine.submit("g1", &annotator()).await.unwrap();
        assert_eq!(status.state, ReviewState::Pending);

        // approve by a validator -> APPROVED + both derived flags
        let status = engine.approve("g1", &validator()).await.unwrap();
        assert_eq!(status.state, ReviewState::Approved);
        assert!(status.validated_at.is_some());
        assert!(status.rejection_reason.is_none());
        assert!(gene_annotated(&pool, "g1").await);
        assert!(genome_complete(&pool).await, "single approved gene completes the genome");
    }

    #[tokio::test]
    async fn test_assign_requires_raw() {
        let (_dir, engine, _pool) = setup().await;
        engine.create_gene("g1", "gm1").await.unwrap();
        engine.assign(&["g1".to_string()], &annotator()).await.unwrap();

        let err = engine.assign(&["g1".to_string()], &user("ann_b", Role::Annotator)).await;
        assert!(matches!(err, Err(Error::InvalidState(_))));

        // State unchanged by the failed attempt
        let status = statuses::get_status(&engine.db, "g1").await.unwrap();
        assert_eq!(status.state, ReviewState::Ongoing);
        assert_eq!(status.reviewer.as_deref(), Some("ann_a"));
    }

    #[tokio::test]
    async fn test_bulk_assign_is_all_or_nothing() {
        let (_dir, engine, pool) = setup().await;
        engine.create_gene("g1", "gm1").await.unwrap();
        engine.create_gene("g2", "gm1").await.unwrap();
        engine.assign(&["g1".to_string()], &annotator()).await.unwrap();

        // g1 is no longer RAW, so the whole batch must fail
        let err = engine
            .assign(&["g1".to_string(), "g2".to_string()], &user("ann_b", Role::Annotator))
            .await;
        assert!(matches!(err, Err(Error::InvalidState(_))));

        // g2 untouched by the failed batch
        let status = statuses::get_status(&pool, "g2").await.unwrap();
        assert_eq!(status.state, ReviewState::Raw);
        assert!(status.reviewer.is_none());
    }

    #[tokio::test]
    async fn test_reader_cannot_assign() {
        let (_dir, engine, _pool) = setup().await;
        engine.create_gene("g1", "gm1").await.unwrap();

        let err = engine.assign(&["g1".to_string()], &user("reader_r", Role::Reader)).await;
        assert!(matches!(err, Err(Error::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_submit_requires_assigned_reviewer() {
        let (_dir, engine, _pool) = setup().await;
        engine.create_gene("g1", "gm1").await.unwrap();
        engine.assign(&["g1".to_string()], &annotator()).await.unwrap();

        let err = engine.submit("g1", &user("ann_b", Role::Annotator)).await;
        assert!(matches!(err, Err(Error::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_self_review_is_forbidden() {
        let (_dir, engine, _pool) = setup().await;
        engine.create_gene("g1", "gm1").await.unwrap();

        // A validator assigns themselves and submits their own work
        let val = validator();
        engine.assign(&["g1".to_string()], &val).await.unwrap();
        engine.submit("g1", &val).await.unwrap();

        assert!(matches!(engine.approve("g1", &val).await, Err(Error::Forbidden(_))));
        assert!(matches!(
            engine.reject("g1", &val, "looks wrong").await,
            Err(Error::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_reject_requires_reason() {
        let (_dir, engine, _pool) = setup().await;
        engine.create_gene("g1", "gm1").await.unwrap();
        engine.assign(&["g1".to_string()], &annotator()).await.unwrap();
        engine.submit("g1", &annotator()).await.unwrap();

        let err = engine.reject("g1", &validator(), "   ").await;
        assert!(matches!(err, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_reject_then_reapprove_clears_reason() {
        let (_dir, engine, pool) = setup().await;
        engine.create_gene("g1", "gm1").await.unwrap();
        engine.assign(&["g1".to_string()], &annotator()).await.unwrap();
        engine.submit("g1", &annotator()).await.unwrap();

        let status = engine.reject("g1", &validator(), "missing biotype").await.unwrap();
        assert_eq!(status.state, ReviewState::Rejected);
        assert_eq!(status.rejection_reason.as_deref(), Some("missing biotype"));
        assert!(status.validated_at.is_none());
        assert!(!gene_annotated(&pool, "g1").await);

        // REJECTED is not a dead end: a validator may approve from it
        let status = engine.approve("g1", &validator()).await.unwrap();
        assert_eq!(status.state, ReviewState::Approved);
        assert!(status.rejection_reason.is_none());
        assert!(status.validated_at.is_some());
        assert!(gene_annotated(&pool, "g1").await);
    }

    #[tokio::test]
    async fn test_approve_from_ongoing_is_invalid() {
        let (_dir, engine, _pool) = setup().await;
        engine.create_gene("g1", "gm1").await.unwrap();
        engine.assign(&["g1".to_string()], &annotator()).await.unwrap();

        let err = engine.approve("g1", &validator()).await;
        assert!(matches!(err, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_edit_resets_pending_and_rejected() {
        let (_dir, engine, _pool) = setup().await;
        engine.create_gene("g1", "gm1").await.unwrap();
        engine.assign(&["g1".to_string()], &annotator()).await.unwrap();
        engine.submit("g1", &annotator()).await.unwrap();

        let patch = AnnotationPatch {
            description: Some("updated description".to_string()),
            ..Default::default()
        };

        // PENDING -> edited -> ONGOING
        let (_, reset) = engine.edit_annotation("g1", &patch, &annotator()).await.unwrap();
        assert!(reset);
        let status = statuses::get_status(&engine.db, "g1").await.unwrap();
        assert_eq!(status.state, ReviewState::Ongoing);
        assert!(status.rejection_reason.is_none());
        assert!(status.validated_at.is_none());

        // ONGOING -> edited -> still ONGOING
        let (_, reset) = engine.edit_annotation("g1", &patch, &annotator()).await.unwrap();
        assert!(!reset);

        // REJECTED -> edited -> ONGOING, reason cleared
        engine.submit("g1", &annotator()).await.unwrap();
        engine.reject("g1", &validator(), "wrong strand").await.unwrap();
        let (_, reset) = engine.edit_annotation("g1", &patch, &annotator()).await.unwrap();
        assert!(reset);
        let status = statuses::get_status(&engine.db, "g1").await.unwrap();
        assert_eq!(status.state, ReviewState::Ongoing);
        assert!(status.rejection_reason.is_none());
    }

    #[tokio::test]
    async fn test_genome_aggregate_with_mixed_states() {
        let (_dir, engine, pool) = setup().await;
        engine.create_gene("g1", "gm1").await.unwrap();
        engine.create_gene("g2", "gm1").await.unwrap();

        let ann = annotator();
        let val = validator();
        engine.assign(&["g1".to_string(), "g2".to_string()], &ann).await.unwrap();
        engine.submit("g1", &ann).await.unwrap();
        engine.approve("g1", &val).await.unwrap();

        // g2 still ONGOING, genome not complete
        assert!(!genome_complete(&pool).await);

        engine.submit("g2", &ann).await.unwrap();
        engine.approve("g2", &val).await.unwrap();
        assert!(genome_complete(&pool).await);

        // Rejecting an approved gene reopens the genome
        engine.reject("g2", &val, "re-check coordinates").await.unwrap();
        assert!(!genome_complete(&pool).await);
        assert!(!gene_annotated(&pool, "g2").await);
    }

    #[tokio::test]
    async fn test_unknown_gene_is_not_found() {
        let (_dir, engine, _pool) = setup().await;
        let err = engine.submit("missing", &annotator()).await;
        assert!(matches!(err, Err(Error::NotFound(_))));
    }
}
