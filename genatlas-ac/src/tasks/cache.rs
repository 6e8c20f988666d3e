//! Task deduplication cache
//!
//! Content-addressed record of in-flight and completed external jobs. At
//! most one job is in flight per (kind, canonical parameters); recently
//! completed identical requests are served from the result store. Detected
//! inconsistencies (a COMPLETED record whose result the store no longer
//! holds) are logged and self-healed by discarding the stale record, and the
//! caller simply gets a fresh job.

use crate::tasks::queue::{JobRequest, TaskQueue};
use chrono::Utc;
use genatlas_common::db::{CachedTask, JobKind, TaskState};
use genatlas_common::params::{canonicalize, hash_params};
use genatlas_common::{Error, Result};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of a job submission request
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Cache hit: an identical job completed recently, result served directly
    Completed(Value),
    /// An identical job is already in flight; poll the same tracking key
    InFlight { tracking_key: String },
    /// New job accepted
    Accepted { tracking_key: String },
}

/// Outcome of a successful result lookup
#[derive(Debug)]
pub enum RetrieveOutcome {
    Completed(Value),
    InProgress { state: TaskState },
}

pub struct TaskCache {
    db: SqlitePool,
    queue: Arc<dyn TaskQueue>,
    retention_hours: i64,
}

const TASK_COLUMNS: &str = "key, job_kind, params_hash, params, requester, state, \
                            external_handle, error, created_at, updated_at";

fn map_task(row: &SqliteRow) -> Result<CachedTask> {
    let kind_str: String = row.get("job_kind");
    let state_str: String = row.get("state");
    let params_str: String = row.get("params");
    let params = serde_json::from_str(&params_str)
        .map_err(|e| Error::Internal(format!("stored params are not valid JSON: {}", e)))?;

    Ok(CachedTask {
        key: row.get("key"),
        job_kind: JobKind::parse(&kind_str)?,
        params_hash: row.get("params_hash"),
        params,
        requester: row.get("requester"),
        state: TaskState::parse(&state_str)?,
        external_handle: row.get("external_handle"),
        error: row.get("error"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

impl TaskCache {
    pub fn new(db: SqlitePool, queue: Arc<dyn TaskQueue>, retention_hours: i64) -> Self {
        Self {
            db,
            queue,
            retention_hours,
        }
    }

    /// Submit a job, deduplicating against identical in-flight or recently
    /// completed requests
    pub async fn get_or_create(
        &self,
        kind: JobKind,
        params: &Value,
        requester: &str,
    ) -> Result<SubmitOutcome> {
        let removed = self.sweep_expired().await?;
        if removed > 0 {
            debug!(removed, "Expired cached tasks swept before lookup");
        }

        let params_hash = hash_params(params);

        if let Some(existing) = self.find_by_hash(kind, &params_hash).await? {
            match existing.state {
                TaskState::Completed => {
                    if let Some(handle) = existing.external_handle.as_deref() {
                        if let Some(value) = self.queue.result(handle).await? {
                            debug!(key = %existing.key, "Dedup cache hit");
                            return Ok(SubmitOutcome::Completed(value));
                        }
                    }
                    // Result store purged the payload out-of-band; the
                    // record is stale. Discard and submit fresh.
                    warn!(
                        key = %existing.key,
                        "COMPLETED task lost its stored result, discarding stale record"
                    );
                    self.delete(&existing.key).await?;
                }
                TaskState::Pending | TaskState::Running => {
                    debug!(key = %existing.key, "Identical job already in flight");
                    return Ok(SubmitOutcome::InFlight {
                        tracking_key: existing.key,
                    });
                }
                TaskState::Failed => {
                    debug!(key = %existing.key, "Previous identical job failed, retrying");
                    self.delete(&existing.key).await?;
                }
            }
        }

        let tracking_key = Uuid::new_v4().to_string();
        let inserted = sqlx::query(
            "INSERT INTO cached_tasks (key, job_kind, params_hash, params, requester) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (job_kind, params_hash) DO NOTHING",
        )
        .bind(&tracking_key)
        .bind(kind.as_str())
        .bind(&params_hash)
        .bind(canonicalize(params))
        .bind(requester)
        .execute(&self.db)
        .await?;

        if inserted.rows_affected() == 0 {
            // A concurrent identical submission won the insert race; both
            // callers track the winner's key.
            let winner = self.find_by_hash(kind, &params_hash).await?.ok_or_else(|| {
                Error::Inconsistent("dedup record vanished between insert and lookup".to_string())
            })?;
            return Ok(SubmitOutcome::InFlight {
                tracking_key: winner.key,
            });
        }

        // Enqueue only after the record is durable; compensate on failure so
        // no PENDING record is left without an external handle.
        match self
            .queue
            .enqueue(JobRequest {
                kind,
                params: params.clone(),
            })
            .await
        {
            Ok(handle) => {
                sqlx::query(
                    "UPDATE cached_tasks \
                     SET external_handle = ?, updated_at = datetime('now') \
                     WHERE key = ?",
                )
                .bind(&handle)
                .bind(&tracking_key)
                .execute(&self.db)
                .await?;

                info!(key = %tracking_key, kind = kind.as_str(), "External job enqueued");
                Ok(SubmitOutcome::Accepted { tracking_key })
            }
            Err(e) => {
                warn!(key = %tracking_key, error = %e, "Enqueue failed, rolling back record");
                self.delete(&tracking_key).await?;
                Err(e)
            }
        }
    }

    /// Look up a job by its tracking key
    pub async fn retrieve(
        &self,
        tracking_key: &str,
        expected_kind: JobKind,
    ) -> Result<RetrieveOutcome> {
        let task = self
            .get(tracking_key)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no task for tracking key {}", tracking_key)))?;

        if task.job_kind != expected_kind {
            return Err(Error::Validation(format!(
                "tracking key {} belongs to a {} job",
                tracking_key,
                task.job_kind.as_str()
            )));
        }

        match task.state {
            TaskState::Completed => {
                if let Some(handle) = task.external_handle.as_deref() {
                    if let Some(value) = self.queue.result(handle).await? {
                        return Ok(RetrieveOutcome::Completed(value));
                    }
                }
                warn!(
                    key = %tracking_key,
                    "COMPLETED task lost its stored result, discarding stale record"
                );
                self.delete(tracking_key).await?;
                Err(Error::NotFound(format!(
                    "result for {} expired, submit the job again",
                    tracking_key
                )))
            }
            TaskState::Pending | TaskState::Running => {
                Ok(RetrieveOutcome::InProgress { state: task.state })
            }
            TaskState::Failed => Err(Error::Upstream(
                task.error.unwrap_or_else(|| "job failed".to_string()),
            )),
        }
    }

    /// Delete records whose updated_at fell outside the retention window
    pub async fn sweep_expired(&self) -> Result<u64> {
        let cutoff = (Utc::now() - chrono::Duration::hours(self.retention_hours))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        let result = sqlx::query("DELETE FROM cached_tasks WHERE updated_at < ?")
            .bind(&cutoff)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }

    async fn find_by_hash(&self, kind: JobKind, params_hash: &str) -> Result<Option<CachedTask>> {
        let sql = format!(
            "SELECT {} FROM cached_tasks WHERE job_kind = ? AND params_hash = ?",
            TASK_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(kind.as_str())
            .bind(params_hash)
            .fetch_optional(&self.db)
            .await?;
        row.map(|r| map_task(&r)).transpose()
    }

    async fn get(&self, key: &str) -> Result<Option<CachedTask>> {
        let sql = format!("SELECT {} FROM cached_tasks WHERE key = ?", TASK_COLUMNS);
        let row = sqlx::query(&sql).bind(key).fetch_optional(&self.db).await?;
        row.map(|r| map_task(&r)).transpose()
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM cached_tasks WHERE key = ?")
            .bind(key)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Lifecycle signals from the task queue, keyed by external handle.
// Idempotent and forward-only: the WHERE guards only accept moves along
// PENDING -> RUNNING -> {COMPLETED, FAILED}, so an out-of-order signal
// (a stale on_start after on_success) affects zero rows.
// ---------------------------------------------------------------------------

/// Job started executing
pub async fn on_start(db: &SqlitePool, handle: &str) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE cached_tasks \
         SET state = 'RUNNING', updated_at = datetime('now') \
         WHERE external_handle = ? AND state = 'PENDING'",
    )
    .bind(handle)
    .execute(db)
    .await?;
    Ok(result.rows_affected())
}

/// Job finished and its result was stored
pub async fn on_success(db: &SqlitePool, handle: &str) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE cached_tasks \
         SET state = 'COMPLETED', error = NULL, updated_at = datetime('now') \
         WHERE external_handle = ? AND state IN ('PENDING', 'RUNNING')",
    )
    .bind(handle)
    .execute(db)
    .await?;
    Ok(result.rows_affected())
}

/// Job failed; the message is surfaced on retrieval only
pub async fn on_failure(db: &SqlitePool, handle: &str, error: &str) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE cached_tasks \
         SET state = 'FAILED', error = ?, updated_at = datetime('now') \
         WHERE external_handle = ? AND state IN ('PENDING', 'RUNNING')",
    )
    .bind(error)
    .bind(handle)
    .execute(db)
    .await?;
    Ok(result.rows_affected())
}

/// Periodic expiry sweep, in addition to the sweep at each lookup
pub fn spawn_sweeper(cache: Arc<TaskCache>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match cache.sweep_expired().await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "Periodic sweep removed expired cached tasks"),
                Err(e) => warn!(error = %e, "Periodic sweep failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::queue::FakeQueue;
    use genatlas_common::db::init_database;
    use serde_json::json;

    async fn setup() -> (tempfile::TempDir, TaskCache, Arc<FakeQueue>) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("test.db")).await.unwrap();
        let queue = Arc::new(FakeQueue::new());
        let cache = TaskCache::new(pool, queue.clone(), 24);
        (dir, cache, queue)
    }

    fn blast_params() -> Value {
        json!({"sequence": "ATGCATGC", "database": "nt", "evalue": 0.01})
    }

    async fn task_count(cache: &TaskCache) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM cached_tasks")
            .fetch_one(&cache.db)
            .await
            .unwrap()
    }

    async fn handle_of(cache: &TaskCache, key: &str) -> String {
        sqlx::query_scalar("SELECT external_handle FROM cached_tasks WHERE key = ?")
            .bind(key)
            .fetch_one(&cache.db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_identical_params_share_one_job() {
        let (_dir, cache, queue) = setup().await;

        let first = cache
            .get_or_create(JobKind::SimilaritySearch, &blast_params(), "u1")
            .await
            .unwrap();
        let key1 = match first {
            SubmitOutcome::Accepted { tracking_key } => tracking_key,
            other => panic!("expected Accepted, got {:?}", other),
        };

        // Same parameters in a different key order, different requester
        let reordered = json!({"evalue": 0.01, "database": "nt", "sequence": "ATGCATGC"});
        let second = cache
            .get_or_create(JobKind::SimilaritySearch, &reordered, "u2")
            .await
            .unwrap();
        match second {
            SubmitOutcome::InFlight { tracking_key } => assert_eq!(tracking_key, key1),
            other => panic!("expected InFlight, got {:?}", other),
        }

        assert_eq!(queue.enqueue_count(), 1, "no duplicate job enqueued");
        assert_eq!(task_count(&cache).await, 1);
    }

    #[tokio::test]
    async fn test_different_kind_same_params_is_a_new_job() {
        let (_dir, cache, queue) = setup().await;

        cache
            .get_or_create(JobKind::SimilaritySearch, &blast_params(), "u1")
            .await
            .unwrap();
        let second = cache
            .get_or_create(JobKind::DomainScan, &blast_params(), "u1")
            .await
            .unwrap();

        assert!(matches!(second, SubmitOutcome::Accepted { .. }));
        assert_eq!(queue.enqueue_count(), 2);
    }

    #[tokio::test]
    async fn test_completed_job_served_from_cache() {
        let (_dir, cache, queue) = setup().await;

        let key = match cache
            .get_or_create(JobKind::DomainScan, &blast_params(), "u1")
            .await
            .unwrap()
        {
            SubmitOutcome::Accepted { tracking_key } => tracking_key,
            other => panic!("expected Accepted, got {:?}", other),
        };
        let handle = handle_of(&cache, &key).await;

        on_start(&cache.db, &handle).await.unwrap();
        queue.complete(&handle, json!({"domains": ["PF00001"]}));
        on_success(&cache.db, &handle).await.unwrap();

        match cache
            .get_or_create(JobKind::DomainScan, &blast_params(), "u2")
            .await
            .unwrap()
        {
            SubmitOutcome::Completed(value) => assert_eq!(value["domains"][0], "PF00001"),
            other => panic!("expected Completed, got {:?}", other),
        }
        assert_eq!(queue.enqueue_count(), 1);
    }

    #[tokio::test]
    async fn test_purged_result_self_heals() {
        let (_dir, cache, queue) = setup().await;

        let key = match cache
            .get_or_create(JobKind::DomainScan, &blast_params(), "u1")
            .await
            .unwrap()
        {
            SubmitOutcome::Accepted { tracking_key } => tracking_key,
            other => panic!("expected Accepted, got {:?}", other),
        };
        let handle = handle_of(&cache, &key).await;
        queue.complete(&handle, json!({"domains": []}));
        on_success(&cache.db, &handle).await.unwrap();

        // Result store loses the payload out-of-band
        queue.purge(&handle);

        let outcome = cache
            .get_or_create(JobKind::DomainScan, &blast_params(), "u2")
            .await
            .unwrap();
        let new_key = match outcome {
            SubmitOutcome::Accepted { tracking_key } => tracking_key,
            other => panic!("expected a fresh job, got {:?}", other),
        };
        assert_ne!(new_key, key, "stale record replaced by a fresh one");
        assert_eq!(task_count(&cache).await, 1);
        assert_eq!(queue.enqueue_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_job_is_retried() {
        let (_dir, cache, queue) = setup().await;

        let key = match cache
            .get_or_create(JobKind::DomainScan, &blast_params(), "u1")
            .await
            .unwrap()
        {
            SubmitOutcome::Accepted { tracking_key } => tracking_key,
            other => panic!("expected Accepted, got {:?}", other),
        };
        let handle = handle_of(&cache, &key).await;
        on_failure(&cache.db, &handle, "provider timed out").await.unwrap();

        let outcome = cache
            .get_or_create(JobKind::DomainScan, &blast_params(), "u1")
            .await
            .unwrap();
        assert!(matches!(outcome, SubmitOutcome::Accepted { .. }));
        assert_eq!(queue.enqueue_count(), 2);
    }

    #[tokio::test]
    async fn test_enqueue_failure_leaves_no_orphan() {
        let (_dir, cache, queue) = setup().await;
        queue.set_fail_enqueue(true);

        let err = cache
            .get_or_create(JobKind::DomainScan, &blast_params(), "u1")
            .await;
        assert!(matches!(err, Err(Error::Upstream(_))));
        assert_eq!(task_count(&cache).await, 0, "no PENDING orphan without a handle");
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let (_dir, cache, _queue) = setup().await;

        cache
            .get_or_create(JobKind::DomainScan, &blast_params(), "u1")
            .await
            .unwrap();
        cache
            .get_or_create(JobKind::SimilaritySearch, &blast_params(), "u1")
            .await
            .unwrap();

        // Age one record past the retention window
        sqlx::query(
            "UPDATE cached_tasks SET updated_at = datetime('now', '-25 hours') \
             WHERE job_kind = 'domain-scan'",
        )
        .execute(&cache.db)
        .await
        .unwrap();

        let removed = cache.sweep_expired().await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(task_count(&cache).await, 1);

        let kind: String = sqlx::query_scalar("SELECT job_kind FROM cached_tasks")
            .fetch_one(&cache.db)
            .await
            .unwrap();
        assert_eq!(kind, "similarity-search");
    }

    #[tokio::test]
    async fn test_stale_start_does_not_regress_completed() {
        let (_dir, cache, queue) = setup().await;

        let key = match cache
            .get_or_create(JobKind::DomainScan, &blast_params(), "u1")
            .await
            .unwrap()
        {
            SubmitOutcome::Accepted { tracking_key } => tracking_key,
            other => panic!("expected Accepted, got {:?}", other),
        };
        let handle = handle_of(&cache, &key).await;
        queue.complete(&handle, json!({}));
        on_success(&cache.db, &handle).await.unwrap();

        // Stale start arrives after completion
        let affected = on_start(&cache.db, &handle).await.unwrap();
        assert_eq!(affected, 0);

        let state: String = sqlx::query_scalar("SELECT state FROM cached_tasks WHERE key = ?")
            .bind(&key)
            .fetch_one(&cache.db)
            .await
            .unwrap();
        assert_eq!(state, "COMPLETED");
    }

    #[tokio::test]
    async fn test_signals_are_idempotent() {
        let (_dir, cache, _queue) = setup().await;

        let key = match cache
            .get_or_create(JobKind::DomainScan, &blast_params(), "u1")
            .await
            .unwrap()
        {
            SubmitOutcome::Accepted { tracking_key } => tracking_key,
            other => panic!("expected Accepted, got {:?}", other),
        };
        let handle = handle_of(&cache, &key).await;

        assert_eq!(on_start(&cache.db, &handle).await.unwrap(), 1);
        assert_eq!(on_start(&cache.db, &handle).await.unwrap(), 0);
        assert_eq!(on_failure(&cache.db, &handle, "boom").await.unwrap(), 1);
        assert_eq!(on_failure(&cache.db, &handle, "boom again").await.unwrap(), 0);

        let error: String = sqlx::query_scalar("SELECT error FROM cached_tasks WHERE key = ?")
            .bind(&key)
            .fetch_one(&cache.db)
            .await
            .unwrap();
        assert_eq!(error, "boom");
    }

    #[tokio::test]
    async fn test_retrieve_outcomes() {
        let (_dir, cache, queue) = setup().await;

        // Unknown key
        assert!(matches!(
            cache.retrieve("no-such-key", JobKind::DomainScan).await,
            Err(Error::NotFound(_))
        ));

        let key = match cache
            .get_or_create(JobKind::DomainScan, &blast_params(), "u1")
            .await
            .unwrap()
        {
            SubmitOutcome::Accepted { tracking_key } => tracking_key,
            other => panic!("expected Accepted, got {:?}", other),
        };

        // Kind mismatch is a validation error, not a lookup miss
        assert!(matches!(
            cache.retrieve(&key, JobKind::SimilaritySearch).await,
            Err(Error::Validation(_))
        ));

        // In flight
        assert!(matches!(
            cache.retrieve(&key, JobKind::DomainScan).await.unwrap(),
            RetrieveOutcome::InProgress { state: TaskState::Pending }
        ));

        // Completed
        let handle = handle_of(&cache, &key).await;
        queue.complete(&handle, json!({"domains": ["PF07714"]}));
        on_success(&cache.db, &handle).await.unwrap();
        match cache.retrieve(&key, JobKind::DomainScan).await.unwrap() {
            RetrieveOutcome::Completed(value) => assert_eq!(value["domains"][0], "PF07714"),
            other => panic!("expected Completed, got {:?}", other),
        }

        // Failed carries the stored message
        on_failure(&cache.db, &handle, "ignored, already terminal").await.unwrap();
        sqlx::query("UPDATE cached_tasks SET state = 'FAILED', error = 'scan crashed' WHERE key = ?")
            .bind(&key)
            .execute(&cache.db)
            .await
            .unwrap();
        match cache.retrieve(&key, JobKind::DomainScan).await {
            Err(Error::Upstream(msg)) => assert_eq!(msg, "scan crashed"),
            other => panic!("expected Upstream, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retrieve_purged_result_self_heals() {
        let (_dir, cache, queue) = setup().await;

        let key = match cache
            .get_or_create(JobKind::DomainScan, &blast_params(), "u1")
            .await
            .unwrap()
        {
            SubmitOutcome::Accepted { tracking_key } => tracking_key,
            other => panic!("expected Accepted, got {:?}", other),
        };
        let handle = handle_of(&cache, &key).await;
        queue.complete(&handle, json!({}));
        on_success(&cache.db, &handle).await.unwrap();
        queue.purge(&handle);

        assert!(matches!(
            cache.retrieve(&key, JobKind::DomainScan).await,
            Err(Error::NotFound(_))
        ));
        assert_eq!(task_count(&cache).await, 0, "stale record discarded");
    }
}
