//! Task queue seam
//!
//! The dedup cache never executes jobs; it talks to a `TaskQueue`. In
//! production that is `WorkerQueue`, which spawns the job body onto the
//! tokio runtime, drives the provider with bounded polling, stores the
//! payload into the `task_results` store and fires the lifecycle signals.
//! Tests inject `FakeQueue` instead.

use crate::tasks::cache;
use crate::tasks::providers::{self, PollPolicy, ProviderSet};
use async_trait::async_trait;
use genatlas_common::db::JobKind;
use genatlas_common::{Error, Result};
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// A unit of external work to execute
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub kind: JobKind,
    pub params: Value,
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Start background execution; returns the queue handle
    async fn enqueue(&self, job: JobRequest) -> Result<String>;

    /// Fetch a finished job's payload from the result store, if still present
    async fn result(&self, handle: &str) -> Result<Option<Value>>;
}

/// In-process worker queue over the tokio runtime
pub struct WorkerQueue {
    db: SqlitePool,
    providers: Arc<ProviderSet>,
    policy: PollPolicy,
}

impl WorkerQueue {
    pub fn new(db: SqlitePool, providers: Arc<ProviderSet>, policy: PollPolicy) -> Self {
        Self {
            db,
            providers,
            policy,
        }
    }
}

#[async_trait]
impl TaskQueue for WorkerQueue {
    async fn enqueue(&self, job: JobRequest) -> Result<String> {
        // Unknown kinds fail the submission synchronously
        let provider = self.providers.get(job.kind)?;
        let handle = Uuid::new_v4().to_string();

        let db = self.db.clone();
        let policy = self.policy;
        let spawned_handle = handle.clone();
        tokio::spawn(async move {
            run_job(db, provider, policy, spawned_handle, job.params).await;
        });

        Ok(handle)
    }

    async fn result(&self, handle: &str) -> Result<Option<Value>> {
        let payload: Option<String> =
            sqlx::query_scalar("SELECT payload FROM task_results WHERE handle = ?")
                .bind(handle)
                .fetch_optional(&self.db)
                .await?;

        match payload {
            Some(text) => {
                let value = serde_json::from_str(&text)
                    .map_err(|e| Error::Internal(format!("stored result is not valid JSON: {}", e)))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

/// Job body: signal start, drive the provider, store the result, signal the
/// outcome. Runs entirely on the worker pool.
async fn run_job(
    db: SqlitePool,
    provider: Arc<dyn providers::JobProvider>,
    policy: PollPolicy,
    handle: String,
    params: Value,
) {
    // The tracking record's handle is written just after enqueue returns;
    // retry briefly so the RUNNING transition lands. If it never does, the
    // forward-only guards still let PENDING move straight to a terminal
    // state.
    for _ in 0..20 {
        match cache::on_start(&db, &handle).await {
            Ok(0) => tokio::time::sleep(Duration::from_millis(50)).await,
            Ok(_) => break,
            Err(e) => {
                warn!(handle = %handle, error = %e, "on_start signal failed");
                break;
            }
        }
    }

    match providers::run_to_completion(provider.as_ref(), &params, &policy).await {
        Ok(value) => {
            let stored = store_result(&db, &handle, &value).await;
            let outcome = match stored {
                Ok(()) => cache::on_success(&db, &handle).await,
                Err(e) => cache::on_failure(&db, &handle, &e.to_string()).await,
            };
            if let Err(e) = outcome {
                warn!(handle = %handle, error = %e, "completion signal failed");
            } else {
                debug!(handle = %handle, "Job completed");
            }
        }
        Err(e) => {
            if let Err(sig_err) = cache::on_failure(&db, &handle, &e.to_string()).await {
                warn!(handle = %handle, error = %sig_err, "failure signal failed");
            }
            debug!(handle = %handle, error = %e, "Job failed");
        }
    }
}

async fn store_result(db: &SqlitePool, handle: &str, value: &Value) -> Result<()> {
    let payload = serde_json::to_string(value)
        .map_err(|e| Error::Internal(format!("result not serializable: {}", e)))?;
    sqlx::query("INSERT OR REPLACE INTO task_results (handle, payload) VALUES (?, ?)")
        .bind(handle)
        .bind(payload)
        .execute(db)
        .await?;
    Ok(())
}

/// In-memory queue double: records enqueues, never executes anything.
/// Tests drive the lifecycle signals and result store by hand.
pub struct FakeQueue {
    enqueued: Mutex<Vec<JobRequest>>,
    results: Mutex<HashMap<String, Value>>,
    fail_enqueue: AtomicBool,
    counter: AtomicU64,
}

impl FakeQueue {
    pub fn new() -> Self {
        Self {
            enqueued: Mutex::new(Vec::new()),
            results: Mutex::new(HashMap::new()),
            fail_enqueue: AtomicBool::new(false),
            counter: AtomicU64::new(0),
        }
    }

    pub fn enqueue_count(&self) -> usize {
        self.enqueued.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn set_fail_enqueue(&self, fail: bool) {
        self.fail_enqueue.store(fail, Ordering::SeqCst);
    }

    /// Place a payload in the fake result store
    pub fn complete(&self, handle: &str, value: Value) {
        if let Ok(mut results) = self.results.lock() {
            results.insert(handle.to_string(), value);
        }
    }

    /// Simulate the result store purging a payload out-of-band
    pub fn purge(&self, handle: &str) {
        if let Ok(mut results) = self.results.lock() {
            results.remove(handle);
        }
    }
}

impl Default for FakeQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQueue for FakeQueue {
    async fn enqueue(&self, job: JobRequest) -> Result<String> {
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(Error::Upstream("task queue unavailable".to_string()));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut enqueued) = self.enqueued.lock() {
            enqueued.push(job);
        }
        Ok(format!("fake-{}", n))
    }

    async fn result(&self, handle: &str) -> Result<Option<Value>> {
        Ok(self
            .results
            .lock()
            .ok()
            .and_then(|results| results.get(handle).cloned()))
    }
}
