//! External job providers (sequence-similarity search, domain scan)
//!
//! Both providers follow the same submit/poll/fetch REST contract. The
//! polling loop is bounded: a fixed interval between status calls and a hard
//! cap on attempts, past which the job surfaces a timeout error. These loops
//! run for minutes and execute only on the worker queue, never on a request
//! task.

use async_trait::async_trait;
use genatlas_common::db::JobKind;
use genatlas_common::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Provider-side job status as reported by the poll endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    Running,
    Finished,
}

/// Bounded-retry polling policy
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

#[async_trait]
pub trait JobProvider: Send + Sync {
    fn kind(&self) -> JobKind;

    /// Submit the job; returns the provider's job id
    async fn submit(&self, params: &Value) -> Result<String>;

    async fn poll_status(&self, job_id: &str) -> Result<ProviderStatus>;

    async fn fetch_result(&self, job_id: &str) -> Result<Value>;
}

/// REST adapter for run/status/result style services (EBI job dispatcher and
/// compatible endpoints)
pub struct RestJobProvider {
    kind: JobKind,
    base_url: String,
    client: reqwest::Client,
}

impl RestJobProvider {
    pub fn new(kind: JobKind, base_url: impl Into<String>) -> Self {
        Self {
            kind,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl JobProvider for RestJobProvider {
    fn kind(&self) -> JobKind {
        self.kind
    }

    async fn submit(&self, params: &Value) -> Result<String> {
        let url = format!("{}/run", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(params)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("{} submit failed: {}", self.kind.as_str(), e)))?
            .error_for_status()
            .map_err(|e| Error::Upstream(format!("{} submit rejected: {}", self.kind.as_str(), e)))?;

        let job_id = response
            .text()
            .await
            .map_err(|e| Error::Upstream(format!("{} submit response unreadable: {}", self.kind.as_str(), e)))?
            .trim()
            .to_string();

        if job_id.is_empty() {
            return Err(Error::Upstream(format!(
                "{} returned an empty job id",
                self.kind.as_str()
            )));
        }
        Ok(job_id)
    }

    async fn poll_status(&self, job_id: &str) -> Result<ProviderStatus> {
        let url = format!("{}/status/{}", self.base_url, job_id);
        let text = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("{} status poll failed: {}", self.kind.as_str(), e)))?
            .error_for_status()
            .map_err(|e| Error::Upstream(format!("{} status poll rejected: {}", self.kind.as_str(), e)))?
            .text()
            .await
            .map_err(|e| Error::Upstream(format!("{} status unreadable: {}", self.kind.as_str(), e)))?;

        if text.trim() == "FINISHED" {
            Ok(ProviderStatus::Finished)
        } else {
            Ok(ProviderStatus::Running)
        }
    }

    async fn fetch_result(&self, job_id: &str) -> Result<Value> {
        let url = format!("{}/result/{}/out", self.base_url, job_id);
        self.client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("{} result fetch failed: {}", self.kind.as_str(), e)))?
            .error_for_status()
            .map_err(|e| Error::Upstream(format!("{} result fetch rejected: {}", self.kind.as_str(), e)))?
            .json::<Value>()
            .await
            .map_err(|e| Error::Upstream(format!("{} result not valid JSON: {}", self.kind.as_str(), e)))
    }
}

/// Drive a provider job to completion under the polling policy
pub async fn run_to_completion(
    provider: &dyn JobProvider,
    params: &Value,
    policy: &PollPolicy,
) -> Result<Value> {
    let job_id = provider.submit(params).await?;
    debug!(kind = provider.kind().as_str(), job_id = %job_id, "Provider job submitted");

    for attempt in 1..=policy.max_attempts {
        tokio::time::sleep(policy.interval).await;
        if provider.poll_status(&job_id).await? == ProviderStatus::Finished {
            debug!(job_id = %job_id, attempt, "Provider job finished");
            return provider.fetch_result(&job_id).await;
        }
    }

    Err(Error::Upstream(format!(
        "{} job {} did not finish within {} polls",
        provider.kind().as_str(),
        job_id,
        policy.max_attempts
    )))
}

/// Registered providers by job kind
pub struct ProviderSet {
    providers: HashMap<JobKind, Arc<dyn JobProvider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    pub fn register(mut self, provider: Arc<dyn JobProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    /// Providers for the two supported job kinds, from configured base URLs
    pub fn from_config(config: &genatlas_common::config::ServiceConfig) -> Self {
        Self::new()
            .register(Arc::new(RestJobProvider::new(
                JobKind::SimilaritySearch,
                config.similarity_search_url.clone(),
            )))
            .register(Arc::new(RestJobProvider::new(
                JobKind::DomainScan,
                config.domain_scan_url.clone(),
            )))
    }

    pub fn get(&self, kind: JobKind) -> Result<Arc<dyn JobProvider>> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or_else(|| Error::Internal(format!("no provider registered for {}", kind.as_str())))
    }
}

impl Default for ProviderSet {
    fn default() -> Self {
        Self::new()
    }
}
