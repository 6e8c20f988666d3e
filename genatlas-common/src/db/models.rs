//! Domain models shared across GeneAtlas services
//!
//! Enums are stored as TEXT in SQLite; `as_str`/`parse` provide the
//! round-trip. Timestamps are SQLite `datetime('now')` strings throughout,
//! so they compare lexicographically.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Closed user role set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Reader,
    Annotator,
    Validator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Reader => "READER",
            Role::Annotator => "ANNOTATOR",
            Role::Validator => "VALIDATOR",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "READER" => Ok(Role::Reader),
            "ANNOTATOR" => Ok(Role::Annotator),
            "VALIDATOR" => Ok(Role::Validator),
            other => Err(Error::Internal(format!("unknown role in database: {}", other))),
        }
    }
}

/// Review workflow state of a gene's annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
    /// Initial, unassigned
    Raw,
    /// Assigned to a reviewer
    Ongoing,
    /// Submitted for validation
    Pending,
    Approved,
    Rejected,
}

impl ReviewState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewState::Raw => "RAW",
            ReviewState::Ongoing => "ONGOING",
            ReviewState::Pending => "PENDING",
            ReviewState::Approved => "APPROVED",
            ReviewState::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "RAW" => Ok(ReviewState::Raw),
            "ONGOING" => Ok(ReviewState::Ongoing),
            "PENDING" => Ok(ReviewState::Pending),
            "APPROVED" => Ok(ReviewState::Approved),
            "REJECTED" => Ok(ReviewState::Rejected),
            other => Err(Error::Internal(format!(
                "unknown review state in database: {}",
                other
            ))),
        }
    }
}

/// Lifecycle state of a cached external job
///
/// Transitions only move forward: PENDING -> RUNNING -> {COMPLETED, FAILED}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::Running => "RUNNING",
            TaskState::Completed => "COMPLETED",
            TaskState::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(TaskState::Pending),
            "RUNNING" => Ok(TaskState::Running),
            "COMPLETED" => Ok(TaskState::Completed),
            "FAILED" => Ok(TaskState::Failed),
            other => Err(Error::Internal(format!(
                "unknown task state in database: {}",
                other
            ))),
        }
    }

    /// True once the job can no longer change state
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

/// Kinds of external bioinformatics jobs the dedup cache tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    SimilaritySearch,
    DomainScan,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::SimilaritySearch => "similarity-search",
            JobKind::DomainScan => "domain-scan",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "similarity-search" => Ok(JobKind::SimilaritySearch),
            "domain-scan" => Ok(JobKind::DomainScan),
            other => Err(Error::Validation(format!("unknown job kind: {}", other))),
        }
    }
}

/// A user as seen by the curation core (identity collaborator owns the rest)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
}

/// Genome record fields the core reads/writes
#[derive(Debug, Clone, Serialize)]
pub struct Genome {
    pub name: String,
    pub species: String,
    /// Derived: true iff every gene of the genome is APPROVED
    pub fully_annotated: bool,
    pub created_at: String,
}

/// Gene record fields the core reads/writes
#[derive(Debug, Clone, Serialize)]
pub struct Gene {
    pub name: String,
    pub genome: String,
    /// Derived: reflects the approved/not-approved axis only
    pub annotated: bool,
    pub created_at: String,
}

/// Review status record, one per gene for the gene's lifetime
#[derive(Debug, Clone, Serialize)]
pub struct AnnotationStatus {
    pub gene: String,
    pub state: ReviewState,
    pub reviewer: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub validated_at: Option<String>,
    pub rejection_reason: Option<String>,
}

/// Curated annotation content attached to a gene
#[derive(Debug, Clone, Serialize)]
pub struct GeneAnnotation {
    pub gene: String,
    pub strand: Option<i64>,
    pub gene_symbol: Option<String>,
    pub gene_biotype: Option<String>,
    pub transcript_biotype: Option<String>,
    pub description: Option<String>,
    pub updated_at: String,
}

/// Cached external-job record keyed by an opaque tracking key
#[derive(Debug, Clone, Serialize)]
pub struct CachedTask {
    pub key: String,
    pub job_kind: JobKind,
    pub params_hash: String,
    pub params: serde_json::Value,
    pub requester: String,
    pub state: TaskState,
    pub external_handle: Option<String>,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}
