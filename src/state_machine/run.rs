//! Run tracking.
//!
//! A run records one execution attempt of a workflow entry point: who asked
//! for it, in which mode, and how it ended. Runs are owned exclusively by
//! the tracker; other components receive copies, never mutable access.
//!
//! Status lifecycle is `Pending -> Running -> {Completed | Failed}`. A
//! blocked-but-successfully-evaluated invocation completes with
//! `metadata.blocked = true`; blocked is not failed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::repository::{IssueRepository, RepositoryError};
use super::state::{IssueId, RequestId, RunId};

/// Evaluation mode for a workflow invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Read and validate only; zero persistence writes, zero events.
    DryRun,
    /// Perform the state write and emit audit events.
    Execute,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DryRun => "dry_run",
            Self::Execute => "execute",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "dry_run" => Some(Self::DryRun),
            "execute" => Some(Self::Execute),
            _ => None,
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub issue_id: IssueId,
    pub actor: String,
    pub request_id: RequestId,
    pub mode: RunMode,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub metadata: serde_json::Value,
}

/// Parameters for creating a run.
#[derive(Debug, Clone)]
pub struct NewRun {
    pub issue_id: IssueId,
    pub actor: String,
    pub request_id: RequestId,
    pub mode: RunMode,
}

/// A status update applied to an existing run.
#[derive(Debug, Clone)]
pub struct RunUpdate {
    pub status: RunStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

impl RunUpdate {
    pub fn running() -> Self {
        Self {
            status: RunStatus::Running,
            completed_at: None,
            duration_ms: None,
            metadata: None,
        }
    }

    pub fn completed(duration_ms: i64, metadata: serde_json::Value) -> Self {
        Self {
            status: RunStatus::Completed,
            completed_at: Some(Utc::now()),
            duration_ms: Some(duration_ms),
            metadata: Some(metadata),
        }
    }

    pub fn failed(duration_ms: i64, metadata: serde_json::Value) -> Self {
        Self {
            status: RunStatus::Failed,
            completed_at: Some(Utc::now()),
            duration_ms: Some(duration_ms),
            metadata: Some(metadata),
        }
    }
}

/// Tracker over the repository's run store.
pub struct RunTracker<'a> {
    repo: &'a dyn IssueRepository,
}

impl<'a> RunTracker<'a> {
    pub fn new(repo: &'a dyn IssueRepository) -> Self {
        Self { repo }
    }

    /// Create a pending run.
    pub async fn create_run(&self, new: NewRun) -> Result<RunRecord, RepositoryError> {
        let run = RunRecord {
            id: RunId::new(),
            issue_id: new.issue_id,
            actor: new.actor,
            request_id: new.request_id,
            mode: new.mode,
            status: RunStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            metadata: serde_json::Value::Null,
        };
        self.repo.create_run(run.clone()).await?;
        Ok(run)
    }

    /// Apply a status update to a run.
    pub async fn update_run_status(
        &self,
        id: RunId,
        update: RunUpdate,
    ) -> Result<(), RepositoryError> {
        self.repo.update_run(id, update).await
    }
}
