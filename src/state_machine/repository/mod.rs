//! Repository abstraction for issue, event, and run persistence.
//!
//! The engine consumes this trait rather than a concrete database: the
//! persistence layer is the sole arbiter of ordering between concurrent
//! executions. The one non-obvious contract is `conditional_update_state`,
//! which must only write when the stored state equals the expected state
//! and must report the number of rows it touched — the optimistic
//! concurrency check in the executor depends on that row count.
//!
//! Two backends are provided: [`InMemoryRepository`] (ephemeral, for tests
//! and short-lived deployments) and [`SqliteRepository`] (durable).

mod memory;
mod sqlite;

pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;

use async_trait::async_trait;
use std::fmt;

use super::event::{EventType, IssueEvent};
use super::run::{RunRecord, RunUpdate};
use super::state::{IssueId, IssueSnapshot, IssueState, RunId};

/// Errors from the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The storage backend failed (I/O, SQL, task join).
    Storage { operation: String, message: String },
    /// Stored data could not be decoded.
    Corruption { what: String },
}

impl RepositoryError {
    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn corruption(what: impl Into<String>) -> Self {
        Self::Corruption { what: what.into() }
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage { operation, message } => {
                write!(f, "storage error during {operation}: {message}")
            }
            Self::Corruption { what } => write!(f, "corrupted data: {what}"),
        }
    }
}

impl std::error::Error for RepositoryError {}

/// Persistence contract consumed by the engine.
///
/// Event methods are append-only by construction: there is no way to
/// update or delete a stored event through this trait.
#[async_trait]
pub trait IssueRepository: Send + Sync {
    /// Fetch a point-in-time snapshot of an issue.
    async fn get_issue(&self, id: &IssueId) -> Result<Option<IssueSnapshot>, RepositoryError>;

    /// Insert or replace an issue (upsert semantics).
    async fn put_issue(&self, issue: IssueSnapshot) -> Result<(), RepositoryError>;

    /// Write `new` only if the stored state still equals `expected`,
    /// returning the number of rows affected (0 or 1). Two racing writers
    /// produce exactly one winner; the loser observes 0.
    async fn conditional_update_state(
        &self,
        id: &IssueId,
        expected: IssueState,
        new: IssueState,
    ) -> Result<u64, RepositoryError>;

    /// Append one event to the issue's log, returning the stored event
    /// with its assigned id.
    async fn append_event(
        &self,
        issue_id: &IssueId,
        run_id: Option<RunId>,
        event_type: EventType,
    ) -> Result<IssueEvent, RepositoryError>;

    /// All events for an issue, in insertion order.
    async fn events_for_issue(&self, id: &IssueId) -> Result<Vec<IssueEvent>, RepositoryError>;

    /// Insert a new run record.
    async fn create_run(&self, run: RunRecord) -> Result<(), RepositoryError>;

    /// Apply a status update to an existing run.
    async fn update_run(&self, id: RunId, update: RunUpdate) -> Result<(), RepositoryError>;

    /// Fetch a run by id.
    async fn get_run(&self, id: RunId) -> Result<Option<RunRecord>, RepositoryError>;

    /// Most recent runs for an issue, newest first.
    async fn recent_runs(
        &self,
        issue_id: &IssueId,
        limit: usize,
    ) -> Result<Vec<RunRecord>, RepositoryError>;
}
