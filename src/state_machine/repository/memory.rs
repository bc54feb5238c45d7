//! In-memory implementation of `IssueRepository`.
//!
//! All state is held in memory and lost on drop. Used by tests and by
//! ephemeral deployments that do not need restart safety.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{IssueRepository, RepositoryError};
use crate::state_machine::event::{EventType, IssueEvent};
use crate::state_machine::run::{RunRecord, RunUpdate};
use crate::state_machine::state::{IssueId, IssueSnapshot, IssueState, RunId};

/// Append-only event log with a monotonically increasing id counter.
struct EventLog {
    next_id: i64,
    events: Vec<IssueEvent>,
}

/// In-memory issue repository.
///
/// Issues and runs live in `HashMap`s behind `RwLock`s; the event log is a
/// single vector in insertion order. The conditional update takes the
/// write lock for its whole compare-and-set, which gives the same
/// exactly-one-winner behavior the SQLite backend gets from a conditional
/// `UPDATE`.
pub struct InMemoryRepository {
    issues: RwLock<HashMap<IssueId, IssueSnapshot>>,
    events: RwLock<EventLog>,
    runs: RwLock<HashMap<RunId, RunRecord>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            issues: RwLock::new(HashMap::new()),
            events: RwLock::new(EventLog {
                next_id: 1,
                events: Vec::new(),
            }),
            runs: RwLock::new(HashMap::new()),
        }
    }

    /// Total number of stored events, across all issues. Test helper.
    pub async fn event_count(&self) -> usize {
        self.events.read().await.events.len()
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IssueRepository for InMemoryRepository {
    async fn get_issue(&self, id: &IssueId) -> Result<Option<IssueSnapshot>, RepositoryError> {
        let issues = self.issues.read().await;
        Ok(issues.get(id).cloned())
    }

    async fn put_issue(&self, issue: IssueSnapshot) -> Result<(), RepositoryError> {
        let mut issues = self.issues.write().await;
        issues.insert(issue.id.clone(), issue);
        Ok(())
    }

    async fn conditional_update_state(
        &self,
        id: &IssueId,
        expected: IssueState,
        new: IssueState,
    ) -> Result<u64, RepositoryError> {
        let mut issues = self.issues.write().await;
        match issues.get_mut(id) {
            Some(issue) if issue.state == expected => {
                issue.state = new;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn append_event(
        &self,
        issue_id: &IssueId,
        run_id: Option<RunId>,
        event_type: EventType,
    ) -> Result<IssueEvent, RepositoryError> {
        let mut log = self.events.write().await;
        let event = IssueEvent {
            id: log.next_id,
            issue_id: issue_id.clone(),
            run_id,
            event_type,
            occurred_at: Utc::now(),
        };
        log.next_id += 1;
        log.events.push(event.clone());
        Ok(event)
    }

    async fn events_for_issue(&self, id: &IssueId) -> Result<Vec<IssueEvent>, RepositoryError> {
        let log = self.events.read().await;
        Ok(log
            .events
            .iter()
            .filter(|e| &e.issue_id == id)
            .cloned()
            .collect())
    }

    async fn create_run(&self, run: RunRecord) -> Result<(), RepositoryError> {
        let mut runs = self.runs.write().await;
        runs.insert(run.id, run);
        Ok(())
    }

    async fn update_run(&self, id: RunId, update: RunUpdate) -> Result<(), RepositoryError> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::storage("update_run", format!("unknown run {id}")))?;
        run.status = update.status;
        if update.completed_at.is_some() {
            run.completed_at = update.completed_at;
        }
        if update.duration_ms.is_some() {
            run.duration_ms = update.duration_ms;
        }
        if let Some(metadata) = update.metadata {
            run.metadata = metadata;
        }
        Ok(())
    }

    async fn get_run(&self, id: RunId) -> Result<Option<RunRecord>, RepositoryError> {
        let runs = self.runs.read().await;
        Ok(runs.get(&id).cloned())
    }

    async fn recent_runs(
        &self,
        issue_id: &IssueId,
        limit: usize,
    ) -> Result<Vec<RunRecord>, RepositoryError> {
        let runs = self.runs.read().await;
        let mut matching: Vec<_> = runs
            .values()
            .filter(|r| &r.issue_id == issue_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        matching.truncate(limit);
        Ok(matching)
    }
}
