//! Append-only audit events.
//!
//! Every state write has a paired event, and verdict applications record
//! an event even when nothing changes, so replaying the per-issue event
//! log reconstructs history without consulting mutable state. Events are
//! immutable once written; the repository contract has no update or delete
//! operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{IssueId, IssueState, RunId};
use super::verdict::Verdict;

/// Typed event payload. Each variant is complete and self-describing:
/// no implicit enrichment happens on write or read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventType {
    /// A verdict was applied to the issue. Recorded on every verdict
    /// application, whether or not the state changed.
    VerdictSet {
        verdict: Verdict,
        /// The issue state at the time the verdict was applied.
        state: IssueState,
    },
    /// The issue's state changed.
    StateChanged {
        old_state: IssueState,
        new_state: IssueState,
        /// Machine-readable cause, e.g. `verdict:GREEN` or `stage:merge_gate`.
        reason: String,
    },
    /// The review gate transitioned the issue and a review is now expected.
    ReviewRequested {
        from: IssueState,
        to: IssueState,
        pr_url: String,
    },
    /// The merge gate completed the issue.
    MergeRecorded {
        from: IssueState,
        to: IssueState,
        pr_url: String,
    },
}

impl EventType {
    /// Stable name for the `event_type` column, kept separate from the
    /// JSON payload for easier querying.
    pub fn name(&self) -> &'static str {
        match self {
            Self::VerdictSet { .. } => "verdict_set",
            Self::StateChanged { .. } => "state_changed",
            Self::ReviewRequested { .. } => "review_requested",
            Self::MergeRecorded { .. } => "merge_recorded",
        }
    }
}

/// One stored event. `id` is assigned by the event store and defines the
/// per-issue ordering (insertion order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueEvent {
    pub id: i64,
    pub issue_id: IssueId,
    pub run_id: Option<RunId>,
    pub event_type: EventType,
    pub occurred_at: DateTime<Utc>,
}
