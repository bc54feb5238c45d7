//! The issue delivery state machine.
//!
//! The design separates:
//! - **State table** ([`table`]): static, immutable transition data plus
//!   pure queries.
//! - **Guardrails** ([`guardrail`]): per-edge precondition sets evaluated
//!   against caller-supplied evidence; total, pure validation.
//! - **Verdict mapping** ([`verdict`]): pure `(state, verdict) -> state`.
//! - **Stage execution** ([`executor`]): gated transitions with dry-run
//!   support and optimistic concurrency.
//! - **Run tracking** ([`run`]) and **audit events** ([`event`]): every
//!   invocation is recorded; every state write has a paired event.
//! - **Persistence** ([`repository`]): the trait the engine consumes, with
//!   in-memory and SQLite backends.
//!
//! The service boundary ([`service`]) glues these together and is what
//! HTTP/CLI layers wrap.

pub mod event;
pub mod executor;
pub mod guardrail;
pub mod repository;
pub mod run;
pub mod service;
pub mod state;
pub mod table;
pub mod verdict;

pub use event::{EventType, IssueEvent};
pub use executor::{
    execute_stage, BlockerCode, MergeGate, ReviewGate, Stage, StageParams, StagePayload,
    StepResult,
};
pub use guardrail::{
    attempt_transition, can_perform_action, ensure_not_killed, ensure_not_terminal,
    next_progression, validate_transition, ConditionReport, DiffGateEvidence, GuardrailContext,
    Progression, QaEvidence, SpecEvidence, TransitionAttempt, TransitionCheck,
};
pub use repository::{InMemoryRepository, IssueRepository, RepositoryError, SqliteRepository};
pub use run::{NewRun, RunMode, RunRecord, RunStatus, RunTracker, RunUpdate};
pub use service::{
    apply_verdict, execute_stage_tracked, TrackedStageParams, VerdictApplication,
};
pub use state::{IssueId, IssueSnapshot, IssueState, RequestId, RunId};
pub use verdict::{map_verdict, Verdict, VerdictOutcome};

use std::fmt;

/// Fatal errors from workflow execution.
///
/// Blocked transitions are ordinary return values, never errors; these
/// variants cover invariant violations and lost races only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// An entry point was invoked on a terminal issue. Callers must not
    /// retry without an explicit new unit of work.
    TerminalState { state: IssueState },
    /// The conditional state write affected zero rows: another writer
    /// changed the state concurrently. Retryable after a re-fetch.
    ConcurrentUpdate {
        issue_id: IssueId,
        expected: IssueState,
    },
    /// The issue does not exist.
    IssueNotFound { issue_id: IssueId },
    /// The persistence layer failed.
    Repository(RepositoryError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TerminalState { state } => write!(
                f,
                "issue is in terminal state {state}; re-activation requires an explicit new issue"
            ),
            Self::ConcurrentUpdate { issue_id, expected } => write!(
                f,
                "failed to update issue state for {issue_id}: state is no longer {expected} \
                 (concurrent update)"
            ),
            Self::IssueNotFound { issue_id } => write!(f, "issue {issue_id} not found"),
            Self::Repository(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Repository(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepositoryError> for EngineError {
    fn from(err: RepositoryError) -> Self {
        Self::Repository(err)
    }
}
