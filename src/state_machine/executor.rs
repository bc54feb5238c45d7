//! Gated step execution.
//!
//! A stage is one pipeline gate (review gate, merge gate): it names the
//! transition it performs, checks stage-specific preconditions against the
//! caller-supplied issue snapshot, and describes the single audit event an
//! execution appends. The generic [`execute_stage`] drives every stage the
//! same way:
//!
//! 1. fail closed on terminal states, before any side effect;
//! 2. stage preconditions, fail-fast — the first failing precondition
//!    returns a blocked result immediately (unlike the guardrail
//!    validator, which accumulates all conditions);
//! 3. the generic guardrail for the stage's edge;
//! 4. dry-run returns the projected state pair with zero writes and zero
//!    events; execute performs the conditional state write (zero affected
//!    rows is a fatal concurrency conflict) and appends exactly one event.

use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

use super::event::EventType;
use super::guardrail::{ensure_not_terminal, validate_transition, GuardrailContext};
use super::repository::IssueRepository;
use super::run::RunMode;
use super::state::{IssueSnapshot, IssueState, RequestId, RunId};
use super::EngineError;

/// Stable, machine-checkable reason a stage refused to proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockerCode {
    /// The issue has no external tracking link.
    NoGithubLink,
    /// The issue has no review link.
    NoPrLinked,
    /// The issue is not in the state this stage operates on.
    InvariantViolation,
    /// The guardrail for the stage's edge rejected the transition.
    TransitionBlocked,
}

impl BlockerCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoGithubLink => "NO_GITHUB_LINK",
            Self::NoPrLinked => "NO_PR_LINKED",
            Self::InvariantViolation => "INVARIANT_VIOLATION",
            Self::TransitionBlocked => "TRANSITION_BLOCKED",
        }
    }
}

/// A failed precondition: code plus human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blocker {
    pub code: BlockerCode,
    pub message: String,
}

/// Stage-specific payload attached to a successful execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StagePayload {
    /// The review gate recorded its intent; `event_id` is the stored
    /// audit event.
    ReviewIntent { event_id: i64, pr_url: String },
    /// The merge gate recorded completion.
    MergeOutcome { event_id: i64 },
}

/// Outcome of one stage execution. Constructed once per invocation and
/// never mutated after return.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub success: bool,
    pub blocked: bool,
    pub blocker: Option<BlockerCode>,
    pub blocker_message: Option<String>,
    pub state_before: IssueState,
    /// Present for successful (or projected dry-run) executions.
    pub state_after: Option<IssueState>,
    pub duration_ms: i64,
    pub payload: Option<StagePayload>,
}

impl StepResult {
    fn blocked(blocker: Blocker, state_before: IssueState, duration_ms: i64) -> Self {
        Self {
            success: false,
            blocked: true,
            blocker: Some(blocker.code),
            blocker_message: Some(blocker.message),
            state_before,
            state_after: None,
            duration_ms,
            payload: None,
        }
    }

    fn succeeded(
        state_before: IssueState,
        state_after: IssueState,
        payload: Option<StagePayload>,
        duration_ms: i64,
    ) -> Self {
        Self {
            success: true,
            blocked: false,
            blocker: None,
            blocker_message: None,
            state_before,
            state_after: Some(state_after),
            duration_ms,
            payload,
        }
    }
}

/// Parameters for one stage invocation. The snapshot is supplied by the
/// caller; its `state` doubles as the expected prior state for the
/// conditional write, so a stale snapshot loses the race loudly.
#[derive(Debug, Clone)]
pub struct StageParams {
    pub issue: IssueSnapshot,
    pub run_id: RunId,
    pub request_id: RequestId,
    pub mode: RunMode,
    pub context: GuardrailContext,
}

/// One pipeline gate.
pub trait Stage: Send + Sync {
    /// Stable stage name, used in logs and event reasons.
    fn name(&self) -> &'static str;

    /// The state this stage operates on.
    fn expected_state(&self) -> IssueState;

    /// The state a successful execution moves the issue to.
    fn target_state(&self) -> IssueState;

    /// Stage-specific preconditions, checked in order; the first failure
    /// wins.
    fn check_preconditions(&self, issue: &IssueSnapshot) -> Option<Blocker>;

    /// The single audit event an execution appends.
    fn event(&self, issue: &IssueSnapshot) -> EventType;

    /// Payload for the step result, given the stored event's id.
    fn payload(&self, event_id: i64, issue: &IssueSnapshot) -> StagePayload;
}

/// Shared precondition: both gates require the tracking link and the
/// review link before touching the issue, then the expected state.
fn check_linked_artifacts(
    stage: &dyn Stage,
    issue: &IssueSnapshot,
) -> Option<Blocker> {
    if issue.github_link.is_none() {
        return Some(Blocker {
            code: BlockerCode::NoGithubLink,
            message: format!("issue {} has no GitHub tracking link", issue.id),
        });
    }
    if issue.pr_url.is_none() {
        return Some(Blocker {
            code: BlockerCode::NoPrLinked,
            message: format!("issue {} has no pull request linked", issue.id),
        });
    }
    if issue.state != stage.expected_state() {
        return Some(Blocker {
            code: BlockerCode::InvariantViolation,
            message: format!(
                "{} expects {}, but issue {} is {}",
                stage.name(),
                stage.expected_state(),
                issue.id,
                issue.state
            ),
        });
    }
    None
}

/// The review gate: moves a verified issue into `MergeReady` and records
/// the intent to review its pull request.
pub struct ReviewGate;

impl Stage for ReviewGate {
    fn name(&self) -> &'static str {
        "review_gate"
    }

    fn expected_state(&self) -> IssueState {
        IssueState::Verified
    }

    fn target_state(&self) -> IssueState {
        IssueState::MergeReady
    }

    fn check_preconditions(&self, issue: &IssueSnapshot) -> Option<Blocker> {
        check_linked_artifacts(self, issue)
    }

    fn event(&self, issue: &IssueSnapshot) -> EventType {
        EventType::ReviewRequested {
            from: self.expected_state(),
            to: self.target_state(),
            pr_url: issue.pr_url.clone().unwrap_or_default(),
        }
    }

    fn payload(&self, event_id: i64, issue: &IssueSnapshot) -> StagePayload {
        StagePayload::ReviewIntent {
            event_id,
            pr_url: issue.pr_url.clone().unwrap_or_default(),
        }
    }
}

/// The merge gate: completes a merge-ready issue.
pub struct MergeGate;

impl Stage for MergeGate {
    fn name(&self) -> &'static str {
        "merge_gate"
    }

    fn expected_state(&self) -> IssueState {
        IssueState::MergeReady
    }

    fn target_state(&self) -> IssueState {
        IssueState::Done
    }

    fn check_preconditions(&self, issue: &IssueSnapshot) -> Option<Blocker> {
        check_linked_artifacts(self, issue)
    }

    fn event(&self, issue: &IssueSnapshot) -> EventType {
        EventType::MergeRecorded {
            from: self.expected_state(),
            to: self.target_state(),
            pr_url: issue.pr_url.clone().unwrap_or_default(),
        }
    }

    fn payload(&self, event_id: i64, _issue: &IssueSnapshot) -> StagePayload {
        StagePayload::MergeOutcome { event_id }
    }
}

/// Execute one stage. See the module docs for the algorithm.
///
/// Dry-run is a hard invariant: it performs zero persistence writes and
/// zero event appends, for both blocked and successful outcomes.
pub async fn execute_stage(
    repo: &dyn IssueRepository,
    stage: &dyn Stage,
    params: &StageParams,
) -> Result<StepResult, EngineError> {
    let started = Instant::now();
    let issue = &params.issue;

    // Terminal re-entry is a data-integrity error, not a blocked result.
    ensure_not_terminal(issue.state)?;

    if let Some(blocker) = stage.check_preconditions(issue) {
        return Ok(StepResult::blocked(
            blocker,
            issue.state,
            elapsed_ms(started),
        ));
    }

    let check = validate_transition(stage.expected_state(), stage.target_state(), &params.context);
    if !check.allowed {
        return Ok(StepResult::blocked(
            Blocker {
                code: BlockerCode::TransitionBlocked,
                message: check.reason,
            },
            issue.state,
            elapsed_ms(started),
        ));
    }

    let before = issue.state;
    let after = stage.target_state();

    if params.mode == RunMode::DryRun {
        return Ok(StepResult::succeeded(
            before,
            after,
            None,
            elapsed_ms(started),
        ));
    }

    let rows = repo
        .conditional_update_state(&issue.id, before, after)
        .await?;
    if rows == 0 {
        return Err(EngineError::ConcurrentUpdate {
            issue_id: issue.id.clone(),
            expected: before,
        });
    }

    let event = repo
        .append_event(&issue.id, Some(params.run_id), stage.event(issue))
        .await?;

    info!(
        stage = stage.name(),
        issue = %issue.id,
        run = %params.run_id,
        "{before} -> {after}"
    );

    Ok(StepResult::succeeded(
        before,
        after,
        Some(stage.payload(event.id, issue)),
        elapsed_ms(started),
    ))
}

pub(crate) fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}
