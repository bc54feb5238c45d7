//! Service boundary for workflow execution.
//!
//! These functions own the side effects the pure core refuses to perform:
//! they load issues, apply the verdict mapper, write state through the
//! conditional update, append audit events, and bracket stage executions
//! with run tracking. HTTP and CLI layers wrap these calls directly.

use serde_json::json;
use std::time::Instant;
use tracing::{info, warn};

use super::executor::{elapsed_ms, execute_stage, Stage, StageParams, StepResult};
use super::event::EventType;
use super::guardrail::{ensure_not_terminal, GuardrailContext};
use super::repository::IssueRepository;
use super::run::{NewRun, RunMode, RunRecord, RunTracker, RunUpdate};
use super::state::{IssueId, IssueSnapshot, IssueState, RequestId};
use super::verdict::{map_verdict, Verdict};
use super::EngineError;

/// Outcome of applying a verdict to an issue.
#[derive(Debug, Clone, PartialEq)]
pub struct VerdictApplication {
    pub issue_id: IssueId,
    pub old_state: IssueState,
    pub new_state: IssueState,
    pub state_changed: bool,
    /// Id of the `verdict_set` event, recorded on every application.
    pub verdict_event_id: i64,
    /// Id of the `state_changed` event, recorded only when the state
    /// actually changed.
    pub state_event_id: Option<i64>,
}

/// Apply a verdict to an issue.
///
/// Always appends a `verdict_set` event. Only when the mapped state
/// differs from the current state does it perform the conditional state
/// write (zero affected rows is a fatal concurrency conflict) and append a
/// `state_changed` event with reason `verdict:<VERDICT>`. Applying a
/// no-op verdict is therefore cheap and idempotent: one event, zero
/// writes.
///
/// Terminal issues are rejected before any side effect; re-activation
/// requires an explicit new issue.
pub async fn apply_verdict(
    repo: &dyn IssueRepository,
    issue_id: &IssueId,
    verdict: Verdict,
    run_id: Option<super::state::RunId>,
) -> Result<VerdictApplication, EngineError> {
    let issue = repo
        .get_issue(issue_id)
        .await?
        .ok_or_else(|| EngineError::IssueNotFound {
            issue_id: issue_id.clone(),
        })?;

    ensure_not_terminal(issue.state)?;

    let outcome = map_verdict(issue.state, verdict);

    let verdict_event = repo
        .append_event(
            issue_id,
            run_id,
            EventType::VerdictSet {
                verdict,
                state: issue.state,
            },
        )
        .await?;

    if !outcome.changed {
        info!(issue = %issue_id, %verdict, state = %issue.state, "verdict recorded, no change");
        return Ok(VerdictApplication {
            issue_id: issue_id.clone(),
            old_state: issue.state,
            new_state: outcome.new_state,
            state_changed: false,
            verdict_event_id: verdict_event.id,
            state_event_id: None,
        });
    }

    let rows = repo
        .conditional_update_state(issue_id, issue.state, outcome.new_state)
        .await?;
    if rows == 0 {
        return Err(EngineError::ConcurrentUpdate {
            issue_id: issue_id.clone(),
            expected: issue.state,
        });
    }

    let state_event = repo
        .append_event(
            issue_id,
            run_id,
            EventType::StateChanged {
                old_state: issue.state,
                new_state: outcome.new_state,
                reason: format!("verdict:{verdict}"),
            },
        )
        .await?;

    info!(
        issue = %issue_id,
        %verdict,
        "{} -> {}",
        issue.state,
        outcome.new_state
    );

    Ok(VerdictApplication {
        issue_id: issue_id.clone(),
        old_state: issue.state,
        new_state: outcome.new_state,
        state_changed: true,
        verdict_event_id: verdict_event.id,
        state_event_id: Some(state_event.id),
    })
}

/// Parameters for a run-tracked stage execution.
#[derive(Debug, Clone)]
pub struct TrackedStageParams {
    pub issue: IssueSnapshot,
    pub actor: String,
    pub request_id: RequestId,
    pub mode: RunMode,
    pub context: GuardrailContext,
}

/// Execute a stage with run bracketing.
///
/// Creates a pending run, marks it running, executes the stage, and marks
/// the run completed (with `metadata.blocked` when the stage refused to
/// proceed — a blocked evaluation is a successful run, not a failure) or
/// failed (with the error message) before re-raising the error.
pub async fn execute_stage_tracked(
    repo: &dyn IssueRepository,
    stage: &dyn Stage,
    params: TrackedStageParams,
) -> Result<(RunRecord, StepResult), EngineError> {
    let tracker = RunTracker::new(repo);
    let run = tracker
        .create_run(NewRun {
            issue_id: params.issue.id.clone(),
            actor: params.actor,
            request_id: params.request_id.clone(),
            mode: params.mode,
        })
        .await?;
    tracker
        .update_run_status(run.id, RunUpdate::running())
        .await?;

    let stage_params = StageParams {
        issue: params.issue,
        run_id: run.id,
        request_id: params.request_id,
        mode: params.mode,
        context: params.context,
    };

    let started = Instant::now();
    match execute_stage(repo, stage, &stage_params).await {
        Ok(result) => {
            let metadata = json!({
                "stage": stage.name(),
                "mode": params.mode.as_str(),
                "blocked": result.blocked,
                "blocker": result.blocker.map(|b| b.as_str()),
                "state_before": result.state_before,
                "state_after": result.state_after,
            });
            tracker
                .update_run_status(run.id, RunUpdate::completed(result.duration_ms, metadata))
                .await?;
            Ok((run, result))
        }
        Err(err) => {
            let metadata = json!({
                "stage": stage.name(),
                "mode": params.mode.as_str(),
                "error": err.to_string(),
            });
            if let Err(update_err) = tracker
                .update_run_status(run.id, RunUpdate::failed(elapsed_ms(started), metadata))
                .await
            {
                warn!(run = %run.id, "failed to record run failure: {update_err}");
            }
            Err(err)
        }
    }
}
