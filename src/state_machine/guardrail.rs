//! Guardrail validation for state transitions.
//!
//! A guardrail is a named, ordered set of boolean preconditions gating one
//! specific transition edge. Guardrails are data-driven: a static registry
//! maps `(from, to)` to an ordered slice of condition functions evaluated
//! against a caller-supplied [`GuardrailContext`]. The validator is total —
//! it always returns a [`TransitionCheck`], never an error — so callers can
//! render "all conditions failed" diagnostics uniformly even for malformed
//! context.
//!
//! Transitions into `Hold` or `Killed` are escape hatches: whenever the
//! edge exists in the table they are allowed unconditionally, bypassing
//! any registered guardrail.

use serde::{Deserialize, Serialize};

use super::state::IssueState;
use super::table;
use super::EngineError;

/// Coverage percentage at or above which `coverage_sufficient` passes.
pub const COVERAGE_THRESHOLD: f64 = 70.0;

// =============================================================================
// Evidence supplied by upstream validators
// =============================================================================

/// Specification completeness evidence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecEvidence {
    pub exists: bool,
    pub complete: bool,
    pub requirements_defined: bool,
    pub acceptance_criteria_defined: bool,
}

/// QA result summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QaEvidence {
    pub executed: bool,
    pub passed: bool,
    pub tests_total: u32,
    pub tests_failed: u32,
    /// Coverage percentage, if the QA run produced one. Absent coverage is
    /// "no figure", not zero.
    pub coverage_percent: Option<f64>,
}

/// Diff-gate summary (conflicts, reviews, CI, security).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffGateEvidence {
    pub has_changes: bool,
    pub conflicts_resolved: bool,
    pub reviews_approved: bool,
    pub ci_passing: bool,
    /// Only meaningful when security checks actually ran. `None` means
    /// "not applicable", never "failed".
    pub security_checks_passed: Option<bool>,
}

/// Externally-supplied evidence bag, immutable for the duration of one
/// validation call. The engine never computes or mutates this; it only
/// reads it. Missing sections cause the conditions that need them to fail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardrailContext {
    pub specification: Option<SpecEvidence>,
    pub qa: Option<QaEvidence>,
    pub diff_gate: Option<DiffGateEvidence>,
}

// =============================================================================
// Validation output
// =============================================================================

/// One evaluated condition, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionReport {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

/// Result of a guardrail check. Condition order is the declaration order
/// of the checks for the transition, stable across calls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionCheck {
    pub allowed: bool,
    pub reason: String,
    pub conditions: Vec<ConditionReport>,
    /// One remediation hint per failed condition, in condition order.
    pub suggestions: Vec<String>,
}

/// Validator verdict plus an actionable boolean, for callers that only
/// want "should I do the write".
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionAttempt {
    pub should_transition: bool,
    pub check: TransitionCheck,
}

/// Whether the happy-path successor of a state is currently reachable.
#[derive(Debug, Clone, PartialEq)]
pub struct Progression {
    pub can_progress: bool,
    /// The happy-path successor, if the state has one.
    pub next_state: Option<IssueState>,
    /// Guardrail evaluation for the happy-path edge, if one exists.
    pub validation: Option<TransitionCheck>,
}

// =============================================================================
// Condition registry
// =============================================================================

/// Outcome of evaluating a single condition.
enum ConditionOutcome {
    Pass(String),
    Fail(String),
    /// The condition does not apply to this context and is omitted from
    /// the report entirely (used by the optional security check).
    NotApplicable,
}

/// A named precondition over the guardrail context.
struct GuardrailCondition {
    name: &'static str,
    check: fn(&GuardrailContext) -> ConditionOutcome,
    remediation: &'static str,
}

fn specification_exists(ctx: &GuardrailContext) -> ConditionOutcome {
    match &ctx.specification {
        None => ConditionOutcome::Fail("no specification evidence supplied".to_string()),
        Some(spec) if spec.exists => ConditionOutcome::Pass("specification exists".to_string()),
        Some(_) => ConditionOutcome::Fail("specification does not exist".to_string()),
    }
}

fn specification_complete(ctx: &GuardrailContext) -> ConditionOutcome {
    match &ctx.specification {
        None => ConditionOutcome::Fail("no specification evidence supplied".to_string()),
        Some(spec) if spec.complete => ConditionOutcome::Pass("specification is complete".to_string()),
        Some(_) => ConditionOutcome::Fail("specification is incomplete".to_string()),
    }
}

fn requirements_defined(ctx: &GuardrailContext) -> ConditionOutcome {
    match &ctx.specification {
        None => ConditionOutcome::Fail("no specification evidence supplied".to_string()),
        Some(spec) if spec.requirements_defined => {
            ConditionOutcome::Pass("requirements are defined".to_string())
        }
        Some(_) => ConditionOutcome::Fail("requirements are not defined".to_string()),
    }
}

fn acceptance_criteria_defined(ctx: &GuardrailContext) -> ConditionOutcome {
    match &ctx.specification {
        None => ConditionOutcome::Fail("no specification evidence supplied".to_string()),
        Some(spec) if spec.acceptance_criteria_defined => {
            ConditionOutcome::Pass("acceptance criteria are defined".to_string())
        }
        Some(_) => ConditionOutcome::Fail("acceptance criteria are not defined".to_string()),
    }
}

fn tests_executed(ctx: &GuardrailContext) -> ConditionOutcome {
    match &ctx.qa {
        None => ConditionOutcome::Fail("no QA evidence supplied".to_string()),
        Some(qa) if qa.executed => {
            ConditionOutcome::Pass(format!("{} test(s) executed", qa.tests_total))
        }
        Some(_) => ConditionOutcome::Fail("tests were not executed".to_string()),
    }
}

fn tests_passed(ctx: &GuardrailContext) -> ConditionOutcome {
    match &ctx.qa {
        None => ConditionOutcome::Fail("no QA evidence supplied".to_string()),
        Some(qa) if qa.passed && qa.tests_failed == 0 => {
            ConditionOutcome::Pass("all tests passed".to_string())
        }
        Some(qa) => ConditionOutcome::Fail(format!("{} test(s) failed", qa.tests_failed)),
    }
}

/// Coverage only gates the transition when a figure is present and below
/// threshold. Without a figure, we accept the QA run's own pass/fail word.
fn coverage_sufficient(ctx: &GuardrailContext) -> ConditionOutcome {
    match &ctx.qa {
        None => ConditionOutcome::Fail("no QA evidence supplied".to_string()),
        Some(qa) => match qa.coverage_percent {
            Some(coverage) if coverage >= COVERAGE_THRESHOLD => ConditionOutcome::Pass(format!(
                "coverage {coverage:.1}% meets the {COVERAGE_THRESHOLD:.0}% threshold"
            )),
            Some(coverage) => ConditionOutcome::Fail(format!(
                "coverage {coverage:.1}% is below the {COVERAGE_THRESHOLD:.0}% threshold"
            )),
            None if qa.passed && qa.tests_failed == 0 => {
                ConditionOutcome::Pass("no coverage figure; QA run passed".to_string())
            }
            None => ConditionOutcome::Fail(
                "no coverage figure and the QA run did not pass".to_string(),
            ),
        },
    }
}

fn has_changes(ctx: &GuardrailContext) -> ConditionOutcome {
    match &ctx.diff_gate {
        None => ConditionOutcome::Fail("no diff-gate evidence supplied".to_string()),
        Some(gate) if gate.has_changes => ConditionOutcome::Pass("diff has changes".to_string()),
        Some(_) => ConditionOutcome::Fail("diff is empty".to_string()),
    }
}

fn conflicts_resolved(ctx: &GuardrailContext) -> ConditionOutcome {
    match &ctx.diff_gate {
        None => ConditionOutcome::Fail("no diff-gate evidence supplied".to_string()),
        Some(gate) if gate.conflicts_resolved => {
            ConditionOutcome::Pass("no merge conflicts".to_string())
        }
        Some(_) => ConditionOutcome::Fail("merge conflicts are unresolved".to_string()),
    }
}

fn reviews_approved(ctx: &GuardrailContext) -> ConditionOutcome {
    match &ctx.diff_gate {
        None => ConditionOutcome::Fail("no diff-gate evidence supplied".to_string()),
        Some(gate) if gate.reviews_approved => {
            ConditionOutcome::Pass("reviews approved".to_string())
        }
        Some(_) => ConditionOutcome::Fail("reviews are not approved".to_string()),
    }
}

fn ci_passing(ctx: &GuardrailContext) -> ConditionOutcome {
    match &ctx.diff_gate {
        None => ConditionOutcome::Fail("no diff-gate evidence supplied".to_string()),
        Some(gate) if gate.ci_passing => ConditionOutcome::Pass("CI is passing".to_string()),
        Some(_) => ConditionOutcome::Fail("CI is failing".to_string()),
    }
}

/// Only evaluated when the context explicitly carries a security verdict;
/// absence means "not applicable", not "failed".
fn security_checks_passed(ctx: &GuardrailContext) -> ConditionOutcome {
    match ctx.diff_gate.as_ref().and_then(|g| g.security_checks_passed) {
        None => ConditionOutcome::NotApplicable,
        Some(true) => ConditionOutcome::Pass("security checks passed".to_string()),
        Some(false) => ConditionOutcome::Fail("security checks failed".to_string()),
    }
}

static SPEC_READY_GUARDRAIL: [GuardrailCondition; 4] = [
    GuardrailCondition {
        name: "specification_exists",
        check: specification_exists,
        remediation: "write a specification for this issue",
    },
    GuardrailCondition {
        name: "specification_complete",
        check: specification_complete,
        remediation: "fill in the missing specification sections",
    },
    GuardrailCondition {
        name: "requirements_defined",
        check: requirements_defined,
        remediation: "define the requirements in the specification",
    },
    GuardrailCondition {
        name: "acceptance_criteria_defined",
        check: acceptance_criteria_defined,
        remediation: "define acceptance criteria in the specification",
    },
];

static VERIFIED_GUARDRAIL: [GuardrailCondition; 3] = [
    GuardrailCondition {
        name: "tests_executed",
        check: tests_executed,
        remediation: "run the test suite",
    },
    GuardrailCondition {
        name: "tests_passed",
        check: tests_passed,
        remediation: "fix the failing tests",
    },
    GuardrailCondition {
        name: "coverage_sufficient",
        check: coverage_sufficient,
        remediation: "raise test coverage to at least 70%",
    },
];

static MERGE_READY_GUARDRAIL: [GuardrailCondition; 5] = [
    GuardrailCondition {
        name: "has_changes",
        check: has_changes,
        remediation: "push the implementation changes",
    },
    GuardrailCondition {
        name: "conflicts_resolved",
        check: conflicts_resolved,
        remediation: "rebase and resolve the merge conflicts",
    },
    GuardrailCondition {
        name: "reviews_approved",
        check: reviews_approved,
        remediation: "obtain review approval",
    },
    GuardrailCondition {
        name: "ci_passing",
        check: ci_passing,
        remediation: "fix the failing CI checks",
    },
    GuardrailCondition {
        name: "security_checks_passed",
        check: security_checks_passed,
        remediation: "address the security findings",
    },
];

/// Look up the guardrail for an edge. Most edges have none: for those the
/// table legality check is the whole story.
fn guardrail_for(from: IssueState, to: IssueState) -> Option<&'static [GuardrailCondition]> {
    match (from, to) {
        (IssueState::Created, IssueState::SpecReady) => Some(&SPEC_READY_GUARDRAIL),
        (IssueState::Implementing, IssueState::Verified) => Some(&VERIFIED_GUARDRAIL),
        (IssueState::Verified, IssueState::MergeReady) => Some(&MERGE_READY_GUARDRAIL),
        _ => None,
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Validate one transition against the table and any registered guardrail.
///
/// Total and pure: always returns a [`TransitionCheck`], never an error,
/// regardless of how malformed the context is.
pub fn validate_transition(
    from: IssueState,
    to: IssueState,
    ctx: &GuardrailContext,
) -> TransitionCheck {
    if table::is_terminal(from) {
        return TransitionCheck {
            allowed: false,
            reason: format!("{from} is a terminal state"),
            conditions: vec![ConditionReport {
                name: "terminal_state_check",
                passed: false,
                detail: format!("no transitions are permitted out of {from}"),
            }],
            suggestions: vec![
                "create a new issue; terminal issues are never re-activated implicitly".to_string(),
            ],
        };
    }

    if !table::is_legal(from, to) {
        return TransitionCheck {
            allowed: false,
            reason: "invalid state transition".to_string(),
            conditions: vec![ConditionReport {
                name: "valid_transition",
                passed: false,
                detail: format!("{from} -> {to} is not in the transition table"),
            }],
            suggestions: vec![format!(
                "choose one of the legal transitions out of {from}: {}",
                table::transitions(from)
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )],
        };
    }

    // Escape hatches bypass stage-specific guardrails entirely.
    if to == IssueState::Hold || to == IssueState::Killed {
        return TransitionCheck {
            allowed: true,
            reason: format!("{to} is always reachable from active states"),
            conditions: vec![ConditionReport {
                name: "valid_transition",
                passed: true,
                detail: format!("{from} -> {to} is an escape hatch"),
            }],
            suggestions: vec![],
        };
    }

    let Some(guardrail) = guardrail_for(from, to) else {
        return TransitionCheck {
            allowed: true,
            reason: "no specific guardrails".to_string(),
            conditions: vec![ConditionReport {
                name: "valid_transition",
                passed: true,
                detail: format!("{from} -> {to} is in the transition table"),
            }],
            suggestions: vec![],
        };
    };

    let mut conditions = Vec::with_capacity(guardrail.len());
    let mut suggestions = Vec::new();
    for condition in guardrail {
        let (passed, detail) = match (condition.check)(ctx) {
            ConditionOutcome::Pass(detail) => (true, detail),
            ConditionOutcome::Fail(detail) => (false, detail),
            ConditionOutcome::NotApplicable => continue,
        };
        if !passed {
            suggestions.push(condition.remediation.to_string());
        }
        conditions.push(ConditionReport {
            name: condition.name,
            passed,
            detail,
        });
    }

    let failed = conditions.iter().filter(|c| !c.passed).count();
    let allowed = failed == 0;
    let reason = if allowed {
        format!("all guardrail conditions for {from} -> {to} passed")
    } else {
        format!("{failed} guardrail condition(s) failed for {from} -> {to}")
    };

    TransitionCheck {
        allowed,
        reason,
        conditions,
        suggestions,
    }
}

/// Thin wrapper over [`validate_transition`] exposing the verdict as an
/// actionable boolean.
pub fn attempt_transition(
    from: IssueState,
    to: IssueState,
    ctx: &GuardrailContext,
) -> TransitionAttempt {
    let check = validate_transition(from, to, ctx);
    TransitionAttempt {
        should_transition: check.allowed,
        check,
    }
}

/// Evaluate whether the state's happy-path successor is reachable right now.
///
/// States with no happy path (terminals, `Hold`) report `can_progress =
/// false` with no target and no validation.
pub fn next_progression(state: IssueState, ctx: &GuardrailContext) -> Progression {
    let Some(next) = table::happy_path_successor(state) else {
        return Progression {
            can_progress: false,
            next_state: None,
            validation: None,
        };
    };
    let check = validate_transition(state, next, ctx);
    Progression {
        can_progress: check.allowed,
        next_state: Some(next),
        validation: Some(check),
    }
}

/// Returns false only for terminal states.
pub fn can_perform_action(state: IssueState) -> bool {
    !table::is_terminal(state)
}

/// Fail closed before any side effect: terminal issues never re-enter the
/// workflow. The error names the specific terminal state.
pub fn ensure_not_terminal(state: IssueState) -> Result<(), EngineError> {
    if table::is_terminal(state) {
        return Err(EngineError::TerminalState { state });
    }
    Ok(())
}

/// Like [`ensure_not_terminal`] but only rejects `Killed`, for entry points
/// that are allowed to touch completed issues (e.g. audit queries).
pub fn ensure_not_killed(state: IssueState) -> Result<(), EngineError> {
    if state == IssueState::Killed {
        return Err(EngineError::TerminalState { state });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::table::ALL_STATES;
    use proptest::prelude::*;

    fn passing_spec() -> GuardrailContext {
        GuardrailContext {
            specification: Some(SpecEvidence {
                exists: true,
                complete: true,
                requirements_defined: true,
                acceptance_criteria_defined: true,
            }),
            ..Default::default()
        }
    }

    fn passing_qa(coverage: Option<f64>) -> GuardrailContext {
        GuardrailContext {
            qa: Some(QaEvidence {
                executed: true,
                passed: true,
                tests_total: 42,
                tests_failed: 0,
                coverage_percent: coverage,
            }),
            ..Default::default()
        }
    }

    fn passing_diff_gate(security: Option<bool>) -> GuardrailContext {
        GuardrailContext {
            diff_gate: Some(DiffGateEvidence {
                has_changes: true,
                conflicts_resolved: true,
                reviews_approved: true,
                ci_passing: true,
                security_checks_passed: security,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_terminal_source_is_always_rejected() {
        for terminal in [IssueState::Done, IssueState::Killed] {
            for target in ALL_STATES {
                let check =
                    validate_transition(terminal, target, &GuardrailContext::default());
                assert!(!check.allowed);
                assert_eq!(check.conditions.len(), 1);
                assert_eq!(check.conditions[0].name, "terminal_state_check");
                assert!(check.reason.contains(terminal.as_str()));
            }
        }
    }

    #[test]
    fn test_unknown_edge_is_rejected_with_valid_transition_condition() {
        let ctx = GuardrailContext::default();
        for from in ALL_STATES {
            for to in ALL_STATES {
                if table::is_terminal(from) || table::is_legal(from, to) {
                    continue;
                }
                let check = validate_transition(from, to, &ctx);
                assert!(!check.allowed, "{from} -> {to} should be rejected");
                assert_eq!(check.reason, "invalid state transition");
                assert_eq!(check.conditions[0].name, "valid_transition");
                assert!(!check.conditions[0].passed);
            }
        }
    }

    #[test]
    fn test_escape_hatches_allowed_with_empty_context() {
        let ctx = GuardrailContext::default();
        for from in ALL_STATES {
            if table::is_terminal(from) {
                continue;
            }
            if from != IssueState::Hold {
                assert!(validate_transition(from, IssueState::Hold, &ctx).allowed);
            }
            assert!(validate_transition(from, IssueState::Killed, &ctx).allowed);
        }
    }

    #[test]
    fn test_unregistered_edge_allows_with_no_specific_guardrails() {
        let check = validate_transition(
            IssueState::SpecReady,
            IssueState::Implementing,
            &GuardrailContext::default(),
        );
        assert!(check.allowed);
        assert_eq!(check.reason, "no specific guardrails");
    }

    #[test]
    fn test_spec_ready_guardrail_order_and_suggestions() {
        // Empty context: all four conditions fail, suggestions in order.
        let check = validate_transition(
            IssueState::Created,
            IssueState::SpecReady,
            &GuardrailContext::default(),
        );
        assert!(!check.allowed);
        let names: Vec<_> = check.conditions.iter().map(|c| c.name).collect();
        assert_eq!(
            names,
            vec![
                "specification_exists",
                "specification_complete",
                "requirements_defined",
                "acceptance_criteria_defined",
            ]
        );
        assert_eq!(check.suggestions.len(), 4);
        assert_eq!(check.suggestions[0], "write a specification for this issue");
    }

    #[test]
    fn test_spec_ready_guardrail_passes_with_complete_spec() {
        let check =
            validate_transition(IssueState::Created, IssueState::SpecReady, &passing_spec());
        assert!(check.allowed);
        assert!(check.conditions.iter().all(|c| c.passed));
        assert!(check.suggestions.is_empty());
    }

    #[test]
    fn test_condition_order_is_stable_across_calls() {
        let ctx = GuardrailContext::default();
        let first = validate_transition(IssueState::Created, IssueState::SpecReady, &ctx);
        let second = validate_transition(IssueState::Created, IssueState::SpecReady, &ctx);
        assert_eq!(first, second);
    }

    #[test]
    fn test_coverage_passes_at_exactly_threshold() {
        let check = validate_transition(
            IssueState::Implementing,
            IssueState::Verified,
            &passing_qa(Some(70.0)),
        );
        assert!(check.allowed);
    }

    #[test]
    fn test_coverage_fails_below_threshold() {
        let check = validate_transition(
            IssueState::Implementing,
            IssueState::Verified,
            &passing_qa(Some(69.9)),
        );
        assert!(!check.allowed);
        let coverage = check
            .conditions
            .iter()
            .find(|c| c.name == "coverage_sufficient")
            .unwrap();
        assert!(!coverage.passed);
        assert_eq!(check.suggestions, vec!["raise test coverage to at least 70%"]);
    }

    #[test]
    fn test_missing_coverage_figure_defers_to_qa_verdict() {
        // Passing run with no figure: coverage check does not fire.
        let check = validate_transition(
            IssueState::Implementing,
            IssueState::Verified,
            &passing_qa(None),
        );
        assert!(check.allowed);

        // Failing run with no figure: coverage cannot vouch for it.
        let ctx = GuardrailContext {
            qa: Some(QaEvidence {
                executed: true,
                passed: false,
                tests_total: 10,
                tests_failed: 2,
                coverage_percent: None,
            }),
            ..Default::default()
        };
        let check = validate_transition(IssueState::Implementing, IssueState::Verified, &ctx);
        assert!(!check.allowed);
        let names: Vec<_> = check
            .conditions
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["tests_passed", "coverage_sufficient"]);
    }

    #[test]
    fn test_missing_qa_evidence_fails_all_conditions() {
        let check = validate_transition(
            IssueState::Implementing,
            IssueState::Verified,
            &GuardrailContext::default(),
        );
        assert!(!check.allowed);
        assert_eq!(check.conditions.len(), 3);
        assert!(check.conditions.iter().all(|c| !c.passed));
    }

    #[test]
    fn test_security_check_absent_means_not_applicable() {
        let check = validate_transition(
            IssueState::Verified,
            IssueState::MergeReady,
            &passing_diff_gate(None),
        );
        assert!(check.allowed);
        let names: Vec<_> = check.conditions.iter().map(|c| c.name).collect();
        assert_eq!(
            names,
            vec!["has_changes", "conflicts_resolved", "reviews_approved", "ci_passing"]
        );
    }

    #[test]
    fn test_security_check_fails_only_when_explicitly_false() {
        let check = validate_transition(
            IssueState::Verified,
            IssueState::MergeReady,
            &passing_diff_gate(Some(false)),
        );
        assert!(!check.allowed);
        assert_eq!(
            check.conditions.last().unwrap().name,
            "security_checks_passed"
        );
        assert_eq!(check.suggestions, vec!["address the security findings"]);

        let check = validate_transition(
            IssueState::Verified,
            IssueState::MergeReady,
            &passing_diff_gate(Some(true)),
        );
        assert!(check.allowed);
        assert_eq!(check.conditions.len(), 5);
    }

    #[test]
    fn test_attempt_transition_exposes_actionable_boolean() {
        let attempt = attempt_transition(
            IssueState::Created,
            IssueState::SpecReady,
            &passing_spec(),
        );
        assert!(attempt.should_transition);
        assert!(attempt.check.allowed);
    }

    #[test]
    fn test_next_progression_for_states_without_happy_path() {
        for state in [IssueState::Done, IssueState::Hold, IssueState::Killed] {
            let progression = next_progression(state, &GuardrailContext::default());
            assert!(!progression.can_progress);
            assert_eq!(progression.next_state, None);
            assert!(progression.validation.is_none());
        }
    }

    #[test]
    fn test_next_progression_evaluates_happy_path_guardrail() {
        let progression = next_progression(IssueState::Created, &GuardrailContext::default());
        assert!(!progression.can_progress);
        assert_eq!(progression.next_state, Some(IssueState::SpecReady));
        assert!(!progression.validation.unwrap().allowed);

        let progression = next_progression(IssueState::Created, &passing_spec());
        assert!(progression.can_progress);
        assert_eq!(progression.next_state, Some(IssueState::SpecReady));
    }

    #[test]
    fn test_can_perform_action_false_only_for_terminals() {
        for state in ALL_STATES {
            assert_eq!(can_perform_action(state), !table::is_terminal(state));
        }
    }

    #[test]
    fn test_ensure_not_terminal_names_the_state() {
        let err = ensure_not_terminal(IssueState::Killed).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("KILLED"));
        assert!(message.contains("new issue"));

        assert!(ensure_not_terminal(IssueState::Hold).is_ok());
        assert!(ensure_not_killed(IssueState::Done).is_ok());
        assert!(ensure_not_killed(IssueState::Killed).is_err());
    }

    proptest! {
        /// The validator is total: any state pair with any context produces
        /// a check, and `allowed` implies the edge is in the table.
        #[test]
        fn prop_validator_is_total_and_sound(
            from_idx in 0usize..8,
            to_idx in 0usize..8,
            spec_exists in any::<bool>(),
            qa_passed in any::<bool>(),
            coverage in proptest::option::of(0.0f64..100.0),
        ) {
            let from = ALL_STATES[from_idx];
            let to = ALL_STATES[to_idx];
            let ctx = GuardrailContext {
                specification: Some(SpecEvidence {
                    exists: spec_exists,
                    complete: spec_exists,
                    requirements_defined: spec_exists,
                    acceptance_criteria_defined: spec_exists,
                }),
                qa: Some(QaEvidence {
                    executed: true,
                    passed: qa_passed,
                    tests_total: 10,
                    tests_failed: u32::from(!qa_passed),
                    coverage_percent: coverage,
                }),
                diff_gate: None,
            };
            let check = validate_transition(from, to, &ctx);
            if check.allowed {
                prop_assert!(table::is_legal(from, to));
                prop_assert!(check.suggestions.is_empty());
            }
        }
    }
}
