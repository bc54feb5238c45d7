//! The static transition table.
//!
//! This is pure data plus a handful of pure queries; nothing here performs
//! I/O or holds mutable state, so the table needs no synchronization. The
//! ordered edge lists are the single source of truth for which transitions
//! are legal; guardrails further restrict individual edges but never add
//! new ones.
//!
//! Shape of the table:
//! - the five delivery states chain forward (`Created -> SpecReady ->
//!   Implementing -> Verified -> MergeReady -> Done`), with `Verified ->
//!   Done` as a shortcut taken when a GREEN verdict completes verification;
//! - backward edges allow rework without leaving the normal path;
//! - `Hold` and `Killed` are escape hatches reachable from every active
//!   state, and `Hold` can resume to any non-terminal delivery state;
//! - `Done` and `Killed` are sinks.

use super::state::IssueState;

/// All states, in lifecycle order. Useful for exhaustive checks.
pub const ALL_STATES: [IssueState; 8] = [
    IssueState::Created,
    IssueState::SpecReady,
    IssueState::Implementing,
    IssueState::Verified,
    IssueState::MergeReady,
    IssueState::Done,
    IssueState::Hold,
    IssueState::Killed,
];

/// Legal transitions out of a state, in declaration order.
///
/// The first entry for each active state is its happy-path successor;
/// see [`happy_path_successor`] for the explicit mapping.
pub fn transitions(state: IssueState) -> &'static [IssueState] {
    match state {
        IssueState::Created => &[IssueState::SpecReady, IssueState::Hold, IssueState::Killed],
        IssueState::SpecReady => &[
            IssueState::Implementing,
            IssueState::Created,
            IssueState::Hold,
            IssueState::Killed,
        ],
        IssueState::Implementing => &[
            IssueState::Verified,
            IssueState::SpecReady,
            IssueState::Hold,
            IssueState::Killed,
        ],
        IssueState::Verified => &[
            IssueState::MergeReady,
            IssueState::Done,
            IssueState::Implementing,
            IssueState::Hold,
            IssueState::Killed,
        ],
        IssueState::MergeReady => &[
            IssueState::Done,
            IssueState::Implementing,
            IssueState::Hold,
            IssueState::Killed,
        ],
        IssueState::Hold => &[
            IssueState::Created,
            IssueState::SpecReady,
            IssueState::Implementing,
            IssueState::Verified,
            IssueState::MergeReady,
            IssueState::Killed,
        ],
        IssueState::Done | IssueState::Killed => &[],
    }
}

/// Returns true if `to` is a legal transition out of `from`.
pub fn is_legal(from: IssueState, to: IssueState) -> bool {
    transitions(from).contains(&to)
}

/// Returns true if the state has no outgoing transitions, ever.
pub fn is_terminal(state: IssueState) -> bool {
    matches!(state, IssueState::Done | IssueState::Killed)
}

/// Returns true if the state can still receive a workflow run.
///
/// Active = every non-terminal state except `Hold` (held issues must be
/// resumed before the pipeline touches them again).
pub fn is_active(state: IssueState) -> bool {
    !is_terminal(state) && state != IssueState::Hold
}

/// The single canonical forward successor used for "what's next"
/// progression suggestions.
///
/// This is explicit metadata rather than being inferred from the edge
/// lists, so adding a second non-escape-hatch edge to a state cannot
/// silently change progression behavior. Terminal states and `Hold` have
/// no happy path.
pub fn happy_path_successor(state: IssueState) -> Option<IssueState> {
    match state {
        IssueState::Created => Some(IssueState::SpecReady),
        IssueState::SpecReady => Some(IssueState::Implementing),
        IssueState::Implementing => Some(IssueState::Verified),
        IssueState::Verified => Some(IssueState::MergeReady),
        IssueState::MergeReady => Some(IssueState::Done),
        IssueState::Done | IssueState::Hold | IssueState::Killed => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_have_no_outgoing_edges() {
        for state in ALL_STATES {
            if is_terminal(state) {
                assert!(
                    transitions(state).is_empty(),
                    "{state} is terminal but has outgoing edges"
                );
            }
        }
    }

    #[test]
    fn test_every_non_terminal_state_has_an_outgoing_edge() {
        for state in ALL_STATES {
            if !is_terminal(state) {
                assert!(
                    !transitions(state).is_empty(),
                    "{state} is non-terminal but has no outgoing edges"
                );
            }
        }
    }

    /// Closure property: every target referenced in the table is itself a
    /// state the table answers for. This is trivially true with a closed
    /// enum, but the test documents the invariant against future edits.
    #[test]
    fn test_table_is_closed_over_targets() {
        for state in ALL_STATES {
            for &target in transitions(state) {
                assert!(ALL_STATES.contains(&target));
            }
        }
    }

    #[test]
    fn test_hold_reachable_from_every_active_state() {
        for state in ALL_STATES {
            if !is_terminal(state) && state != IssueState::Hold {
                assert!(
                    is_legal(state, IssueState::Hold),
                    "HOLD should be reachable from {state}"
                );
            }
        }
    }

    #[test]
    fn test_killed_reachable_from_every_non_terminal_state() {
        for state in ALL_STATES {
            if !is_terminal(state) {
                assert!(
                    is_legal(state, IssueState::Killed),
                    "KILLED should be reachable from {state}"
                );
            }
        }
    }

    #[test]
    fn test_hold_resumes_to_delivery_states_only() {
        let resumable: Vec<_> = transitions(IssueState::Hold)
            .iter()
            .filter(|&&s| s != IssueState::Killed)
            .copied()
            .collect();
        assert_eq!(
            resumable,
            vec![
                IssueState::Created,
                IssueState::SpecReady,
                IssueState::Implementing,
                IssueState::Verified,
                IssueState::MergeReady,
            ]
        );
        // Not to itself, not directly to terminal states.
        assert!(!is_legal(IssueState::Hold, IssueState::Hold));
        assert!(!is_legal(IssueState::Hold, IssueState::Done));
    }

    #[test]
    fn test_happy_path_edges_are_legal() {
        for state in ALL_STATES {
            if let Some(next) = happy_path_successor(state) {
                assert!(
                    is_legal(state, next),
                    "happy path {state} -> {next} is not in the table"
                );
            }
        }
    }

    #[test]
    fn test_happy_path_walks_to_done() {
        let mut state = IssueState::Created;
        let mut hops = 0;
        while let Some(next) = happy_path_successor(state) {
            state = next;
            hops += 1;
            assert!(hops <= ALL_STATES.len(), "happy path cycles");
        }
        assert_eq!(state, IssueState::Done);
    }

    #[test]
    fn test_is_active_excludes_hold_and_terminals() {
        assert!(is_active(IssueState::Created));
        assert!(is_active(IssueState::MergeReady));
        assert!(!is_active(IssueState::Hold));
        assert!(!is_active(IssueState::Done));
        assert!(!is_active(IssueState::Killed));
    }
}
