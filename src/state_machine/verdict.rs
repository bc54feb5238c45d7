//! Verdict mapping.
//!
//! A verdict is an external judgement (human or automation) on an issue:
//! GREEN (good), RED (bad), or HOLD (pause). The mapper is a pure function
//! from `(current state, verdict)` to a target state; it never touches
//! persistence or events. The service layer owns the side effects (see
//! `service::apply_verdict`).

use serde::{Deserialize, Serialize};
use std::fmt;

use super::state::IssueState;

/// External verdict on an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Green,
    Red,
    Hold,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Green => "GREEN",
            Self::Red => "RED",
            Self::Hold => "HOLD",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of mapping a verdict onto the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerdictOutcome {
    pub new_state: IssueState,
    pub changed: bool,
}

/// Map a verdict onto the current state. Pure and total.
///
/// - GREEN recognizes exactly two source states: `Implementing -> Verified`
///   and `Verified -> Done`. Everywhere else it is a no-op; GREEN never
///   forces progression from a state it does not recognize.
/// - RED sends any state to `Hold`, unconditionally.
/// - HOLD (the verdict) sends any state to `Hold`; idempotent if already
///   held.
pub fn map_verdict(current: IssueState, verdict: Verdict) -> VerdictOutcome {
    let new_state = match verdict {
        Verdict::Green => match current {
            IssueState::Implementing => IssueState::Verified,
            IssueState::Verified => IssueState::Done,
            other => other,
        },
        Verdict::Red | Verdict::Hold => IssueState::Hold,
    };
    VerdictOutcome {
        new_state,
        changed: new_state != current,
    }
}
