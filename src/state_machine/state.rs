//! State types for the issue delivery lifecycle.
//!
//! This module defines the states an issue can occupy and the identifier
//! newtypes used throughout the engine. Following the principle of "make
//! illegal states unrepresentable", the lifecycle is a closed enum: there
//! is no way to construct a state outside the eight defined here.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Newtype for issue identifiers to prevent mixing with other strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssueId(pub String);

impl fmt::Display for IssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for IssueId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for IssueId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Newtype for run identifiers. One run is one invocation of a stage
/// executor or verdict application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype for caller-supplied request identifiers (correlation ids).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The lifecycle state of an issue.
///
/// `Done` and `Killed` are terminal: once an issue reaches either, no
/// transition ever leaves it. Re-activation requires an explicit new issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueState {
    Created,
    SpecReady,
    Implementing,
    Verified,
    MergeReady,
    Done,
    Hold,
    Killed,
}

impl IssueState {
    /// The wire name of this state (matches the serde representation).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::SpecReady => "SPEC_READY",
            Self::Implementing => "IMPLEMENTING",
            Self::Verified => "VERIFIED",
            Self::MergeReady => "MERGE_READY",
            Self::Done => "DONE",
            Self::Hold => "HOLD",
            Self::Killed => "KILLED",
        }
    }

    /// Parse a wire name back into a state.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CREATED" => Some(Self::Created),
            "SPEC_READY" => Some(Self::SpecReady),
            "IMPLEMENTING" => Some(Self::Implementing),
            "VERIFIED" => Some(Self::Verified),
            "MERGE_READY" => Some(Self::MergeReady),
            "DONE" => Some(Self::Done),
            "HOLD" => Some(Self::Hold),
            "KILLED" => Some(Self::Killed),
            _ => None,
        }
    }
}

impl fmt::Display for IssueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A point-in-time view of an issue, supplied by the persistence layer.
///
/// Stage executors validate preconditions against this snapshot and use its
/// `state` as the expected prior state for the conditional update, so a
/// stale snapshot surfaces as a concurrency conflict rather than a silent
/// overwrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueSnapshot {
    pub id: IssueId,
    pub state: IssueState,
    pub title: String,
    /// External tracking link (e.g. the GitHub issue).
    pub github_link: Option<String>,
    /// Review link (e.g. the pull request under review).
    pub pr_url: Option<String>,
}
