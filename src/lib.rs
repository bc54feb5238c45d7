//! Conveyor: a state-machine engine for autonomous issue delivery.
//!
//! Each unit of work ("issue") moves through a fixed lifecycle
//! (specification -> implementation -> verification -> merge -> done)
//! under machine control. The engine decides whether a transition is
//! permitted (guardrails), maps external verdicts onto the lifecycle,
//! executes gated pipeline stages with dry-run support, and records an
//! append-only audit trail of everything it does.
//!
//! The surrounding plumbing (HTTP routing, GitHub side effects, UI) is
//! out of scope: callers supply a persistence handle, guardrail evidence,
//! and issue snapshots, and wrap the call shapes exposed here.

pub mod config;
pub mod state_machine;

pub use config::Config;
pub use state_machine::{EngineError, IssueId, IssueSnapshot, IssueState};
