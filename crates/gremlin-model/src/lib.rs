//! Data model shared by the exploration engine and the session manager.
//!
//! Everything here is plain data: action records, invariant violations,
//! derived issues, session results and the exploration configuration.

pub mod action;
pub mod config;
pub mod invariant;
pub mod issue;
pub mod result;

pub use action::{ActionKind, ActionRecord, UnknownActionKind};
pub use config::{
    time_derived_seed, ConfigError, DenyMatchPolicy, ExplorationConfig, Progress,
    ProgressCallback,
};
pub use invariant::{InvariantName, InvariantViolation};
pub use issue::{Issue, Severity, ISSUE_CATEGORY};
pub use result::{SessionResult, StopReason};
