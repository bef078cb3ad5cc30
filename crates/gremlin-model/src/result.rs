use serde::{Deserialize, Serialize};

use crate::action::ActionRecord;
use crate::invariant::InvariantViolation;
use crate::issue::Issue;

/// Which budget ended the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    StepBudget,
    TimeBudget,
}

/// Final, immutable outcome of one exploration session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResult {
    pub seed: u32,
    pub steps_executed: u64,
    pub elapsed_ms: u64,
    pub stop_reason: StopReason,
    pub actions: Vec<ActionRecord>,
    pub violations: Vec<InvariantViolation>,
    pub console_errors: Vec<String>,
    pub uncaught_exceptions: Vec<String>,
    pub issues: Vec<Issue>,
}

impl SessionResult {
    pub fn failed_actions(&self) -> usize {
        self.actions.iter().filter(|a| !a.success).count()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
