//! Turns the raw session logs into a [`SessionResult`].
//!
//! Pure and deterministic: the same logs always give the same issues.

use std::collections::BTreeMap;

use gremlin_model::{
    ActionKind, ActionRecord, InvariantViolation, Issue, SessionResult, Severity, StopReason,
    ISSUE_CATEGORY,
};
use serde::Serialize;

use crate::target::CapturedMessage;

#[derive(Debug, Clone, Copy)]
pub struct ResultAggregator {
    seed: u32,
}

impl ResultAggregator {
    pub fn new(seed: u32) -> Self {
        Self { seed }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn aggregate(
        &self,
        steps_executed: u64,
        elapsed_ms: u64,
        stop_reason: StopReason,
        actions: Vec<ActionRecord>,
        violations: Vec<InvariantViolation>,
        console_errors: Vec<CapturedMessage>,
        uncaught_exceptions: Vec<CapturedMessage>,
    ) -> SessionResult {
        let issues = self.issues(&actions, &violations, &console_errors);
        SessionResult {
            seed: self.seed,
            steps_executed,
            elapsed_ms,
            stop_reason,
            actions,
            violations,
            console_errors: console_errors.into_iter().map(|m| m.text).collect(),
            uncaught_exceptions: uncaught_exceptions.into_iter().map(|m| m.text).collect(),
            issues,
        }
    }

    /// One high-severity issue per violation, then one medium-severity
    /// issue per console error.
    pub fn issues(
        &self,
        actions: &[ActionRecord],
        violations: &[InvariantViolation],
        console_errors: &[CapturedMessage],
    ) -> Vec<Issue> {
        let total = actions.len();
        let mut issues = Vec::with_capacity(violations.len() + console_errors.len());

        for (i, violation) in violations.iter().enumerate() {
            let trigger = actions
                .iter()
                .find(|a| a.step == violation.action_step)
                .map(|a| a.kind.as_str())
                .unwrap_or("unknown");
            issues.push(Issue {
                id: format!("chaos-{}-violation-{}", self.seed, i + 1),
                severity: Severity::High,
                category: ISSUE_CATEGORY.to_string(),
                title: format!("Invariant violated: {}", violation.invariant),
                description: format!(
                    "Invariant '{}' violated after action #{} of {} ({}): {}",
                    violation.invariant,
                    violation.action_step,
                    total,
                    trigger,
                    violation.description
                ),
                reproduction_steps: self.reproduction(actions, violation.action_step),
                evidence: violation.evidence.clone(),
            });
        }

        for (i, error) in console_errors.iter().enumerate() {
            issues.push(Issue {
                id: format!("chaos-{}-console-{}", self.seed, i + 1),
                severity: Severity::Medium,
                category: ISSUE_CATEGORY.to_string(),
                title: "Console error during exploration".to_string(),
                description: format!(
                    "Console error observed after action #{} of {}: {}",
                    error.step, total, error.text
                ),
                reproduction_steps: self.reproduction(actions, error.step),
                evidence: None,
            });
        }

        issues
    }

    fn reproduction(&self, actions: &[ActionRecord], up_to_step: u64) -> Vec<String> {
        std::iter::once(format!("Start a session with seed {}", self.seed))
            .chain(
                actions
                    .iter()
                    .take_while(|a| a.step <= up_to_step)
                    .map(ActionRecord::summary),
            )
            .collect()
    }
}

/// Executions and failures of one action kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindStats {
    pub executed: u64,
    pub failed: u64,
}

/// Per-kind execution counts of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActionCoverage {
    pub by_kind: BTreeMap<ActionKind, KindStats>,
}

impl ActionCoverage {
    pub fn from_actions(actions: &[ActionRecord]) -> Self {
        let mut by_kind: BTreeMap<ActionKind, KindStats> = BTreeMap::new();
        for action in actions {
            let stats = by_kind.entry(action.kind).or_default();
            stats.executed += 1;
            if !action.success {
                stats.failed += 1;
            }
        }
        Self { by_kind }
    }

    pub fn unique_kinds(&self) -> usize {
        self.by_kind.len()
    }

    pub fn total_actions(&self) -> u64 {
        self.by_kind.values().map(|s| s.executed).sum()
    }

    /// Share of actions that succeeded, 1.0 for an empty session.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_actions();
        if total == 0 {
            return 1.0;
        }
        let failed: u64 = self.by_kind.values().map(|s| s.failed).sum();
        (total - failed) as f64 / total as f64
    }
}
