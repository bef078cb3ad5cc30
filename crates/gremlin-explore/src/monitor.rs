//! Post-action invariant checks.
//!
//! Checks are independent: any number may fire after one action. A check
//! whose probe errors is skipped for that step. Violations are returned to
//! the caller, which appends them to the session log.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use gremlin_model::{InvariantName, InvariantViolation};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::target::{CapturedEvents, Probe, TargetSystem};

/// Console errors tolerated over a whole session. The check fires once,
/// on the step where the running total first exceeds this.
pub const CONSOLE_ERROR_THRESHOLD: usize = 10;

/// Markers of a crashed render or an error boundary.
pub const CRASH_MARKERS: &[&str] = &[
    "[data-testid=\"error-boundary\"]",
    ".error-boundary",
    "#__next-error",
    "[data-error-boundary]",
    "text=Something went wrong",
    "text=Application error",
];

/// Markers of an in-progress loading state.
pub const LOADING_MARKERS: &[&str] = &[
    ".spinner",
    ".loading",
    "[aria-busy=\"true\"]",
    "[role=\"progressbar\"]",
    "[data-loading=\"true\"]",
];

#[derive(Debug)]
pub struct InvariantMonitor {
    stale_after: Duration,
    /// First time each visible loading indicator was seen.
    loading_since: HashMap<String, Instant>,
    /// Indicators already reported as stuck (until they disappear).
    reported_stuck: HashSet<String>,
    console_threshold_fired: bool,
}

impl InvariantMonitor {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            stale_after,
            loading_since: HashMap::new(),
            reported_stuck: HashSet::new(),
            console_threshold_fired: false,
        }
    }

    /// Run every check against the state following action `action_step`.
    ///
    /// Drains `events` (stamping them with `action_step`) before the
    /// console-error check so errors raised during the step are counted.
    pub async fn check<T: TargetSystem + ?Sized>(
        &mut self,
        target: &T,
        action_step: u64,
        evidence: Option<&str>,
        events: &mut CapturedEvents,
    ) -> Vec<InvariantViolation> {
        let mut found = Vec::new();

        if let Some(description) = self.check_blank_render(target).await {
            found.push((InvariantName::NoBlankRender, description));
        }
        if let Some(description) = self.check_crash_indicator(target).await {
            found.push((InvariantName::NoCrashIndicator, description));
        }
        for description in self.check_stuck_loading(target).await {
            found.push((InvariantName::NoStuckLoading, description));
        }

        events.drain(action_step);
        if let Some(description) = self.check_console_errors(events.console_errors().len()) {
            found.push((InvariantName::ConsoleErrorThreshold, description));
        }

        found
            .into_iter()
            .map(|(invariant, description)| {
                info!(step = action_step, invariant = %invariant, "invariant violated");
                InvariantViolation {
                    invariant,
                    description,
                    action_step,
                    evidence: evidence.map(str::to_string),
                }
            })
            .collect()
    }

    async fn check_blank_render<T: TargetSystem + ?Sized>(&self, target: &T) -> Option<String> {
        match target.evaluate(Probe::BlankRender).await {
            Ok(Value::Bool(true)) => Some("render root has no content".to_string()),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "blank-render probe failed");
                None
            }
        }
    }

    async fn check_crash_indicator<T: TargetSystem + ?Sized>(&self, target: &T) -> Option<String> {
        match target.evaluate(Probe::CrashIndicator(CRASH_MARKERS)).await {
            Ok(Value::String(marker)) => Some(format!("crash indicator visible: {marker}")),
            Ok(Value::Bool(true)) => Some("crash indicator visible".to_string()),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "crash-indicator probe failed");
                None
            }
        }
    }

    async fn check_stuck_loading<T: TargetSystem + ?Sized>(&mut self, target: &T) -> Vec<String> {
        let visible: HashSet<String> = match target
            .evaluate(Probe::LoadingIndicators(LOADING_MARKERS))
            .await
        {
            Ok(Value::Array(items)) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Ok(_) => HashSet::new(),
            Err(e) => {
                warn!(error = %e, "loading-indicator probe failed");
                return Vec::new();
            }
        };
        self.observe_loading(visible, Instant::now())
    }

    /// Update first-seen times and return descriptions of newly stuck
    /// indicators, in sorted key order.
    fn observe_loading(&mut self, visible: HashSet<String>, now: Instant) -> Vec<String> {
        self.loading_since.retain(|key, _| visible.contains(key));
        self.reported_stuck.retain(|key| visible.contains(key));

        let mut keys: Vec<String> = visible.into_iter().collect();
        keys.sort();

        let mut stuck = Vec::new();
        for key in keys {
            let since = *self.loading_since.entry(key.clone()).or_insert(now);
            let visible_for = now.saturating_duration_since(since);
            if visible_for >= self.stale_after && !self.reported_stuck.contains(&key) {
                stuck.push(format!(
                    "loading indicator {key} visible for {}ms",
                    visible_for.as_millis()
                ));
                self.reported_stuck.insert(key);
            }
        }
        stuck
    }

    fn check_console_errors(&mut self, total: usize) -> Option<String> {
        if self.console_threshold_fired || total <= CONSOLE_ERROR_THRESHOLD {
            return None;
        }
        self.console_threshold_fired = true;
        Some(format!(
            "{total} console errors captured, exceeding the limit of {CONSOLE_ERROR_THRESHOLD}"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::event_channel;
    use crate::target::mock::MockTarget;

    fn keys(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_loading_becomes_stuck_after_threshold() {
        let mut monitor = InvariantMonitor::new(Duration::from_millis(500));
        let t0 = Instant::now();

        assert!(monitor.observe_loading(keys(&[".spinner"]), t0).is_empty());
        assert!(monitor
            .observe_loading(keys(&[".spinner"]), t0 + Duration::from_millis(499))
            .is_empty());
        let stuck = monitor.observe_loading(keys(&[".spinner"]), t0 + Duration::from_millis(500));
        assert_eq!(stuck, vec!["loading indicator .spinner visible for 500ms"]);

        // Latched while still visible.
        assert!(monitor
            .observe_loading(keys(&[".spinner"]), t0 + Duration::from_secs(5))
            .is_empty());
    }

    #[test]
    fn test_loading_timer_resets_when_indicator_disappears() {
        let mut monitor = InvariantMonitor::new(Duration::from_millis(500));
        let t0 = Instant::now();

        monitor.observe_loading(keys(&[".spinner"]), t0);
        monitor.observe_loading(keys(&[]), t0 + Duration::from_millis(300));
        let stuck =
            monitor.observe_loading(keys(&[".spinner"]), t0 + Duration::from_millis(600));
        assert!(stuck.is_empty());
        let stuck =
            monitor.observe_loading(keys(&[".spinner"]), t0 + Duration::from_millis(1_100));
        assert_eq!(stuck.len(), 1);
    }

    #[test]
    fn test_console_threshold_fires_once() {
        let mut monitor = InvariantMonitor::new(Duration::from_secs(10));
        assert!(monitor.check_console_errors(CONSOLE_ERROR_THRESHOLD).is_none());
        assert!(monitor
            .check_console_errors(CONSOLE_ERROR_THRESHOLD + 1)
            .is_some());
        assert!(monitor
            .check_console_errors(CONSOLE_ERROR_THRESHOLD + 5)
            .is_none());
    }

    #[tokio::test]
    async fn test_several_invariants_fire_on_one_step() {
        let target = MockTarget::new()
            .blank_on_check(1)
            .crash_on_check(1, ".error-boundary");
        let (_sink, mut events) = event_channel();
        let mut monitor = InvariantMonitor::new(Duration::from_secs(10));

        let violations = monitor.check(&target, 1, Some("shot-1"), &mut events).await;
        let names: Vec<InvariantName> = violations.iter().map(|v| v.invariant).collect();
        assert_eq!(
            names,
            vec![InvariantName::NoBlankRender, InvariantName::NoCrashIndicator]
        );
        assert!(violations.iter().all(|v| v.action_step == 1));
        assert!(violations.iter().all(|v| v.evidence.as_deref() == Some("shot-1")));
        assert_eq!(
            violations[1].description,
            "crash indicator visible: .error-boundary"
        );

        let violations = monitor.check(&target, 2, None, &mut events).await;
        assert!(violations.is_empty());
    }

    #[tokio::test]
    async fn test_probe_errors_are_skipped() {
        let target = MockTarget::new().blank_on_check(1).failing("evaluate");
        let (_sink, mut events) = event_channel();
        let mut monitor = InvariantMonitor::new(Duration::from_secs(10));

        assert!(monitor.check(&target, 1, None, &mut events).await.is_empty());
    }
}
