//! The exploration loop.
//!
//! A [`SessionController`] exclusively owns the random stream and the
//! action/violation/event logs of one session. Helpers get draw or append
//! access only through the controller's calls, so any number of sessions
//! can run side by side.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use gremlin_model::{
    ActionRecord, ConfigError, ExplorationConfig, InvariantViolation, Progress, SessionResult,
    StopReason,
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::aggregate::ResultAggregator;
use crate::catalog::ActionCatalog;
use crate::monitor::InvariantMonitor;
use crate::rng::SeededRandom;
use crate::safety::SafetyFilter;
use crate::target::{event_channel, CapturedEvents, TargetSystem};

pub struct SessionController<'t, T: TargetSystem + ?Sized> {
    target: &'t T,
    config: ExplorationConfig,
    seed: u32,
    rng: SeededRandom,
    catalog: ActionCatalog,
    monitor: InvariantMonitor,
    actions: Vec<ActionRecord>,
    violations: Vec<InvariantViolation>,
}

impl<'t, T: TargetSystem + ?Sized> SessionController<'t, T> {
    /// Validate the config and fix the seed. This is the only place a
    /// session can fail.
    pub fn new(target: &'t T, config: ExplorationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let catalog = ActionCatalog::new(&config)?;
        let seed = config.resolve_seed();
        let monitor = InvariantMonitor::new(Duration::from_millis(config.loading_stale_ms));
        Ok(Self {
            target,
            config,
            seed,
            rng: SeededRandom::new(seed),
            catalog,
            monitor,
            actions: Vec::new(),
            violations: Vec::new(),
        })
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn config(&self) -> &ExplorationConfig {
        &self.config
    }

    /// Explore until the step or time budget runs out.
    pub async fn run(mut self) -> SessionResult {
        let started = Instant::now();
        let mut events = self.subscribe();
        info!(
            seed = self.seed,
            max_steps = self.config.max_steps,
            max_time_ms = self.config.max_time_ms,
            "exploration session started"
        );

        let max_time = Duration::from_millis(self.config.max_time_ms);
        let settle = Duration::from_millis(self.config.settle_delay_ms);
        let mut steps = 0u64;

        // Budgets are checked only between actions; an in-flight action
        // always runs to completion.
        let stop_reason = loop {
            if let Some(reason) = self.budget_exhausted(steps, started.elapsed(), max_time) {
                break reason;
            }
            steps += 1;
            self.step(steps, &mut events).await;
            tokio::time::sleep(settle).await;
        };
        events.drain(steps);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            seed = self.seed,
            steps,
            elapsed_ms,
            stop = ?stop_reason,
            violations = self.violations.len(),
            "exploration session finished"
        );

        let (console_errors, uncaught_exceptions) = events.into_parts();
        ResultAggregator::new(self.seed).aggregate(
            steps,
            elapsed_ms,
            stop_reason,
            self.actions,
            self.violations,
            console_errors,
            uncaught_exceptions,
        )
    }

    fn budget_exhausted(
        &self,
        steps: u64,
        elapsed: Duration,
        max_time: Duration,
    ) -> Option<StopReason> {
        if steps >= self.config.max_steps {
            Some(StopReason::StepBudget)
        } else if elapsed >= max_time {
            Some(StopReason::TimeBudget)
        } else {
            None
        }
    }

    /// Register listeners once; a target refusing them is not fatal.
    fn subscribe(&self) -> CapturedEvents {
        let (sink, events) = event_channel();
        if let Err(e) = self.target.on_console_error(sink.clone()) {
            warn!(error = %e, "console error listener unavailable");
        }
        if let Err(e) = self.target.on_uncaught_exception(sink) {
            warn!(error = %e, "uncaught exception listener unavailable");
        }
        events
    }

    async fn step(&mut self, step: u64, events: &mut CapturedEvents) {
        let kind = self.catalog.select(&mut self.rng);
        let plan = self.catalog.plan(kind, &mut self.rng);
        let safety = SafetyFilter::new(
            &self.config.target_deny_selectors,
            self.config.deny_match_policy,
        );
        let mut record = self
            .catalog
            .perform(&plan, step, self.target, &safety)
            .await;

        if self.config.screenshot_each_step {
            match self.target.screenshot().await {
                Ok(handle) => record.screenshot = Some(handle),
                Err(e) => debug!(step, error = %e, "screenshot failed"),
            }
        }
        debug!(
            step,
            kind = %record.kind,
            target = record.target.as_deref().unwrap_or(""),
            success = record.success,
            "action executed"
        );

        self.notify_progress(&record);
        let evidence = record.screenshot.clone();
        self.actions.push(record);

        let found = self
            .monitor
            .check(self.target, step, evidence.as_deref(), events)
            .await;
        self.violations.extend(found);
    }

    fn notify_progress(&self, record: &ActionRecord) {
        let Some(callback) = &self.config.progress else {
            return;
        };
        let progress = Progress {
            step: record.step,
            max_steps: self.config.max_steps,
            action: record,
        };
        match catch_unwind(AssertUnwindSafe(|| callback.call(&progress))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(step = record.step, error = %e, "progress callback failed"),
            Err(_) => warn!(step = record.step, "progress callback panicked"),
        }
    }
}
