//! Exploration configuration.
//!
//! A config is fixed once a session is constructed. It can be built in code
//! (`ExplorationConfig::default()` plus field updates) or loaded from JSON.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::action::{ActionKind, ActionRecord};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("allowedActionKinds must contain at least one action kind")]
    NoActionKinds,

    #[error("maxSteps must be positive")]
    ZeroMaxSteps,

    #[error("maxTimeMs must be positive")]
    ZeroMaxTime,

    #[error("promptCorpus must be non-empty when type-prompt is allowed")]
    EmptyPromptCorpus,

    #[error("targetDenySelectors[{index}] is empty")]
    EmptyDenyPattern { index: usize },
}

/// What the safety filter does when checking a deny pattern errors out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DenyMatchPolicy {
    /// Treat the candidate as forbidden.
    #[default]
    FailClosed,
    /// Treat the candidate as allowed.
    FailOpen,
}

/// Progress notification handed to the callback after each action.
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    pub step: u64,
    pub max_steps: u64,
    pub action: &'a ActionRecord,
}

type ProgressFn =
    dyn Fn(&Progress<'_>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> + Send + Sync;

/// Optional observer invoked after every action. Errors and panics raised
/// by the callback are swallowed by the session.
#[derive(Clone)]
pub struct ProgressCallback(Arc<ProgressFn>);

impl ProgressCallback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Progress<'_>) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
            + Send
            + Sync
            + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(
        &self,
        progress: &Progress<'_>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (self.0)(progress)
    }
}

impl fmt::Debug for ProgressCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProgressCallback(..)")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExplorationConfig {
    /// Seed for the action stream. `None` means a time-derived seed is
    /// chosen when the session is constructed.
    pub seed: Option<u32>,
    pub max_steps: u64,
    pub max_time_ms: u64,
    pub allowed_action_kinds: BTreeSet<ActionKind>,
    pub target_allow_selectors: Vec<String>,
    pub target_deny_selectors: Vec<String>,
    pub prompt_corpus: Vec<String>,
    pub screenshot_each_step: bool,
    pub deny_match_policy: DenyMatchPolicy,
    /// How long a loading indicator may stay visible before it is stuck.
    pub loading_stale_ms: u64,
    /// Pause between consecutive actions.
    pub settle_delay_ms: u64,
    #[serde(skip)]
    pub progress: Option<ProgressCallback>,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            max_steps: 100,
            max_time_ms: 60_000,
            allowed_action_kinds: ActionKind::ALL.into_iter().collect(),
            target_allow_selectors: vec![
                "button".into(),
                "a[href]".into(),
                "[role=\"button\"]".into(),
                "[data-testid]".into(),
            ],
            target_deny_selectors: vec![
                "[data-testid*=\"logout\"]".into(),
                "[data-testid*=\"delete\"]".into(),
                "[aria-label*=\"Log out\"]".into(),
                "[aria-label*=\"Sign out\"]".into(),
                "[aria-label*=\"Delete\"]".into(),
                "a[href*=\"logout\"]".into(),
            ],
            prompt_corpus: vec![
                "Hello".into(),
                "What can you do?".into(),
                "".into(),
                "Summarize the previous answer in one sentence.".into(),
                "<script>alert(1)</script>".into(),
                "🦀".repeat(64),
            ],
            screenshot_each_step: false,
            deny_match_policy: DenyMatchPolicy::default(),
            loading_stale_ms: 10_000,
            settle_delay_ms: 100,
            progress: None,
        }
    }
}

impl ExplorationConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: ExplorationConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Reject configurations that cannot drive a session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.allowed_action_kinds.is_empty() {
            return Err(ConfigError::NoActionKinds);
        }
        if self.max_steps == 0 {
            return Err(ConfigError::ZeroMaxSteps);
        }
        if self.max_time_ms == 0 {
            return Err(ConfigError::ZeroMaxTime);
        }
        let needs_prompts = self.allowed_action_kinds.iter().any(|k| k.needs_prompts());
        if needs_prompts && self.prompt_corpus.is_empty() {
            return Err(ConfigError::EmptyPromptCorpus);
        }
        if let Some(index) = self
            .target_deny_selectors
            .iter()
            .position(|p| p.trim().is_empty())
        {
            return Err(ConfigError::EmptyDenyPattern { index });
        }
        Ok(())
    }

    /// The allowed kinds in canonical order, as drawn from by the session.
    pub fn action_pool(&self) -> Vec<ActionKind> {
        self.allowed_action_kinds.iter().copied().collect()
    }

    /// The configured seed, or a fresh time-derived one.
    pub fn resolve_seed(&self) -> u32 {
        self.seed.unwrap_or_else(time_derived_seed)
    }
}

/// Seed derived from the current wall-clock time (low 32 bits of millis).
pub fn time_derived_seed() -> u32 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    (millis & u128::from(u32::MAX)) as u32
}
