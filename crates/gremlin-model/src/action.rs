use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of actions the engine knows how to perform.
///
/// Declaration order is the canonical order used when drawing a kind from
/// a configured set, so reordering variants changes which kinds a seed picks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Click,
    TypePrompt,
    NavigateBack,
    NavigateForward,
    Refresh,
    Scroll,
    KeyboardShortcut,
    ResizeViewport,
    ToggleSidebar,
    SwitchModel,
}

impl ActionKind {
    pub const ALL: [ActionKind; 10] = [
        ActionKind::Click,
        ActionKind::TypePrompt,
        ActionKind::NavigateBack,
        ActionKind::NavigateForward,
        ActionKind::Refresh,
        ActionKind::Scroll,
        ActionKind::KeyboardShortcut,
        ActionKind::ResizeViewport,
        ActionKind::ToggleSidebar,
        ActionKind::SwitchModel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Click => "click",
            ActionKind::TypePrompt => "type-prompt",
            ActionKind::NavigateBack => "navigate-back",
            ActionKind::NavigateForward => "navigate-forward",
            ActionKind::Refresh => "refresh",
            ActionKind::Scroll => "scroll",
            ActionKind::KeyboardShortcut => "keyboard-shortcut",
            ActionKind::ResizeViewport => "resize-viewport",
            ActionKind::ToggleSidebar => "toggle-sidebar",
            ActionKind::SwitchModel => "switch-model",
        }
    }

    /// Whether this kind consumes entries from the prompt corpus.
    pub fn needs_prompts(&self) -> bool {
        matches!(self, ActionKind::TypePrompt)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown action kind name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action kind: {0}")]
pub struct UnknownActionKind(pub String);

impl FromStr for ActionKind {
    type Err = UnknownActionKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownActionKind(s.to_string()))
    }
}

/// One executed action. Records are appended to the session log in
/// execution order and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    /// 1-based position in the action log.
    pub step: u64,
    pub kind: ActionKind,
    /// Human-readable label of the element acted on, if any.
    pub target: Option<String>,
    /// Parameter of the action (typed text, key combo, scroll, viewport).
    pub value: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    /// Screenshot handle captured after the action, if enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

impl ActionRecord {
    pub fn new(step: u64, kind: ActionKind) -> Self {
        Self {
            step,
            kind,
            target: None,
            value: None,
            timestamp: Utc::now(),
            success: true,
            error: None,
            screenshot: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Mark the record as failed with the given message.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }

    /// Equality ignoring wall-clock fields (timestamp, screenshot handle).
    pub fn same_action(&self, other: &ActionRecord) -> bool {
        self.step == other.step
            && self.kind == other.kind
            && self.target == other.target
            && self.value == other.value
            && self.success == other.success
            && self.error == other.error
    }

    /// One-line summary used in reproduction steps.
    pub fn summary(&self) -> String {
        let mut line = format!("{}. {}", self.step, self.kind);
        if let Some(target) = &self.target {
            line.push_str(&format!(" on \"{target}\""));
        }
        if let Some(value) = &self.value {
            line.push_str(&format!(" with \"{value}\""));
        }
        if !self.success {
            line.push_str(" (failed)");
        }
        line
    }
}
