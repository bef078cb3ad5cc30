use std::fmt;

use serde::{Deserialize, Serialize};

/// The fixed set of invariants checked after every action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvariantName {
    NoBlankRender,
    NoCrashIndicator,
    ConsoleErrorThreshold,
    NoStuckLoading,
}

impl InvariantName {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvariantName::NoBlankRender => "no-blank-render",
            InvariantName::NoCrashIndicator => "no-crash-indicator",
            InvariantName::ConsoleErrorThreshold => "console-error-threshold",
            InvariantName::NoStuckLoading => "no-stuck-loading",
        }
    }
}

impl fmt::Display for InvariantName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A violation found by an invariant check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvariantViolation {
    pub invariant: InvariantName,
    pub description: String,
    /// Step of the action whose execution preceded the check.
    pub action_step: u64,
    /// Evidence handle, e.g. the screenshot taken after that action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}
