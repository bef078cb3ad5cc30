//! The Target System capability: everything the engine knows about the
//! application under exploration goes through [`TargetSystem`].
//!
//! Abstracted behind a trait so we can:
//! - Use [`mock::MockTarget`] for testing (scriptable, in-memory)
//! - Plug in a real browser driver in production

pub mod mock;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Opaque reference to an element, valid for the target that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub u64);

/// Longest visible text kept in a target label.
const MAX_LABEL_TEXT: usize = 40;

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Best-effort attributes of an element, used only for log readability.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementDescription {
    pub test_id: Option<String>,
    pub id: Option<String>,
    pub aria_label: Option<String>,
    pub text: Option<String>,
    pub tag: String,
    pub class_name: Option<String>,
}

impl ElementDescription {
    /// Label by preference: test id, id, aria label, visible text
    /// (truncated), then tag plus first class.
    pub fn label(&self) -> String {
        if let Some(test_id) = non_empty(&self.test_id) {
            return format!("[data-testid=\"{test_id}\"]");
        }
        if let Some(id) = non_empty(&self.id) {
            return format!("#{id}");
        }
        if let Some(label) = non_empty(&self.aria_label) {
            return format!("[aria-label=\"{label}\"]");
        }
        if let Some(text) = non_empty(&self.text) {
            let truncated: String = text.chars().take(MAX_LABEL_TEXT).collect();
            if truncated.len() < text.len() {
                return format!("\"{truncated}…\"");
            }
            return format!("\"{truncated}\"");
        }
        let tag = if self.tag.is_empty() { "element" } else { &self.tag };
        match self
            .class_name
            .as_deref()
            .and_then(|c| c.split_whitespace().next())
        {
            Some(class) => format!("{tag}.{class}"),
            None => tag.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollEdge {
    Top,
    Bottom,
}

/// A named viewport size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Viewport {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}x{})", self.name, self.width, self.height)
    }
}

/// State inspections the invariant monitor asks the target to evaluate.
///
/// Expected answers:
/// - `BlankRender`: `Bool(true)` when the render root is empty.
/// - `CrashIndicator`: the first matching marker as a string, or `Null`.
/// - `LoadingIndicators`: an array of keys of visible loading indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    BlankRender,
    CrashIndicator(&'static [&'static str]),
    LoadingIndicators(&'static [&'static str]),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("{operation} timed out after {}ms", .timeout.as_millis())]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("element is detached or no longer exists")]
    Detached,

    #[error("invalid selector '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("{operation} is not supported by this target")]
    Unsupported { operation: &'static str },

    #[error("target call failed: {0}")]
    Failed(String),
}

/// Something the target reported outside of a direct call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetEvent {
    ConsoleError(String),
    UncaughtException(String),
}

/// Handle given to the target for pushing events. Delivery is
/// fire-and-forget: once the session is gone, events are dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: UnboundedSender<TargetEvent>,
}

impl EventSink {
    pub fn console_error(&self, text: impl Into<String>) {
        let _ = self.tx.send(TargetEvent::ConsoleError(text.into()));
    }

    pub fn uncaught_exception(&self, text: impl Into<String>) {
        let _ = self.tx.send(TargetEvent::UncaughtException(text.into()));
    }
}

/// A captured message and the step during which it was observed
/// (0 when observed before the first action).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedMessage {
    pub step: u64,
    pub text: String,
}

/// Receiving side of the event channel, owned by the session.
#[derive(Debug)]
pub struct CapturedEvents {
    rx: UnboundedReceiver<TargetEvent>,
    console_errors: Vec<CapturedMessage>,
    uncaught_exceptions: Vec<CapturedMessage>,
}

impl CapturedEvents {
    /// Move every pending event into the logs, stamped with `step`.
    pub fn drain(&mut self, step: u64) {
        while let Ok(event) = self.rx.try_recv() {
            match event {
                TargetEvent::ConsoleError(text) => {
                    self.console_errors.push(CapturedMessage { step, text })
                }
                TargetEvent::UncaughtException(text) => {
                    self.uncaught_exceptions.push(CapturedMessage { step, text })
                }
            }
        }
    }

    pub fn console_errors(&self) -> &[CapturedMessage] {
        &self.console_errors
    }

    pub fn uncaught_exceptions(&self) -> &[CapturedMessage] {
        &self.uncaught_exceptions
    }

    pub fn into_parts(self) -> (Vec<CapturedMessage>, Vec<CapturedMessage>) {
        (self.console_errors, self.uncaught_exceptions)
    }
}

/// Create a connected sink / capture pair.
pub fn event_channel() -> (EventSink, CapturedEvents) {
    let (tx, rx) = unbounded_channel();
    (
        EventSink { tx },
        CapturedEvents {
            rx,
            console_errors: Vec::new(),
            uncaught_exceptions: Vec::new(),
        },
    )
}

/// Interaction primitives of the application under exploration.
///
/// Every call may suspend and may fail; per-call timeouts are enforced by
/// the implementation.
#[async_trait]
pub trait TargetSystem: Send + Sync {
    /// Elements matching any of the selectors, in document order.
    async fn query_candidates(
        &self,
        selectors: &[String],
    ) -> Result<Vec<ElementHandle>, TargetError>;

    /// Whether the element matches a selector pattern.
    async fn matches(&self, handle: ElementHandle, pattern: &str) -> Result<bool, TargetError>;

    async fn click(&self, handle: ElementHandle, timeout: Duration) -> Result<(), TargetError>;

    async fn fill(&self, handle: ElementHandle, text: &str) -> Result<(), TargetError>;

    async fn press_key(&self, combo: &str) -> Result<(), TargetError>;

    async fn scroll_by(&self, dx: i64, dy: i64) -> Result<(), TargetError>;

    async fn scroll_to_edge(&self, edge: ScrollEdge) -> Result<(), TargetError>;

    async fn go_back(&self, timeout: Duration) -> Result<(), TargetError>;

    async fn go_forward(&self, timeout: Duration) -> Result<(), TargetError>;

    async fn reload(&self, timeout: Duration) -> Result<(), TargetError>;

    async fn set_viewport(&self, width: u32, height: u32) -> Result<(), TargetError>;

    async fn evaluate(&self, probe: Probe) -> Result<serde_json::Value, TargetError>;

    async fn describe_element(
        &self,
        handle: ElementHandle,
    ) -> Result<ElementDescription, TargetError>;

    /// Capture a screenshot and return a handle to it.
    async fn screenshot(&self) -> Result<String, TargetError> {
        Err(TargetError::Unsupported {
            operation: "screenshot",
        })
    }

    fn on_console_error(&self, sink: EventSink) -> Result<(), TargetError>;

    fn on_uncaught_exception(&self, sink: EventSink) -> Result<(), TargetError>;
}
