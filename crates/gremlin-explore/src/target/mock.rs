//! In-memory target for tests and dry runs.
//!
//! Elements answer to an explicit list of selector strings; a pattern
//! "matches" an element when it is one of those strings. Invariant scripts
//! are keyed by check number: the n-th blank-render probe marks the state
//! check after the n-th action.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{
    ElementDescription, ElementHandle, EventSink, Probe, ScrollEdge, TargetError, TargetSystem,
};
use crate::catalog::{MODEL_OPTION_SELECTORS, MODEL_TRIGGER_SELECTORS, SIDEBAR_TOGGLE_SELECTORS};

/// An element of the mock page.
#[derive(Debug, Clone)]
pub struct MockElement {
    pub description: ElementDescription,
    pub selectors: Vec<String>,
}

impl MockElement {
    pub fn new(tag: &str) -> Self {
        Self {
            description: ElementDescription {
                tag: tag.to_string(),
                ..Default::default()
            },
            selectors: vec![tag.to_string()],
        }
    }

    pub fn test_id(mut self, test_id: &str) -> Self {
        self.description.test_id = Some(test_id.to_string());
        self
    }

    pub fn id(mut self, id: &str) -> Self {
        self.description.id = Some(id.to_string());
        self
    }

    pub fn aria_label(mut self, label: &str) -> Self {
        self.description.aria_label = Some(label.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.description.text = Some(text.to_string());
        self
    }

    /// Add a selector this element answers to.
    pub fn matching(mut self, selector: &str) -> Self {
        self.selectors.push(selector.to_string());
        self
    }

    fn answers(&self, selector: &str) -> bool {
        self.selectors.iter().any(|s| s == selector)
    }
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<String>,
    checks: u64,
    screenshots: u64,
    console_sink: Option<EventSink>,
    exception_sink: Option<EventSink>,
}

/// Scriptable [`TargetSystem`]. Every primitive succeeds unless listed in
/// `failing`.
#[derive(Debug, Default)]
pub struct MockTarget {
    elements: Vec<MockElement>,
    invalid_patterns: HashSet<String>,
    failing: HashSet<&'static str>,
    blank_on_checks: HashSet<u64>,
    crash_on_checks: HashMap<u64, String>,
    loading: Vec<(u64, u64, String)>,
    console_errors_on_checks: HashMap<u64, usize>,
    exceptions_on_checks: HashMap<u64, String>,
    refuse_subscriptions: bool,
    capture_screenshots: bool,
    state: Mutex<MockState>,
}

impl MockTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// A small chat-style page: buttons, a link, a prompt box, a sidebar
    /// toggle, a model picker and two destructive controls that the default
    /// deny list protects.
    pub fn chat_app() -> Self {
        Self::new()
            .with_element(
                MockElement::new("button")
                    .test_id("send-button")
                    .text("Send")
                    .matching("[data-testid]"),
            )
            .with_element(MockElement::new("button").id("new-chat").text("New chat"))
            .with_element(MockElement::new("a").text("Docs").matching("a[href]"))
            .with_element(
                MockElement::new("button")
                    .test_id("logout-button")
                    .text("Log out")
                    .matching("[data-testid]")
                    .matching("[data-testid*=\"logout\"]"),
            )
            .with_element(
                MockElement::new("button")
                    .aria_label("Delete conversation")
                    .matching("[aria-label*=\"Delete\"]"),
            )
            .with_element(
                MockElement::new("textarea")
                    .test_id("chat-input")
                    .matching("[data-testid]"),
            )
            .with_element(
                MockElement::new("button")
                    .aria_label("Toggle sidebar")
                    .matching(SIDEBAR_TOGGLE_SELECTORS[1]),
            )
            .with_element(
                MockElement::new("button")
                    .test_id("model-selector")
                    .text("Model")
                    .matching("[data-testid]")
                    .matching(MODEL_TRIGGER_SELECTORS[0]),
            )
            .with_element(
                MockElement::new("div")
                    .text("fast-model")
                    .matching(MODEL_OPTION_SELECTORS[0]),
            )
            .with_element(
                MockElement::new("div")
                    .text("large-model")
                    .matching(MODEL_OPTION_SELECTORS[0]),
            )
    }

    pub fn with_element(mut self, element: MockElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Checking this pattern against any element errors out.
    pub fn with_invalid_pattern(mut self, pattern: &str) -> Self {
        self.invalid_patterns.insert(pattern.to_string());
        self
    }

    /// Make a primitive fail. Names: `query`, `click`, `fill`, `press_key`,
    /// `scroll`, `go_back`, `go_forward`, `reload`, `set_viewport`,
    /// `evaluate`, `describe`, `screenshot`.
    pub fn failing(mut self, operation: &'static str) -> Self {
        self.failing.insert(operation);
        self
    }

    pub fn blank_on_check(mut self, check: u64) -> Self {
        self.blank_on_checks.insert(check);
        self
    }

    pub fn crash_on_check(mut self, check: u64, marker: &str) -> Self {
        self.crash_on_checks.insert(check, marker.to_string());
        self
    }

    /// Loading indicator `key` is visible on checks `from..=to`.
    pub fn loading_between(mut self, from: u64, to: u64, key: &str) -> Self {
        self.loading.push((from, to, key.to_string()));
        self
    }

    /// Emit `count` console errors when check `check` starts.
    pub fn console_errors_on_check(mut self, check: u64, count: usize) -> Self {
        *self.console_errors_on_checks.entry(check).or_insert(0) += count;
        self
    }

    pub fn exception_on_check(mut self, check: u64, text: &str) -> Self {
        self.exceptions_on_checks.insert(check, text.to_string());
        self
    }

    pub fn refusing_subscriptions(mut self) -> Self {
        self.refuse_subscriptions = true;
        self
    }

    pub fn with_screenshots(mut self) -> Self {
        self.capture_screenshots = true;
        self
    }

    /// Log of primitive calls, e.g. `click:#new-chat`, `press:Escape`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Number of state checks (blank-render probes) seen so far.
    pub fn checks(&self) -> u64 {
        self.lock().checks
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn element(&self, handle: ElementHandle) -> Result<&MockElement, TargetError> {
        self.elements
            .get(handle.0 as usize)
            .ok_or(TargetError::Detached)
    }

    fn guard(&self, operation: &'static str) -> Result<(), TargetError> {
        if self.failing.contains(operation) {
            return Err(TargetError::Failed(format!("{operation} failed")));
        }
        Ok(())
    }

    fn record(&self, call: String) {
        self.lock().calls.push(call);
    }

    fn navigate(&self, operation: &'static str) -> Result<(), TargetError> {
        if self.failing.contains(operation) {
            return Err(TargetError::Navigation(format!("{operation}: no history entry")));
        }
        self.record(operation.to_string());
        Ok(())
    }

    /// Start of a state check: bump the counter and emit scripted events.
    fn begin_check(&self) -> u64 {
        let mut state = self.lock();
        state.checks += 1;
        let check = state.checks;
        if let Some(sink) = &state.console_sink {
            let count = self.console_errors_on_checks.get(&check).copied().unwrap_or(0);
            for i in 0..count {
                sink.console_error(format!("console error {} at check {check}", i + 1));
            }
        }
        if let (Some(sink), Some(text)) =
            (&state.exception_sink, self.exceptions_on_checks.get(&check))
        {
            sink.uncaught_exception(text.clone());
        }
        check
    }
}

#[async_trait]
impl TargetSystem for MockTarget {
    async fn query_candidates(
        &self,
        selectors: &[String],
    ) -> Result<Vec<ElementHandle>, TargetError> {
        self.guard("query")?;
        Ok(self
            .elements
            .iter()
            .enumerate()
            .filter(|(_, e)| selectors.iter().any(|s| e.answers(s)))
            .map(|(i, _)| ElementHandle(i as u64))
            .collect())
    }

    async fn matches(&self, handle: ElementHandle, pattern: &str) -> Result<bool, TargetError> {
        if self.invalid_patterns.contains(pattern) {
            return Err(TargetError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "unsupported syntax".to_string(),
            });
        }
        Ok(self.element(handle)?.answers(pattern))
    }

    async fn click(&self, handle: ElementHandle, timeout: Duration) -> Result<(), TargetError> {
        let element = self.element(handle)?;
        if self.failing.contains("click") {
            return Err(TargetError::Timeout {
                operation: "click",
                timeout,
            });
        }
        self.record(format!("click:{}", element.description.label()));
        Ok(())
    }

    async fn fill(&self, handle: ElementHandle, text: &str) -> Result<(), TargetError> {
        self.guard("fill")?;
        let element = self.element(handle)?;
        self.record(format!("fill:{}:{text}", element.description.label()));
        Ok(())
    }

    async fn press_key(&self, combo: &str) -> Result<(), TargetError> {
        self.guard("press_key")?;
        self.record(format!("press:{combo}"));
        Ok(())
    }

    async fn scroll_by(&self, dx: i64, dy: i64) -> Result<(), TargetError> {
        self.guard("scroll")?;
        self.record(format!("scroll_by:{dx},{dy}"));
        Ok(())
    }

    async fn scroll_to_edge(&self, edge: ScrollEdge) -> Result<(), TargetError> {
        self.guard("scroll")?;
        let edge = match edge {
            ScrollEdge::Top => "top",
            ScrollEdge::Bottom => "bottom",
        };
        self.record(format!("scroll_to_edge:{edge}"));
        Ok(())
    }

    async fn go_back(&self, _timeout: Duration) -> Result<(), TargetError> {
        self.navigate("go_back")
    }

    async fn go_forward(&self, _timeout: Duration) -> Result<(), TargetError> {
        self.navigate("go_forward")
    }

    async fn reload(&self, _timeout: Duration) -> Result<(), TargetError> {
        self.navigate("reload")
    }

    async fn set_viewport(&self, width: u32, height: u32) -> Result<(), TargetError> {
        self.guard("set_viewport")?;
        self.record(format!("viewport:{width}x{height}"));
        Ok(())
    }

    async fn evaluate(&self, probe: Probe) -> Result<Value, TargetError> {
        match probe {
            Probe::BlankRender => {
                let check = self.begin_check();
                self.guard("evaluate")?;
                Ok(json!(self.blank_on_checks.contains(&check)))
            }
            Probe::CrashIndicator(_) => {
                self.guard("evaluate")?;
                let check = self.checks();
                Ok(self
                    .crash_on_checks
                    .get(&check)
                    .map_or(Value::Null, |marker| json!(marker)))
            }
            Probe::LoadingIndicators(_) => {
                self.guard("evaluate")?;
                let check = self.checks();
                let visible: Vec<&str> = self
                    .loading
                    .iter()
                    .filter(|(from, to, _)| (*from..=*to).contains(&check))
                    .map(|(_, _, key)| key.as_str())
                    .collect();
                Ok(json!(visible))
            }
        }
    }

    async fn describe_element(
        &self,
        handle: ElementHandle,
    ) -> Result<ElementDescription, TargetError> {
        self.guard("describe")?;
        Ok(self.element(handle)?.description.clone())
    }

    async fn screenshot(&self) -> Result<String, TargetError> {
        if !self.capture_screenshots {
            return Err(TargetError::Unsupported {
                operation: "screenshot",
            });
        }
        self.guard("screenshot")?;
        let mut state = self.lock();
        state.screenshots += 1;
        Ok(format!("screenshot-{}", state.screenshots))
    }

    fn on_console_error(&self, sink: EventSink) -> Result<(), TargetError> {
        if self.refuse_subscriptions {
            return Err(TargetError::Unsupported {
                operation: "on_console_error",
            });
        }
        self.lock().console_sink = Some(sink);
        Ok(())
    }

    fn on_uncaught_exception(&self, sink: EventSink) -> Result<(), TargetError> {
        if self.refuse_subscriptions {
            return Err(TargetError::Unsupported {
                operation: "on_uncaught_exception",
            });
        }
        self.lock().exception_sink = Some(sink);
        Ok(())
    }
}
