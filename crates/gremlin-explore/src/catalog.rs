//! Action selection and execution.
//!
//! Each step is two phases:
//! 1. `plan`: draw the kind and all of its random parameters. Draws never
//!    depend on the target, so a seed fixes the kinds and parameters of
//!    the whole session no matter how the target responds.
//! 2. `perform`: run the plan against the target. Every failure ends up
//!    on the returned record; nothing propagates.

use std::fmt;
use std::time::Duration;

use gremlin_model::{ActionKind, ActionRecord, ConfigError, ExplorationConfig};
use tracing::debug;

use crate::rng::{index_for_roll, SeededRandom};
use crate::safety::SafetyFilter;
use crate::target::{ElementHandle, ScrollEdge, TargetError, TargetSystem, Viewport};

pub const CLICK_TIMEOUT: Duration = Duration::from_secs(5);
pub const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Queried in order; the first one yielding an allowed element wins.
pub const TEXT_ENTRY_SELECTORS: &[&str] = &[
    "textarea",
    "[contenteditable=\"true\"]",
    "input[type=\"text\"]",
    "input:not([type])",
];

pub const SIDEBAR_TOGGLE_SELECTORS: &[&str] = &[
    "[data-testid=\"sidebar-toggle\"]",
    "[aria-label*=\"sidebar\" i]",
    "button[aria-controls*=\"sidebar\"]",
];

pub const MODEL_TRIGGER_SELECTORS: &[&str] = &[
    "[data-testid=\"model-selector\"]",
    "[aria-label*=\"model\" i]",
    "button[aria-haspopup=\"listbox\"]",
];

pub const MODEL_OPTION_SELECTORS: &[&str] = &[
    "[role=\"option\"]",
    "[role=\"menuitemradio\"]",
    "[data-testid^=\"model-option\"]",
];

pub const SUBMIT_KEY: &str = "Enter";

pub const KEYBOARD_SHORTCUTS: [&str; 5] = ["Escape", "Control+c", "Control+a", "Tab", "Shift+Tab"];

pub const VIEWPORTS: [Viewport; 4] = [
    Viewport {
        name: "mobile",
        width: 375,
        height: 667,
    },
    Viewport {
        name: "tablet",
        width: 768,
        height: 1024,
    },
    Viewport {
        name: "laptop",
        width: 1366,
        height: 768,
    },
    Viewport {
        name: "desktop",
        width: 1920,
        height: 1080,
    },
];

pub const SCROLL_MAGNITUDE_MIN: i64 = 100;
pub const SCROLL_MAGNITUDE_MAX: i64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
    ToTop,
    ToBottom,
}

pub const SCROLL_DIRECTIONS: [ScrollDirection; 4] = [
    ScrollDirection::Up,
    ScrollDirection::Down,
    ScrollDirection::ToTop,
    ScrollDirection::ToBottom,
];

impl fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
            ScrollDirection::ToTop => "to-top",
            ScrollDirection::ToBottom => "to-bottom",
        })
    }
}

/// A fully drawn action, ready to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionPlan {
    /// `roll` selects among the eligible candidates once they are known.
    Click { roll: f64 },
    TypePrompt { prompt: String },
    NavigateBack,
    NavigateForward,
    Refresh,
    Scroll { direction: ScrollDirection, magnitude: i64 },
    KeyboardShortcut { combo: &'static str },
    ResizeViewport { viewport: Viewport },
    ToggleSidebar { roll: f64 },
    SwitchModel { trigger_roll: f64, option_roll: f64 },
}

impl ActionPlan {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionPlan::Click { .. } => ActionKind::Click,
            ActionPlan::TypePrompt { .. } => ActionKind::TypePrompt,
            ActionPlan::NavigateBack => ActionKind::NavigateBack,
            ActionPlan::NavigateForward => ActionKind::NavigateForward,
            ActionPlan::Refresh => ActionKind::Refresh,
            ActionPlan::Scroll { .. } => ActionKind::Scroll,
            ActionPlan::KeyboardShortcut { .. } => ActionKind::KeyboardShortcut,
            ActionPlan::ResizeViewport { .. } => ActionKind::ResizeViewport,
            ActionPlan::ToggleSidebar { .. } => ActionKind::ToggleSidebar,
            ActionPlan::SwitchModel { .. } => ActionKind::SwitchModel,
        }
    }
}

/// Why a single action did not complete.
#[derive(Debug, thiserror::Error)]
enum ActionError {
    #[error("no eligible {0} target")]
    NoEligibleTarget(&'static str),

    #[error(transparent)]
    Target(#[from] TargetError),
}

/// The allowed action kinds plus everything executors need from the config.
#[derive(Debug, Clone)]
pub struct ActionCatalog {
    pool: Vec<ActionKind>,
    allow_selectors: Vec<String>,
    prompts: Vec<String>,
}

impl ActionCatalog {
    pub fn new(config: &ExplorationConfig) -> Result<Self, ConfigError> {
        let pool = config.action_pool();
        if pool.is_empty() {
            return Err(ConfigError::NoActionKinds);
        }
        Ok(Self {
            pool,
            allow_selectors: config.target_allow_selectors.clone(),
            prompts: config.prompt_corpus.clone(),
        })
    }

    pub fn pool(&self) -> &[ActionKind] {
        &self.pool
    }

    /// Draw one kind uniformly from the pool.
    pub fn select(&self, rng: &mut SeededRandom) -> ActionKind {
        // `new` rejects an empty pool, so the fallback is never drawn.
        rng.pick(&self.pool).copied().unwrap_or(ActionKind::Refresh)
    }

    /// Draw the parameters of `kind`. The number of draws depends only on
    /// the kind.
    pub fn plan(&self, kind: ActionKind, rng: &mut SeededRandom) -> ActionPlan {
        match kind {
            ActionKind::Click => ActionPlan::Click {
                roll: rng.next_f64(),
            },
            ActionKind::TypePrompt => ActionPlan::TypePrompt {
                prompt: rng.pick(&self.prompts).cloned().unwrap_or_default(),
            },
            ActionKind::NavigateBack => ActionPlan::NavigateBack,
            ActionKind::NavigateForward => ActionPlan::NavigateForward,
            ActionKind::Refresh => ActionPlan::Refresh,
            ActionKind::Scroll => {
                let direction = rng
                    .pick(&SCROLL_DIRECTIONS)
                    .copied()
                    .unwrap_or(ScrollDirection::Down);
                let magnitude = rng
                    .next_int(SCROLL_MAGNITUDE_MIN, SCROLL_MAGNITUDE_MAX)
                    .unwrap_or(SCROLL_MAGNITUDE_MIN);
                ActionPlan::Scroll {
                    direction,
                    magnitude,
                }
            }
            ActionKind::KeyboardShortcut => ActionPlan::KeyboardShortcut {
                combo: rng
                    .pick(&KEYBOARD_SHORTCUTS)
                    .copied()
                    .unwrap_or(KEYBOARD_SHORTCUTS[0]),
            },
            ActionKind::ResizeViewport => ActionPlan::ResizeViewport {
                viewport: rng.pick(&VIEWPORTS).copied().unwrap_or(VIEWPORTS[0]),
            },
            ActionKind::ToggleSidebar => ActionPlan::ToggleSidebar {
                roll: rng.next_f64(),
            },
            ActionKind::SwitchModel => ActionPlan::SwitchModel {
                trigger_roll: rng.next_f64(),
                option_roll: rng.next_f64(),
            },
        }
    }

    /// Run `plan` against the target and record the outcome as step `step`.
    pub async fn perform<T: TargetSystem + ?Sized>(
        &self,
        plan: &ActionPlan,
        step: u64,
        target: &T,
        safety: &SafetyFilter<'_>,
    ) -> ActionRecord {
        let mut record = ActionRecord::new(step, plan.kind());
        let outcome = self.dispatch(plan, target, safety, &mut record).await;
        if let Err(e) = outcome {
            debug!(step, kind = %record.kind, error = %e, "action failed");
            record = record.failed(e.to_string());
        }
        record
    }

    async fn dispatch<T: TargetSystem + ?Sized>(
        &self,
        plan: &ActionPlan,
        target: &T,
        safety: &SafetyFilter<'_>,
        record: &mut ActionRecord,
    ) -> Result<(), ActionError> {
        match plan {
            ActionPlan::Click { roll } => {
                let handle = pick_allowed(target, safety, &self.allow_selectors, *roll, "click")
                    .await?;
                record.target = Some(describe(target, handle).await);
                target.click(handle, CLICK_TIMEOUT).await?;
            }
            ActionPlan::TypePrompt { prompt } => {
                record.value = Some(prompt.clone());
                let handle = find_text_entry(target, safety).await?;
                record.target = Some(describe(target, handle).await);
                target.fill(handle, prompt).await?;
                target.press_key(SUBMIT_KEY).await?;
            }
            ActionPlan::NavigateBack => {
                swallow_navigation("go_back", target.go_back(NAVIGATION_TIMEOUT).await);
            }
            ActionPlan::NavigateForward => {
                swallow_navigation("go_forward", target.go_forward(NAVIGATION_TIMEOUT).await);
            }
            ActionPlan::Refresh => {
                swallow_navigation("reload", target.reload(NAVIGATION_TIMEOUT).await);
            }
            ActionPlan::Scroll {
                direction,
                magnitude,
            } => match direction {
                ScrollDirection::Up => {
                    record.value = Some(format!("{direction} {magnitude}"));
                    target.scroll_by(0, -magnitude).await?;
                }
                ScrollDirection::Down => {
                    record.value = Some(format!("{direction} {magnitude}"));
                    target.scroll_by(0, *magnitude).await?;
                }
                ScrollDirection::ToTop => {
                    record.value = Some(direction.to_string());
                    target.scroll_to_edge(ScrollEdge::Top).await?;
                }
                ScrollDirection::ToBottom => {
                    record.value = Some(direction.to_string());
                    target.scroll_to_edge(ScrollEdge::Bottom).await?;
                }
            },
            ActionPlan::KeyboardShortcut { combo } => {
                record.value = Some(combo.to_string());
                target.press_key(combo).await?;
            }
            ActionPlan::ResizeViewport { viewport } => {
                record.value = Some(viewport.to_string());
                target.set_viewport(viewport.width, viewport.height).await?;
            }
            ActionPlan::ToggleSidebar { roll } => {
                let selectors = owned(SIDEBAR_TOGGLE_SELECTORS);
                let handle = pick_allowed(target, safety, &selectors, *roll, "sidebar toggle")
                    .await?;
                record.target = Some(describe(target, handle).await);
                target.click(handle, CLICK_TIMEOUT).await?;
            }
            ActionPlan::SwitchModel {
                trigger_roll,
                option_roll,
            } => {
                let triggers = owned(MODEL_TRIGGER_SELECTORS);
                let trigger =
                    pick_allowed(target, safety, &triggers, *trigger_roll, "model selector")
                        .await?;
                record.target = Some(describe(target, trigger).await);
                target.click(trigger, CLICK_TIMEOUT).await?;

                let options = owned(MODEL_OPTION_SELECTORS);
                let option =
                    pick_allowed(target, safety, &options, *option_roll, "model option").await?;
                record.value = Some(describe(target, option).await);
                target.click(option, CLICK_TIMEOUT).await?;
            }
        }
        Ok(())
    }
}

fn owned(selectors: &[&str]) -> Vec<String> {
    selectors.iter().map(|s| s.to_string()).collect()
}

/// Query, deny-filter, then map the pre-drawn roll onto the survivors.
async fn pick_allowed<T: TargetSystem + ?Sized>(
    target: &T,
    safety: &SafetyFilter<'_>,
    selectors: &[String],
    roll: f64,
    what: &'static str,
) -> Result<ElementHandle, ActionError> {
    let candidates = target.query_candidates(selectors).await?;
    let allowed = safety.filter(target, candidates).await;
    index_for_roll(roll, allowed.len())
        .map(|i| allowed[i])
        .ok_or(ActionError::NoEligibleTarget(what))
}

async fn find_text_entry<T: TargetSystem + ?Sized>(
    target: &T,
    safety: &SafetyFilter<'_>,
) -> Result<ElementHandle, ActionError> {
    for selector in TEXT_ENTRY_SELECTORS {
        let candidates = target.query_candidates(&[selector.to_string()]).await?;
        if let Some(handle) = safety.filter(target, candidates).await.first() {
            return Ok(*handle);
        }
    }
    Err(ActionError::NoEligibleTarget("text input"))
}

async fn describe<T: TargetSystem + ?Sized>(target: &T, handle: ElementHandle) -> String {
    match target.describe_element(handle).await {
        Ok(description) => description.label(),
        Err(_) => format!("element#{}", handle.0),
    }
}

/// Navigation without history is expected; the step still counts as done.
fn swallow_navigation(operation: &'static str, result: Result<(), TargetError>) {
    if let Err(e) = result {
        debug!(operation, error = %e, "navigation failure ignored");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gremlin_model::DenyMatchPolicy;

    use crate::target::mock::{MockElement, MockTarget};

    fn catalog(kinds: &[ActionKind]) -> ActionCatalog {
        let config = ExplorationConfig {
            allowed_action_kinds: kinds.iter().copied().collect(),
            ..Default::default()
        };
        ActionCatalog::new(&config).unwrap()
    }

    #[test]
    fn test_empty_pool_rejected() {
        let config = ExplorationConfig {
            allowed_action_kinds: Default::default(),
            ..Default::default()
        };
        assert!(matches!(
            ActionCatalog::new(&config),
            Err(ConfigError::NoActionKinds)
        ));
    }

    #[test]
    fn test_select_only_returns_allowed_kinds() {
        let catalog = catalog(&[ActionKind::Scroll, ActionKind::Refresh]);
        let mut rng = SeededRandom::new(3);
        for _ in 0..500 {
            let kind = catalog.select(&mut rng);
            assert!(kind == ActionKind::Scroll || kind == ActionKind::Refresh);
        }
    }

    #[test]
    fn test_select_covers_every_kind() {
        let catalog = catalog(&ActionKind::ALL);
        let mut rng = SeededRandom::new(11);
        let seen: std::collections::HashSet<ActionKind> =
            (0..2_000).map(|_| catalog.select(&mut rng)).collect();
        assert_eq!(seen.len(), ActionKind::ALL.len());
    }

    #[test]
    fn test_plan_draw_count_fixed_per_kind() {
        let catalog = catalog(&ActionKind::ALL);
        let expected_draws = |kind: ActionKind| match kind {
            ActionKind::NavigateBack | ActionKind::NavigateForward | ActionKind::Refresh => 0,
            ActionKind::Scroll | ActionKind::SwitchModel => 2,
            _ => 1,
        };
        for kind in ActionKind::ALL {
            let mut rng = SeededRandom::new(100);
            let mut reference = SeededRandom::new(100);
            let plan = catalog.plan(kind, &mut rng);
            assert_eq!(plan.kind(), kind);
            for _ in 0..expected_draws(kind) {
                reference.next_f64();
            }
            assert_eq!(rng.state(), reference.state(), "draw count for {kind}");
        }
    }

    #[test]
    fn test_scroll_magnitude_in_range() {
        let catalog = catalog(&[ActionKind::Scroll]);
        let mut rng = SeededRandom::new(8);
        for _ in 0..1_000 {
            match catalog.plan(ActionKind::Scroll, &mut rng) {
                ActionPlan::Scroll { magnitude, .. } => {
                    assert!((SCROLL_MAGNITUDE_MIN..SCROLL_MAGNITUDE_MAX).contains(&magnitude))
                }
                other => panic!("unexpected plan {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_click_records_label_and_skips_denied() {
        let catalog = catalog(&[ActionKind::Click]);
        let target = MockTarget::new()
            .with_element(MockElement::new("button").test_id("logout").matching("#deny"))
            .with_element(MockElement::new("button").id("safe"));
        let deny = vec!["#deny".to_string()];
        let safety = SafetyFilter::new(&deny, DenyMatchPolicy::FailClosed);

        let record = catalog
            .perform(&ActionPlan::Click { roll: 0.0 }, 1, &target, &safety)
            .await;
        assert!(record.success);
        assert_eq!(record.target.as_deref(), Some("#safe"));
        assert_eq!(target.calls(), vec!["click:#safe"]);
    }

    #[tokio::test]
    async fn test_click_without_candidates_is_non_fatal() {
        let catalog = catalog(&[ActionKind::Click]);
        let target = MockTarget::new();
        let safety = SafetyFilter::new(&[], DenyMatchPolicy::FailClosed);

        let record = catalog
            .perform(&ActionPlan::Click { roll: 0.4 }, 2, &target, &safety)
            .await;
        assert!(!record.success);
        assert_eq!(record.error.as_deref(), Some("no eligible click target"));
        assert_eq!(record.step, 2);
    }

    #[tokio::test]
    async fn test_click_failure_keeps_target_label() {
        let catalog = catalog(&[ActionKind::Click]);
        let target = MockTarget::new()
            .with_element(MockElement::new("button").id("slow"))
            .failing("click");
        let safety = SafetyFilter::new(&[], DenyMatchPolicy::FailClosed);

        let record = catalog
            .perform(&ActionPlan::Click { roll: 0.9 }, 1, &target, &safety)
            .await;
        assert!(!record.success);
        assert_eq!(record.target.as_deref(), Some("#slow"));
        assert_eq!(record.error.as_deref(), Some("click timed out after 5000ms"));
    }

    #[tokio::test]
    async fn test_type_prompt_fills_and_submits() {
        let catalog = catalog(&[ActionKind::TypePrompt]);
        let target = MockTarget::chat_app();
        let safety = SafetyFilter::new(&[], DenyMatchPolicy::FailClosed);
        let plan = ActionPlan::TypePrompt {
            prompt: "hi there".into(),
        };

        let record = catalog.perform(&plan, 1, &target, &safety).await;
        assert!(record.success);
        assert_eq!(record.target.as_deref(), Some("[data-testid=\"chat-input\"]"));
        assert_eq!(record.value.as_deref(), Some("hi there"));
        assert_eq!(
            target.calls(),
            vec!["fill:[data-testid=\"chat-input\"]:hi there", "press:Enter"]
        );
    }

    #[tokio::test]
    async fn test_type_prompt_without_input_fails() {
        let catalog = catalog(&[ActionKind::TypePrompt]);
        let target = MockTarget::new().with_element(MockElement::new("button"));
        let safety = SafetyFilter::new(&[], DenyMatchPolicy::FailClosed);
        let plan = ActionPlan::TypePrompt { prompt: "x".into() };

        let record = catalog.perform(&plan, 1, &target, &safety).await;
        assert!(!record.success);
        assert_eq!(record.error.as_deref(), Some("no eligible text input target"));
        assert!(target.calls().is_empty());
    }

    #[tokio::test]
    async fn test_type_prompt_falls_back_to_text_input() {
        let catalog = catalog(&[ActionKind::TypePrompt]);
        let target = MockTarget::new()
            .with_element(MockElement::new("button").id("send"))
            .with_element(MockElement::new("input").id("q").matching("input[type=\"text\"]"));
        let safety = SafetyFilter::new(&[], DenyMatchPolicy::FailClosed);
        let plan = ActionPlan::TypePrompt { prompt: "x".into() };

        let record = catalog.perform(&plan, 1, &target, &safety).await;
        assert!(record.success);
        assert_eq!(record.target.as_deref(), Some("#q"));
        assert_eq!(target.calls(), vec!["fill:#q:x", "press:Enter"]);
    }

    #[tokio::test]
    async fn test_type_prompt_prefers_textarea_over_input() {
        let catalog = catalog(&[ActionKind::TypePrompt]);
        // The input comes first in document order; selector order still wins.
        let target = MockTarget::new()
            .with_element(MockElement::new("input").id("search").matching("input[type=\"text\"]"))
            .with_element(MockElement::new("textarea").id("composer"));
        let safety = SafetyFilter::new(&[], DenyMatchPolicy::FailClosed);
        let plan = ActionPlan::TypePrompt { prompt: "x".into() };

        let record = catalog.perform(&plan, 1, &target, &safety).await;
        assert!(record.success);
        assert_eq!(record.target.as_deref(), Some("#composer"));
        assert_eq!(target.calls(), vec!["fill:#composer:x", "press:Enter"]);
    }

    #[tokio::test]
    async fn test_navigation_failure_is_success() {
        let catalog = catalog(&[ActionKind::NavigateBack]);
        let target = MockTarget::new().failing("go_back");
        let safety = SafetyFilter::new(&[], DenyMatchPolicy::FailClosed);

        let record = catalog
            .perform(&ActionPlan::NavigateBack, 1, &target, &safety)
            .await;
        assert!(record.success);
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn test_scroll_and_viewport_primitives() {
        let catalog = catalog(&[ActionKind::Scroll, ActionKind::ResizeViewport]);
        let target = MockTarget::new();
        let safety = SafetyFilter::new(&[], DenyMatchPolicy::FailClosed);

        let up = ActionPlan::Scroll {
            direction: ScrollDirection::Up,
            magnitude: 250,
        };
        let top = ActionPlan::Scroll {
            direction: ScrollDirection::ToTop,
            magnitude: 300,
        };
        let resize = ActionPlan::ResizeViewport {
            viewport: VIEWPORTS[0],
        };
        let r1 = catalog.perform(&up, 1, &target, &safety).await;
        let r2 = catalog.perform(&top, 2, &target, &safety).await;
        let r3 = catalog.perform(&resize, 3, &target, &safety).await;

        assert_eq!(r1.value.as_deref(), Some("up 250"));
        assert_eq!(r2.value.as_deref(), Some("to-top"));
        assert_eq!(r3.value.as_deref(), Some("mobile (375x667)"));
        assert_eq!(
            target.calls(),
            vec!["scroll_by:0,-250", "scroll_to_edge:top", "viewport:375x667"]
        );
    }

    #[tokio::test]
    async fn test_switch_model_clicks_trigger_then_option() {
        let catalog = catalog(&[ActionKind::SwitchModel]);
        let target = MockTarget::chat_app();
        let safety = SafetyFilter::new(&[], DenyMatchPolicy::FailClosed);
        let plan = ActionPlan::SwitchModel {
            trigger_roll: 0.0,
            option_roll: 0.99,
        };

        let record = catalog.perform(&plan, 1, &target, &safety).await;
        assert!(record.success, "{:?}", record.error);
        assert_eq!(record.target.as_deref(), Some("[data-testid=\"model-selector\"]"));
        assert_eq!(record.value.as_deref(), Some("\"large-model\""));
        assert_eq!(target.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_toggle_sidebar_without_toggle_fails() {
        let catalog = catalog(&[ActionKind::ToggleSidebar]);
        let target = MockTarget::new();
        let safety = SafetyFilter::new(&[], DenyMatchPolicy::FailClosed);

        let record = catalog
            .perform(&ActionPlan::ToggleSidebar { roll: 0.5 }, 1, &target, &safety)
            .await;
        assert!(!record.success);
        assert_eq!(record.error.as_deref(), Some("no eligible sidebar toggle target"));
    }
}
