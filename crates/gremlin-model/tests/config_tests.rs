use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use gremlin_model::{
    ActionKind, ActionRecord, ConfigError, DenyMatchPolicy, ExplorationConfig, Progress,
    ProgressCallback,
};

#[test]
fn test_default_config_is_valid() {
    let config = ExplorationConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.action_pool().len(), ActionKind::ALL.len());
    assert_eq!(config.deny_match_policy, DenyMatchPolicy::FailClosed);
}

#[test]
fn test_from_json_camel_case_keys() {
    let json = r#"{
        "seed": 1234,
        "maxSteps": 25,
        "maxTimeMs": 5000,
        "allowedActionKinds": ["scroll", "click", "refresh"],
        "targetAllowSelectors": ["button"],
        "targetDenySelectors": ["[data-testid=\"logout\"]"],
        "denyMatchPolicy": "fail-open"
    }"#;
    let config = ExplorationConfig::from_json(json).unwrap();
    assert_eq!(config.seed, Some(1234));
    assert_eq!(config.max_steps, 25);
    assert_eq!(config.max_time_ms, 5000);
    assert_eq!(config.deny_match_policy, DenyMatchPolicy::FailOpen);
    // Canonical order, not file order.
    assert_eq!(
        config.action_pool(),
        vec![ActionKind::Click, ActionKind::Refresh, ActionKind::Scroll]
    );
    // Unspecified fields keep their defaults.
    assert_eq!(config.settle_delay_ms, 100);
}

#[test]
fn test_empty_action_kinds_rejected() {
    let result = ExplorationConfig::from_json(r#"{ "allowedActionKinds": [] }"#);
    assert!(matches!(result, Err(ConfigError::NoActionKinds)));
}

#[test]
fn test_unknown_action_kind_rejected() {
    let result = ExplorationConfig::from_json(r#"{ "allowedActionKinds": ["teleport"] }"#);
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn test_non_integer_seed_rejected() {
    let result = ExplorationConfig::from_json(r#"{ "seed": "abc" }"#);
    assert!(matches!(result, Err(ConfigError::Parse(_))));

    let result = ExplorationConfig::from_json(r#"{ "seed": -1 }"#);
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn test_zero_budgets_rejected() {
    let config = ExplorationConfig {
        max_steps: 0,
        ..Default::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::ZeroMaxSteps)));

    let config = ExplorationConfig {
        max_time_ms: 0,
        ..Default::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::ZeroMaxTime)));
}

#[test]
fn test_prompt_corpus_only_required_for_type_prompt() {
    let mut config = ExplorationConfig {
        prompt_corpus: vec![],
        ..Default::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::EmptyPromptCorpus)));

    config.allowed_action_kinds = [ActionKind::Scroll, ActionKind::Refresh].into_iter().collect();
    assert!(config.validate().is_ok());
}

#[test]
fn test_empty_deny_pattern_rejected() {
    let config = ExplorationConfig {
        target_deny_selectors: vec!["#ok".into(), "  ".into()],
        ..Default::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::EmptyDenyPattern { index: 1 })
    ));
}

#[test]
fn test_resolve_seed_prefers_configured_seed() {
    let config = ExplorationConfig {
        seed: Some(99),
        ..Default::default()
    };
    assert_eq!(config.resolve_seed(), 99);
}

#[test]
fn test_progress_callback_is_not_serialized() {
    let calls = Arc::new(AtomicU64::new(0));
    let seen = calls.clone();
    let config = ExplorationConfig::default().with_progress(ProgressCallback::new(
        move |p: &Progress<'_>| {
            seen.fetch_add(p.step, Ordering::SeqCst);
            Ok(())
        },
    ));

    let json = serde_json::to_string(&config).unwrap();
    assert!(!json.contains("progress"));

    let record = ActionRecord::new(7, ActionKind::Scroll);
    let progress = Progress {
        step: 7,
        max_steps: 10,
        action: &record,
    };
    config.progress.as_ref().unwrap().call(&progress).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 7);
}
