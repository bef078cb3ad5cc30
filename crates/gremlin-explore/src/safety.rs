//! Deny-list filtering of candidate targets.
//!
//! A candidate survives only if it matches none of the deny patterns. When
//! a match check itself errors, the configured [`DenyMatchPolicy`] decides.

use gremlin_model::DenyMatchPolicy;
use tracing::warn;

use crate::target::{ElementHandle, TargetSystem};

#[derive(Debug, Clone, Copy)]
pub struct SafetyFilter<'a> {
    deny_patterns: &'a [String],
    policy: DenyMatchPolicy,
}

impl<'a> SafetyFilter<'a> {
    pub fn new(deny_patterns: &'a [String], policy: DenyMatchPolicy) -> Self {
        Self {
            deny_patterns,
            policy,
        }
    }

    /// Whether acting on `handle` is forbidden.
    pub async fn is_forbidden<T: TargetSystem + ?Sized>(
        &self,
        target: &T,
        handle: ElementHandle,
    ) -> bool {
        for pattern in self.deny_patterns {
            match target.matches(handle, pattern).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        pattern = %pattern,
                        error = %e,
                        policy = ?self.policy,
                        "deny pattern check failed"
                    );
                    if self.policy == DenyMatchPolicy::FailClosed {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Keep the candidates that match no deny pattern, preserving order.
    pub async fn filter<T: TargetSystem + ?Sized>(
        &self,
        target: &T,
        candidates: Vec<ElementHandle>,
    ) -> Vec<ElementHandle> {
        let mut allowed = Vec::with_capacity(candidates.len());
        for handle in candidates {
            if !self.is_forbidden(target, handle).await {
                allowed.push(handle);
            }
        }
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::mock::{MockElement, MockTarget};

    fn target() -> MockTarget {
        MockTarget::new()
            .with_element(MockElement::new("button").id("ok"))
            .with_element(MockElement::new("button").id("logout").matching("#logout"))
            .with_element(MockElement::new("button").id("other"))
    }

    fn all() -> Vec<ElementHandle> {
        (0..3).map(ElementHandle).collect()
    }

    #[tokio::test]
    async fn test_filter_removes_denied() {
        let deny = vec!["#logout".to_string()];
        let filter = SafetyFilter::new(&deny, DenyMatchPolicy::FailClosed);
        let kept = filter.filter(&target(), all()).await;
        assert_eq!(kept, vec![ElementHandle(0), ElementHandle(2)]);
    }

    #[tokio::test]
    async fn test_no_patterns_keeps_everything() {
        let filter = SafetyFilter::new(&[], DenyMatchPolicy::FailClosed);
        assert_eq!(filter.filter(&target(), all()).await, all());
    }

    #[tokio::test]
    async fn test_broken_pattern_fail_closed_forbids() {
        let deny = vec!["::bogus(".to_string()];
        let target = target().with_invalid_pattern("::bogus(");
        let filter = SafetyFilter::new(&deny, DenyMatchPolicy::FailClosed);
        assert!(filter.filter(&target, all()).await.is_empty());
    }

    #[tokio::test]
    async fn test_broken_pattern_fail_open_allows() {
        let deny = vec!["::bogus(".to_string(), "#logout".to_string()];
        let target = target().with_invalid_pattern("::bogus(");
        let filter = SafetyFilter::new(&deny, DenyMatchPolicy::FailOpen);
        // The broken pattern protects nothing; the valid one still applies.
        let kept = filter.filter(&target, all()).await;
        assert_eq!(kept, vec![ElementHandle(0), ElementHandle(2)]);
    }
}
