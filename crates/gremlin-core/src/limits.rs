//! Engine-wide limits checked before a session is accepted or started.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineLimits {
    /// Maximum sessions running at the same time.
    pub max_concurrent_sessions: u32,
    /// Maximum config JSON size in bytes.
    pub max_config_json_bytes: u64,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 8,
            max_config_json_bytes: 1024 * 1024, // 1 MB
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimitViolation {
    #[error("Too many concurrent sessions ({current}/{max})")]
    TooManySessions { current: u32, max: u32 },

    #[error("Config JSON too large ({size} bytes, max {max})")]
    ConfigTooLarge { size: u64, max: u64 },
}

/// Check a config payload size against the limits.
pub fn check_config_size(limits: &EngineLimits, size: usize) -> Result<(), LimitViolation> {
    if size as u64 > limits.max_config_json_bytes {
        return Err(LimitViolation::ConfigTooLarge {
            size: size as u64,
            max: limits.max_config_json_bytes,
        });
    }
    Ok(())
}

/// Check whether another session may start.
pub fn check_concurrency(limits: &EngineLimits, running: usize) -> Result<(), LimitViolation> {
    if running as u32 >= limits.max_concurrent_sessions {
        return Err(LimitViolation::TooManySessions {
            current: running as u32,
            max: limits.max_concurrent_sessions,
        });
    }
    Ok(())
}
