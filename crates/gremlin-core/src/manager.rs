//! Session registry: accepts configs, runs sessions against targets, keeps
//! their results, and replays finished sessions by seed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use gremlin_explore::{SessionController, TargetSystem};
use gremlin_model::{ConfigError, ExplorationConfig, SessionResult};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::limits::{check_concurrency, check_config_size, EngineLimits, LimitViolation};
use crate::seeds::derive_seeds;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Limit exceeded: {0}")]
    Limit(#[from] LimitViolation),

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Session task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Running,
    Finished,
}

#[derive(Debug, Clone)]
struct SessionEntry {
    config: ExplorationConfig,
    status: SessionStatus,
    result: Option<SessionResult>,
}

type Sessions = Mutex<HashMap<String, SessionEntry>>;

/// Manages all registered sessions.
pub struct SessionManager {
    limits: EngineLimits,
    sessions: Sessions,
    next_id: Mutex<u64>,
    /// One permit per running session, shared by every caller.
    permits: Semaphore,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::with_limits(EngineLimits::default())
    }

    pub fn with_limits(limits: EngineLimits) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_id: Mutex::new(1),
            permits: Semaphore::new(limits.max_concurrent_sessions as usize),
            limits,
        }
    }

    /// Parse a JSON config and register a session for it.
    pub fn register_json(&self, json: &str) -> Result<String, SessionError> {
        check_config_size(&self.limits, json.len())?;
        let config = ExplorationConfig::from_json(json)?;
        self.register(config)
    }

    /// Register a session. The seed is pinned here so that the stored
    /// config replays exactly.
    pub fn register(&self, mut config: ExplorationConfig) -> Result<String, SessionError> {
        config.validate()?;
        let seed = config.resolve_seed();
        config.seed = Some(seed);

        let id = {
            let mut next = lock(&self.next_id);
            let id = format!("session-{:04}", *next);
            *next += 1;
            id
        };
        lock(&self.sessions).insert(
            id.clone(),
            SessionEntry {
                config,
                status: SessionStatus::Pending,
                result: None,
            },
        );
        info!(session = %id, seed, "session registered");
        Ok(id)
    }

    /// Run a pending session to completion and store its result.
    ///
    /// Waits while `max_concurrent_sessions` sessions are already running.
    /// If the returned future is dropped mid-run the session goes back to
    /// pending.
    pub async fn run<T: TargetSystem + ?Sized>(
        &self,
        id: &str,
        target: &T,
    ) -> Result<SessionResult, SessionError> {
        // With a zero limit no permit would ever be granted.
        check_concurrency(&self.limits, 0)?;
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| SessionError::Task(e.to_string()))?;

        let config = self.start(id)?;
        let guard = RunGuard {
            sessions: &self.sessions,
            id,
        };
        let result = SessionController::new(target, config)?.run().await;
        guard.finish(&result);
        Ok(result)
    }

    /// Re-run a finished session with its recorded seed against `target`.
    /// The replay is returned, not stored.
    pub async fn replay<T: TargetSystem + ?Sized>(
        &self,
        id: &str,
        target: &T,
    ) -> Result<SessionResult, SessionError> {
        let config = {
            let sessions = lock(&self.sessions);
            let entry = sessions
                .get(id)
                .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
            let result = entry.result.as_ref().ok_or_else(|| {
                SessionError::InvalidState(format!("{id} has not finished"))
            })?;
            ExplorationConfig {
                seed: Some(result.seed),
                ..entry.config.clone()
            }
        };
        info!(session = %id, seed = ?config.seed, "replaying session");
        Ok(SessionController::new(target, config)?.run().await)
    }

    /// Register and run `count` sessions derived from `base`, each seeded
    /// from `master_seed`. Sessions queue on the manager-wide concurrency
    /// limit. Every session is driven to an end before the first error, if
    /// any, is returned. Results come back in seed order.
    pub async fn run_batch<T, F>(
        self: &Arc<Self>,
        base: ExplorationConfig,
        master_seed: u64,
        count: usize,
        make_target: F,
    ) -> Result<Vec<(String, SessionResult)>, SessionError>
    where
        T: TargetSystem + 'static,
        F: Fn() -> T,
    {
        let ids = derive_seeds(master_seed, count)
            .into_iter()
            .map(|seed| {
                self.register(ExplorationConfig {
                    seed: Some(seed),
                    ..base.clone()
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut tasks = JoinSet::new();
        for (index, id) in ids.into_iter().enumerate() {
            let manager = Arc::clone(self);
            let target = make_target();
            tasks.spawn(async move {
                let result = manager.run(&id, &target).await?;
                Ok::<_, SessionError>((index, id, result))
            });
        }

        let mut finished = Vec::with_capacity(count);
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|e| SessionError::Task(e.to_string()))
                .and_then(|outcome| outcome);
            match outcome {
                Ok(done) => finished.push(done),
                Err(e) => {
                    warn!(error = %e, "batch session failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        finished.sort_by_key(|(index, _, _)| *index);
        Ok(finished
            .into_iter()
            .map(|(_, id, result)| (id, result))
            .collect())
    }

    pub fn status(&self, id: &str) -> Option<SessionStatus> {
        lock(&self.sessions).get(id).map(|e| e.status)
    }

    pub fn result(&self, id: &str) -> Option<SessionResult> {
        lock(&self.sessions).get(id).and_then(|e| e.result.clone())
    }

    pub fn session_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn running_count(&self) -> usize {
        lock(&self.sessions)
            .values()
            .filter(|e| e.status == SessionStatus::Running)
            .count()
    }

    /// Move a pending session to running.
    fn start(&self, id: &str) -> Result<ExplorationConfig, SessionError> {
        let mut sessions = lock(&self.sessions);
        let entry = sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        if entry.status != SessionStatus::Pending {
            return Err(SessionError::InvalidState(format!(
                "{id} is {:?}, expected Pending",
                entry.status
            )));
        }
        entry.status = SessionStatus::Running;
        Ok(entry.config.clone())
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Puts a running session back to pending unless it finished.
struct RunGuard<'a> {
    sessions: &'a Sessions,
    id: &'a str,
}

impl RunGuard<'_> {
    fn finish(self, result: &SessionResult) {
        if let Some(entry) = lock(self.sessions).get_mut(self.id) {
            entry.status = SessionStatus::Finished;
            entry.result = Some(result.clone());
        }
        std::mem::forget(self);
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if let Some(entry) = lock(self.sessions).get_mut(self.id) {
            if entry.status == SessionStatus::Running {
                entry.status = SessionStatus::Pending;
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
