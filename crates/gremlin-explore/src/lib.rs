//! Seeded chaos exploration of an interactive application.
//!
//! A session repeatedly draws an action from the configured set, performs it
//! against a [`target::TargetSystem`], and checks invariants on the
//! resulting state. The seed fixes every random choice, so a reported
//! failure can be replayed.

pub mod aggregate;
pub mod catalog;
pub mod monitor;
pub mod rng;
pub mod safety;
pub mod session;
pub mod target;

pub use aggregate::{ActionCoverage, ResultAggregator};
pub use catalog::{ActionCatalog, ActionPlan};
pub use monitor::{InvariantMonitor, CONSOLE_ERROR_THRESHOLD};
pub use rng::{RandomError, SeededRandom};
pub use safety::SafetyFilter;
pub use session::SessionController;
pub use target::{TargetError, TargetSystem};
