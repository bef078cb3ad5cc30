pub mod limits;
pub mod manager;
pub mod seeds;
pub mod telemetry;

pub use limits::{EngineLimits, LimitViolation};
pub use manager::{SessionError, SessionManager, SessionStatus};
pub use seeds::derive_seeds;
