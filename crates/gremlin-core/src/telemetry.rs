use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `gremlin_explore=debug`.
pub const LOG_ENV: &str = "GREMLIN_LOG";

/// Install a formatting subscriber. Returns `false` if a global subscriber
/// was already set.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
