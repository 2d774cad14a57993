use tracing_subscriber::EnvFilter;

pub const LOG_FILTER_ENV: &str = "DISPATCH_LOG";
const DEFAULT_FILTER: &str = "info";

/// Installs a global fmt subscriber filtered by `DISPATCH_LOG`. Returns false
/// when a subscriber was already installed.
pub fn try_init() -> bool {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

/// Test-friendly variant that writes through the test harness capture.
pub fn try_init_for_tests() -> bool {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new("debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init()
        .is_ok()
}
