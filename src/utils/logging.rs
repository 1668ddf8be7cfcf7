//! Tracing subscriber setup for hosts embedding the core.

use tracing::Level;

/// Install a fmt subscriber filtered by `RUST_LOG`, defaulting to `level`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing(level: Level) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_target(false)
        .try_init();
}

/// Variant for tests: writes through the test harness's captured output
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::DEBUG.into()),
        )
        .with_test_writer()
        .try_init();
}
