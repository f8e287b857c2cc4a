//! Logging setup for applications built on planecal
//!
//! The library itself only emits `tracing` events; binaries and tests call
//! one of these functions once to install a formatter.

use tracing::Level;

/// Initialize the tracing subscriber with planecal's standard configuration
///
/// Default log level: INFO (overrideable via RUST_LOG environment variable)
///
/// # Example
/// ```no_run
/// use planecal::init_logger;
///
/// fn main() {
///     init_logger();
///     tracing::info!("Calibration started");
/// }
/// ```
///
/// # Environment Variables
/// ```bash
/// RUST_LOG=planecal=debug cargo test
/// ```
pub fn init_logger() {
    init_logger_with_level(Level::INFO)
}

/// Initialize the tracing subscriber with a custom default level
///
/// Returns without touching the existing subscriber if one is already
/// installed, so repeated calls from tests are harmless.
pub fn init_logger_with_level(default_level: Level) {
    use tracing_subscriber::fmt::time::SystemTime;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with_timer(SystemTime)
        .with_target(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
}
