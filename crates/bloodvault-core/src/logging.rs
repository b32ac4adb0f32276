//! Log output setup.

use tracing_subscriber::EnvFilter;

/// Install a JSON `tracing` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init_logging() {
    init_logging_with("info");
}

/// Like [`init_logging`] with a custom fallback filter directive.
pub fn init_logging_with(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
