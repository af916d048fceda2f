//! Shared helpers for in-crate unit tests.

/// Initializes tracing output for a test. Safe to call repeatedly; only
/// the first call on a process installs the subscriber.
pub(crate) fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init();
}
