//! Process-wide tracing setup shared by the orderlink binaries and tests.

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Initialize human-readable output for tests and local runs.
pub fn init_for_tests() {
    tracing::init_pretty("debug");
}

/// Subscriber construction.
pub mod tracing;
