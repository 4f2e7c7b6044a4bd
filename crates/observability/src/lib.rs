//! Tracing/logging setup shared by binaries.

/// Initialize process-wide observability (tracing/logging).
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(LogFormat::from_env());
}

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use tracing::LogFormat;
