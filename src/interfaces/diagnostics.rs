//! Diagnostic sink for registration warnings.

use std::fmt::Debug;

use tracing::warn;

/// Receives non-fatal registration diagnostics.
///
/// Diagnostics never change emitter behavior; a sink may drop them.
pub trait DiagnosticSink<K>: Send + Sync {
    /// An event now has more listeners than the configured maximum.
    fn listeners_exceeded(&self, event: &K, limit: usize, count: usize);
}

/// Default sink: writes a `warn!` event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl<K: Debug> DiagnosticSink<K> for TracingSink {
    fn listeners_exceeded(&self, event: &K, limit: usize, count: usize) {
        warn!(
            listener_count = count,
            "Warning: event `{:?}` has exceeded the maximum number of listeners of {}.",
            event,
            limit
        );
    }
}

/// Sink that discards every diagnostic.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSink;

impl<K> DiagnosticSink<K> for SilentSink {
    fn listeners_exceeded(&self, _event: &K, _limit: usize, _count: usize) {}
}
