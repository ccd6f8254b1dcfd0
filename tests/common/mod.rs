//! Shared utilities for integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fanout::Listener;

/// Build a listener that counts its invocations.
pub fn counter<A: Send + Sync + 'static>() -> (Listener<A>, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let inner = Arc::clone(&count);
    let listener = Listener::new(move |_args| {
        let inner = Arc::clone(&inner);
        async move {
            inner.fetch_add(1, Ordering::SeqCst);
        }
    });
    (listener, count)
}

/// Current value of a counter.
pub fn count(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}
