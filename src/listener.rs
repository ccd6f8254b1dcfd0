//! Listener handles and the native/foreign callback variants.
//!
//! A [`Listener`] wraps a host closure behind an `Arc`, so clones are cheap
//! and share identity: two handles compare equal exactly when one was cloned
//! from the other. Removal uses that identity, never the closure body.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::{EmitterError, Result};

/// Process-unique identity of a native listener.
pub type ListenerId = u64;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_listener_id() -> ListenerId {
    NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed)
}

/// Type-erased listener body.
pub(crate) type ListenerFn<A> = dyn Fn(Arc<[A]>) -> BoxFuture<'static, Result<()>> + Send + Sync;

/// Native listener: a host closure invoked with the emitted arguments.
pub struct Listener<A> {
    id: ListenerId,
    func: Arc<ListenerFn<A>>,
}

impl<A: Send + Sync + 'static> Listener<A> {
    /// Create a listener from an async closure.
    ///
    /// A panic inside the future counts as a listener failure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<[A]>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::from_fn(move |args| {
            let fut = f(args);
            async move {
                fut.await;
                Ok(())
            }
            .boxed()
        })
    }

    /// Create a listener whose body reports failure through `Err`.
    pub fn fallible<F, Fut, E>(f: F) -> Self
    where
        F: Fn(Arc<[A]>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: fmt::Display,
    {
        Self::from_fn(move |args| f(args).map(|r| r.map_err(EmitterError::listener_failed)).boxed())
    }

    /// Create a listener from a synchronous closure.
    ///
    /// The body runs on tokio's blocking pool so it may block freely.
    pub fn blocking<F>(f: F) -> Self
    where
        F: Fn(&[A]) + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::from_fn(move |args| {
            let f = Arc::clone(&f);
            async move { run_blocking(move || f(&args)).await }.boxed()
        })
    }

    pub(crate) fn from_fn<F>(f: F) -> Self
    where
        F: Fn(Arc<[A]>) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        Self::with_id(next_listener_id(), f)
    }

    pub(crate) fn with_id<F>(id: ListenerId, f: F) -> Self
    where
        F: Fn(Arc<[A]>) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        Self {
            id,
            func: Arc::new(f),
        }
    }

    pub(crate) fn invoke(&self, args: Arc<[A]>) -> BoxFuture<'static, Result<()>> {
        (self.func)(args)
    }
}

impl<A> Listener<A> {
    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl<A> Clone for Listener<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            func: Arc::clone(&self.func),
        }
    }
}

impl<A> PartialEq for Listener<A> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<A> Eq for Listener<A> {}

impl<A> fmt::Debug for Listener<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener").field("id", &self.id).finish()
    }
}

/// Run a synchronous body on the blocking pool, re-raising its panic here.
pub(crate) async fn run_blocking<F>(f: F) -> Result<()>
where
    F: FnOnce() + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(EmitterError::listener_failed(e)),
    }
}

/// A listener offered for registration: either native or a foreign value.
///
/// Classification happens once, when the callback is registered.
#[derive(Debug, Clone)]
pub enum Callback<A, V> {
    /// Host closure.
    Native(Listener<A>),
    /// Opaque value owned by the scripting runtime.
    Foreign(V),
}

impl<A, V> From<Listener<A>> for Callback<A, V> {
    fn from(listener: Listener<A>) -> Self {
        Self::Native(listener)
    }
}

/// Identity of a failing listener, as handed to the recovery hook.
#[derive(Debug, Clone)]
pub enum ListenerRef<A> {
    Native(Listener<A>),
    /// Foreign value exported back to the host, if the runtime could export it.
    Foreign(Option<A>),
}
