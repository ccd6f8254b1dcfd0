//! Listener fan-out.
//!
//! One tokio task per listener per emit. Each task catches its own
//! failure, hands it to the recovery hook when one is installed, and
//! otherwise reports it back to the emitting task, which settles all
//! outcomes once every task has finished.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use super::RecoveryHook;
use crate::error::{EmitterError, Result};
use crate::interfaces::ScriptRuntime;
use crate::listener::{Listener, ListenerRef};

/// The listener a task runs, kept to identify it on failure.
pub(crate) enum Culprit<A, V> {
    Native(Listener<A>),
    Foreign(V),
}

/// How a listener failed.
pub(crate) enum Failure {
    Error(EmitterError),
    Panic(Box<dyn Any + Send>),
}

impl Failure {
    fn to_error(&self) -> EmitterError {
        match self {
            Self::Error(e) => e.clone(),
            Self::Panic(payload) => EmitterError::from_panic(payload.as_ref()),
        }
    }
}

/// Result of one listener task.
pub(crate) enum Outcome {
    Completed,
    Recovered,
    Unrecovered(Failure),
}

/// Everything a listener task needs besides the listener itself.
pub(crate) struct TaskContext<K, A, R> {
    pub event: K,
    pub recoverer: Option<RecoveryHook<K, A>>,
    pub runtime: Option<Arc<R>>,
}

impl<K: Clone, A, R> Clone for TaskContext<K, A, R> {
    fn clone(&self) -> Self {
        Self {
            event: self.event.clone(),
            recoverer: self.recoverer.clone(),
            runtime: self.runtime.clone(),
        }
    }
}

/// Spawn one listener invocation as an independent task.
///
/// `invocation` is only called inside the task, so a listener that panics
/// before returning its future is isolated as well.
pub(crate) fn spawn_listener<K, A, R, F>(
    ctx: TaskContext<K, A, R>,
    culprit: Culprit<A, R::Value>,
    invocation: F,
) -> JoinHandle<Outcome>
where
    K: std::fmt::Debug + Send + Sync + 'static,
    A: Send + Sync + 'static,
    R: ScriptRuntime<A>,
    F: FnOnce() -> BoxFuture<'static, Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let invoked = AssertUnwindSafe(async move { invocation().await });
        let failure = match invoked.catch_unwind().await {
            Ok(Ok(())) => return Outcome::Completed,
            Ok(Err(e)) => Failure::Error(e),
            Err(payload) => Failure::Panic(payload),
        };

        let Some(hook) = ctx.recoverer.as_ref() else {
            return Outcome::Unrecovered(failure);
        };

        let err = failure.to_error();
        let listener = match culprit {
            Culprit::Native(listener) => ListenerRef::Native(listener),
            Culprit::Foreign(value) => {
                ListenerRef::Foreign(ctx.runtime.as_ref().and_then(|rt| rt.export(&value)))
            }
        };
        warn!(event = ?ctx.event, error = %err, "Listener failed, recovering");
        hook(&ctx.event, &listener, &err);
        Outcome::Recovered
    })
}

/// Call a foreign listener on the blocking pool.
pub(crate) fn call_foreign<A, R>(
    runtime: Arc<R>,
    function: R::Value,
    args: Arc<[R::Value]>,
) -> BoxFuture<'static, Result<()>>
where
    A: 'static,
    R: ScriptRuntime<A>,
{
    async move {
        let call = tokio::task::spawn_blocking(move || runtime.call(&function, &args));
        match call.await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(EmitterError::listener_failed(e)),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(EmitterError::listener_failed(e)),
        }
    }
    .boxed()
}

/// Convert every emitted argument into the runtime's representation.
pub(crate) fn convert_arguments<A, R>(runtime: &R, args: &[A]) -> Result<Arc<[R::Value]>>
where
    R: ScriptRuntime<A>,
{
    args.iter()
        .enumerate()
        .map(|(index, arg)| {
            runtime
                .to_value(arg)
                .map_err(|source| EmitterError::ArgumentConversion { index, source })
        })
        .collect::<Result<Vec<_>>>()
        .map(Arc::from)
}

/// Wait for every task, then escalate the first unrecovered failure.
///
/// A panic wins over an error and is re-raised on the calling task.
pub(crate) async fn join_tasks(handles: Vec<JoinHandle<Outcome>>) -> Result<()> {
    let mut first_error = None;
    let mut first_panic = None;

    for joined in join_all(handles).await {
        let failure = match joined {
            Ok(Outcome::Completed) | Ok(Outcome::Recovered) => continue,
            Ok(Outcome::Unrecovered(failure)) => failure,
            // The recovery hook itself panicked.
            Err(e) if e.is_panic() => Failure::Panic(e.into_panic()),
            Err(e) => Failure::Error(EmitterError::listener_failed(e)),
        };

        error!(error = %failure.to_error(), "Listener failed with no recovery hook");
        match failure {
            Failure::Panic(payload) => {
                first_panic.get_or_insert(payload);
            }
            Failure::Error(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    if let Some(payload) = first_panic {
        std::panic::resume_unwind(payload);
    }
    first_error.map_or(Ok(()), Err)
}
