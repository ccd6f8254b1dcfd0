//! Event emitter.
//!
//! Listeners are registered against arbitrary event keys and invoked
//! concurrently, one tokio task per listener, when the key is emitted.
//!
//! The registry sits behind a single `parking_lot::Mutex`. Registration,
//! removal and the snapshot step of `emit` are the only critical sections;
//! the lock is never held while a listener, the recovery hook or a
//! diagnostic sink runs. A listener may therefore register, remove or emit
//! from inside its own invocation, which is what lets one-shot listeners
//! unregister themselves mid-dispatch.

mod dispatch;

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::config::EmitterConfig;
use crate::error::{EmitterError, Result};
use crate::interfaces::{Detached, DiagnosticSink, ScriptRuntime, TracingSink};
use crate::listener::{next_listener_id, Callback, Listener, ListenerId, ListenerRef};
use dispatch::{Culprit, TaskContext};

/// Default maximum number of listeners per event before a warning.
pub const DEFAULT_MAX_LISTENERS: usize = 10;

/// Callback invoked when a listener cannot be registered or fails.
pub type RecoveryHook<K, A> = Arc<dyn Fn(&K, &ListenerRef<A>, &EmitterError) + Send + Sync>;

/// A registered foreign value.
///
/// One-shot entries stay in the foreign registry until an emit claims them,
/// which happens only after the arguments converted successfully.
#[derive(Clone)]
struct ForeignEntry<V> {
    id: ListenerId,
    value: V,
    once: bool,
}

struct Registry<K, A, V> {
    native: HashMap<K, Vec<Listener<A>>>,
    foreign: HashMap<K, Vec<ForeignEntry<V>>>,
    max_listeners: Option<usize>,
    warn_on_limit: bool,
    recoverer: Option<RecoveryHook<K, A>>,
    diagnostics: Arc<dyn DiagnosticSink<K>>,
}

struct Shared<K, A, R: ScriptRuntime<A>> {
    registry: Mutex<Registry<K, A, R::Value>>,
    runtime: Option<Arc<R>>,
}

impl<K, A, R> Shared<K, A, R>
where
    K: Eq + Hash,
    R: ScriptRuntime<A>,
{
    fn remove_native(&self, event: &K, id: ListenerId) {
        if let Some(listeners) = self.registry.lock().native.get_mut(event) {
            listeners.retain(|l| l.id() != id);
        }
    }

    /// Resolve a foreign snapshot into the values to call.
    ///
    /// One-shot entries are removed here; an entry another emit already
    /// claimed is dropped from the snapshot.
    fn claim_foreign(&self, event: &K, snapshot: Vec<ForeignEntry<R::Value>>) -> Vec<R::Value> {
        if snapshot.iter().all(|entry| !entry.once) {
            return snapshot.into_iter().map(|entry| entry.value).collect();
        }

        let mut registry = self.registry.lock();
        let mut live = registry.foreign.get_mut(event);
        snapshot
            .into_iter()
            .filter_map(|entry| {
                if !entry.once {
                    return Some(entry.value);
                }
                let listeners = live.as_mut()?;
                let position = listeners.iter().position(|l| l.id == entry.id)?;
                listeners.remove(position);
                Some(entry.value)
            })
            .collect()
    }
}

/// In-process event emitter.
///
/// `K` is the event key, `A` the argument type passed to listeners and `R`
/// the scripting runtime hosting foreign listeners ([`Detached`] when there
/// is none). Cloning an emitter yields another handle to the same registry.
///
/// # Example
///
/// ```ignore
/// let emitter: Emitter<String, u32> = Emitter::new();
/// let ticks = Arc::new(AtomicU32::new(0));
/// let counter = Arc::clone(&ticks);
/// emitter.on("tick", Listener::new(move |args| {
///     let counter = Arc::clone(&counter);
///     async move { counter.fetch_add(args[0], Ordering::SeqCst); }
/// }))?;
/// emitter.emit("tick", [1]).await?;
/// ```
pub struct Emitter<K, A, R: ScriptRuntime<A> = Detached> {
    shared: Arc<Shared<K, A, R>>,
}

impl<K, A> Emitter<K, A, Detached>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    /// Create an emitter for native listeners only.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a native-only emitter configured from `config`.
    pub fn from_config(config: &EmitterConfig) -> Self {
        let emitter = Self::new();
        emitter.configure(config);
        emitter
    }
}

impl<K, A, R> Emitter<K, A, R>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    A: Send + Sync + 'static,
    R: ScriptRuntime<A>,
{
    /// Create an emitter that also accepts foreign listeners hosted by `runtime`.
    pub fn with_runtime(runtime: Arc<R>) -> Self {
        Self::build(Some(runtime))
    }

    fn build(runtime: Option<Arc<R>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry {
                    native: HashMap::new(),
                    foreign: HashMap::new(),
                    max_listeners: Some(DEFAULT_MAX_LISTENERS),
                    warn_on_limit: true,
                    recoverer: None,
                    diagnostics: Arc::new(TracingSink),
                }),
                runtime,
            }),
        }
    }

    /// Apply a loaded configuration.
    ///
    /// `warn_on_limit` switches diagnostics on or off; the installed sink
    /// is kept either way.
    pub fn configure(&self, config: &EmitterConfig) -> &Self {
        {
            let mut registry = self.shared.registry.lock();
            registry.max_listeners = usize::try_from(config.max_listeners).ok();
            registry.warn_on_limit = config.warn_on_limit;
        }
        self
    }

    /// Route registration diagnostics to `sink`.
    ///
    /// Install [`SilentSink`](crate::SilentSink) to discard them.
    pub fn with_diagnostics(self, sink: impl DiagnosticSink<K> + 'static) -> Self {
        self.shared.registry.lock().diagnostics = Arc::new(sink);
        self
    }

    /// Whether a scripting runtime is attached.
    pub fn has_runtime(&self) -> bool {
        self.shared.runtime.is_some()
    }

    /// Register `callback` for `event`.
    ///
    /// Registration always succeeds for valid callbacks; exceeding the
    /// maximum listener count only produces a diagnostic. A foreign value
    /// the runtime cannot call is handed to the recovery hook, or returned
    /// as [`EmitterError::NotCallable`] when no hook is installed.
    pub fn add_listener(
        &self,
        event: impl Into<K>,
        callback: impl Into<Callback<A, R::Value>>,
    ) -> Result<&Self> {
        let event = event.into();
        let Some(callback) = self.classify(&event, callback.into())? else {
            return Ok(self);
        };
        Ok(self.insert(event, callback, false))
    }

    /// Store a validated callback and report the max-listener diagnostic.
    ///
    /// `once` only marks foreign entries; native one-shots are wrappers.
    fn insert(&self, event: K, callback: Callback<A, R::Value>, once: bool) -> &Self {
        let exceeded = {
            let mut registry = self.shared.registry.lock();
            let count = match callback {
                Callback::Native(listener) => {
                    let listeners = registry.native.entry(event.clone()).or_default();
                    listeners.push(listener);
                    listeners.len()
                }
                Callback::Foreign(value) => {
                    let listeners = registry.foreign.entry(event.clone()).or_default();
                    listeners.push(ForeignEntry {
                        id: next_listener_id(),
                        value,
                        once,
                    });
                    listeners.len()
                }
            };
            registry
                .max_listeners
                .filter(|&max| registry.warn_on_limit && count > max)
                .map(|max| (max, count, Arc::clone(&registry.diagnostics)))
        };

        if let Some((limit, count, sink)) = exceeded {
            sink.listeners_exceeded(&event, limit, count);
        }
        debug!(event = ?event, once, "Listener registered");

        self
    }

    /// Alias for [`add_listener`](Self::add_listener).
    pub fn on(
        &self,
        event: impl Into<K>,
        callback: impl Into<Callback<A, R::Value>>,
    ) -> Result<&Self> {
        self.add_listener(event, callback)
    }

    /// Remove every registration of `callback` for `event`.
    ///
    /// Unknown events and absent callbacks are a no-op. Validation follows
    /// [`add_listener`](Self::add_listener).
    pub fn remove_listener(
        &self,
        event: impl Into<K>,
        callback: impl Into<Callback<A, R::Value>>,
    ) -> Result<&Self> {
        let event = event.into();
        let Some(callback) = self.classify(&event, callback.into())? else {
            return Ok(self);
        };

        let removed = {
            let mut registry = self.shared.registry.lock();
            match callback {
                Callback::Native(listener) => registry.native.get_mut(&event).map(|listeners| {
                    let before = listeners.len();
                    listeners.retain(|l| *l != listener);
                    before - listeners.len()
                }),
                Callback::Foreign(value) => registry.foreign.get_mut(&event).map(|listeners| {
                    let before = listeners.len();
                    listeners.retain(|entry| entry.once || entry.value != value);
                    before - listeners.len()
                }),
            }
        };
        debug!(event = ?event, removed = removed.unwrap_or(0), "Listener removed");

        Ok(self)
    }

    /// Alias for [`remove_listener`](Self::remove_listener).
    pub fn off(
        &self,
        event: impl Into<K>,
        callback: impl Into<Callback<A, R::Value>>,
    ) -> Result<&Self> {
        self.remove_listener(event, callback)
    }

    /// Register `callback` to run on the next emit of `event` only.
    ///
    /// A native callback is registered behind a wrapper that removes itself
    /// before forwarding, whatever the outcome of the forwarded call.
    /// Removing the original callback with
    /// [`remove_listener`](Self::remove_listener) does not remove the wrapper.
    ///
    /// A foreign callback is kept with the other foreign listeners and is
    /// removed when an emit dispatches it. An emit whose arguments fail to
    /// convert leaves it registered.
    pub fn once(
        &self,
        event: impl Into<K>,
        callback: impl Into<Callback<A, R::Value>>,
    ) -> Result<&Self> {
        let event = event.into();
        let Some(callback) = self.classify(&event, callback.into())? else {
            return Ok(self);
        };

        let listener = match callback {
            Callback::Native(listener) => listener,
            foreign @ Callback::Foreign(_) => return Ok(self.insert(event, foreign, true)),
        };

        let id = next_listener_id();
        let shared = Arc::downgrade(&self.shared);
        let key = event.clone();
        let wrapper = Listener::with_id(id, move |args| {
            unregister(&shared, &key, id);
            listener.invoke(args)
        });

        Ok(self.insert(event, Callback::Native(wrapper), false))
    }

    /// Invoke every listener registered for `event` with `args`.
    ///
    /// Listeners run concurrently in independent tasks; this waits for all of
    /// them. With a recovery hook installed each failure is passed to the hook
    /// and `emit` returns `Ok`. Without one, a listener panic is re-raised here
    /// once every task has finished, and a listener error is returned.
    ///
    /// If an argument cannot be converted for foreign listeners, they are
    /// skipped and the conversion error is returned after the native
    /// listeners complete.
    pub async fn emit(&self, event: impl Into<K>, args: impl Into<Vec<A>>) -> Result<&Self> {
        self.emit_event(event.into(), args.into()).await?;
        Ok(self)
    }

    #[tracing::instrument(name = "emitter.emit", skip_all, fields(event = ?event))]
    async fn emit_event(&self, event: K, args: Vec<A>) -> Result<()> {
        let (native, foreign, recoverer) = {
            let registry = self.shared.registry.lock();
            let native = registry.native.get(&event).cloned();
            let foreign = registry.foreign.get(&event).cloned();
            if native.is_none() && foreign.is_none() {
                return Ok(());
            }
            (
                native.unwrap_or_default(),
                foreign.unwrap_or_default(),
                registry.recoverer.clone(),
            )
        };

        let args: Arc<[A]> = Arc::from(args);
        let ctx = TaskContext {
            event,
            recoverer,
            runtime: self.shared.runtime.clone(),
        };

        let mut handles = Vec::with_capacity(native.len() + foreign.len());
        for listener in native {
            let invoked = listener.clone();
            let args = Arc::clone(&args);
            handles.push(dispatch::spawn_listener(
                ctx.clone(),
                Culprit::Native(listener),
                move || invoked.invoke(args),
            ));
        }

        let mut conversion = Ok(());
        if !foreign.is_empty() {
            match (&ctx.runtime, conversion_input::<A, R>(&ctx.runtime, &*args)) {
                (Some(runtime), Ok(values)) => {
                    for function in self.shared.claim_foreign(&ctx.event, foreign) {
                        let invocation = dispatch::call_foreign::<A, R>(
                            Arc::clone(runtime),
                            function.clone(),
                            Arc::clone(&values),
                        );
                        handles.push(dispatch::spawn_listener(
                            ctx.clone(),
                            Culprit::Foreign(function),
                            move || invocation,
                        ));
                    }
                }
                (_, Err(e)) => {
                    warn!(event = ?ctx.event, error = %e, "Skipping foreign listeners");
                    conversion = Err(e);
                }
                (None, Ok(_)) => {}
            }
        }

        debug!(tasks = handles.len(), "Dispatching listeners");
        dispatch::join_tasks(handles).await?;
        conversion
    }

    /// Install the recovery hook, replacing any previous one.
    pub fn recover_with<F>(&self, hook: F) -> &Self
    where
        F: Fn(&K, &ListenerRef<A>, &EmitterError) + Send + Sync + 'static,
    {
        self.shared.registry.lock().recoverer = Some(Arc::new(hook));
        self
    }

    /// Set the per-event listener count above which a warning is produced.
    ///
    /// `-1` (or any negative value) disables the warning.
    pub fn set_max_listeners(&self, max: i64) -> &Self {
        self.shared.registry.lock().max_listeners = usize::try_from(max).ok();
        self
    }

    /// Current listener limit; `None` when unlimited.
    pub fn max_listeners(&self) -> Option<usize> {
        self.shared.registry.lock().max_listeners
    }

    /// Drop every foreign registration. Native listeners are untouched.
    pub fn reset_foreign_listeners(&self) -> &Self {
        self.shared.registry.lock().foreign = HashMap::new();
        self
    }

    /// Number of native registrations for `event`, once-wrappers included.
    pub fn listener_count(&self, event: impl Into<K>) -> usize {
        let event = event.into();
        self.shared
            .registry
            .lock()
            .native
            .get(&event)
            .map_or(0, Vec::len)
    }

    /// Number of foreign registrations for `event`.
    pub fn foreign_listener_count(&self, event: impl Into<K>) -> usize {
        let event = event.into();
        self.shared
            .registry
            .lock()
            .foreign
            .get(&event)
            .map_or(0, Vec::len)
    }

    /// Validate a callback; `Ok(None)` means it was rejected and recovered.
    fn classify(
        &self,
        event: &K,
        callback: Callback<A, R::Value>,
    ) -> Result<Option<Callback<A, R::Value>>> {
        let value = match callback {
            Callback::Native(listener) => return Ok(Some(Callback::Native(listener))),
            Callback::Foreign(value) => value,
        };

        match &self.shared.runtime {
            None => self.reject(
                event,
                ListenerRef::Foreign(None),
                EmitterError::ForeignUnsupported,
            ),
            Some(runtime) if !runtime.is_callable(&value) => self.reject(
                event,
                ListenerRef::Foreign(runtime.export(&value)),
                EmitterError::NotCallable,
            ),
            Some(_) => Ok(Some(Callback::Foreign(value))),
        }
    }

    fn reject<T>(
        &self,
        event: &K,
        listener: ListenerRef<A>,
        err: EmitterError,
    ) -> Result<Option<T>> {
        let recoverer = self.shared.registry.lock().recoverer.clone();
        match recoverer {
            Some(hook) => {
                warn!(event = ?event, error = %err, "Rejected listener, recovering");
                hook(event, &listener, &err);
                Ok(None)
            }
            None => {
                error!(event = ?event, error = %err, "Rejected listener");
                Err(err)
            }
        }
    }
}

fn unregister<K, A, R>(shared: &Weak<Shared<K, A, R>>, event: &K, id: ListenerId)
where
    K: Eq + Hash,
    R: ScriptRuntime<A>,
{
    if let Some(shared) = shared.upgrade() {
        shared.remove_native(event, id);
    }
}

fn conversion_input<A, R>(runtime: &Option<Arc<R>>, args: &[A]) -> Result<Arc<[R::Value]>>
where
    R: ScriptRuntime<A>,
{
    match runtime {
        Some(runtime) => dispatch::convert_arguments::<A, R>(runtime.as_ref(), args),
        None => Err(EmitterError::ForeignUnsupported),
    }
}

impl<K, A, R: ScriptRuntime<A>> Clone for Emitter<K, A, R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, A, R> Default for Emitter<K, A, R>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    A: Send + Sync + 'static,
    R: ScriptRuntime<A>,
{
    /// An emitter with no scripting runtime attached.
    fn default() -> Self {
        Self::build(None)
    }
}

impl<K, A, R> Debug for Emitter<K, A, R>
where
    K: Debug,
    R: ScriptRuntime<A>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.shared.registry.lock();
        f.debug_struct("Emitter")
            .field("events", &registry.native.keys().collect::<Vec<_>>())
            .field("foreign_events", &registry.foreign.keys().collect::<Vec<_>>())
            .field("max_listeners", &registry.max_listeners)
            .field("runtime", &self.shared.runtime.is_some())
            .finish()
    }
}
