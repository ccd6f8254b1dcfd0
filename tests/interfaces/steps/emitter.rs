//! Emitter interface step definitions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cucumber::{given, then, when, World};
use fanout::test_utils::{
    counting_listener, panicking_listener, MockRuntime, MockValue, RecordingSink,
};
use fanout::{Callback, Emitter, EmitterError, Listener};
use parking_lot::Mutex;

type ScriptedEmitter = Emitter<String, String, MockRuntime>;

/// Test context for emitter scenarios.
#[derive(World)]
#[world(init = Self::new)]
pub struct EmitterWorld {
    emitter: ScriptedEmitter,
    sink: RecordingSink<String>,
    listeners: HashMap<String, (Listener<String>, Arc<AtomicUsize>)>,
    functions: HashMap<String, MockValue>,
    failures: Arc<Mutex<Vec<String>>>,
    last_emit: Option<Result<(), EmitterError>>,
    last_registration: Option<Result<(), EmitterError>>,
    anonymous: usize,
}

impl std::fmt::Debug for EmitterWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmitterWorld")
            .field("emitter", &self.emitter)
            .field("listeners", &self.listeners.keys().collect::<Vec<_>>())
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("last_emit", &self.last_emit)
            .field("last_registration", &self.last_registration)
            .finish()
    }
}

impl EmitterWorld {
    fn new() -> Self {
        let sink = RecordingSink::new();
        Self {
            emitter: Emitter::with_runtime(Arc::new(MockRuntime::new()))
                .with_diagnostics(sink.clone()),
            sink,
            listeners: HashMap::new(),
            functions: HashMap::new(),
            failures: Arc::new(Mutex::new(Vec::new())),
            last_emit: None,
            last_registration: None,
            anonymous: 0,
        }
    }

    fn listener(&self, name: &str) -> &(Listener<String>, Arc<AtomicUsize>) {
        self.listeners
            .get(name)
            .unwrap_or_else(|| panic!("no listener named {name}"))
    }

    fn function(&self, name: &str) -> &MockValue {
        self.functions
            .get(name)
            .unwrap_or_else(|| panic!("no script function named {name}"))
    }

    async fn emit(&mut self, event: String, args: Vec<String>) {
        let result = self.emitter.emit(event, args).await.map(|_| ());
        self.last_emit = Some(result);
    }
}

// ==========================================================================
// Given Steps
// ==========================================================================

#[given("an emitter with a script runtime")]
async fn given_emitter(world: &mut EmitterWorld) {
    assert!(world.emitter.has_runtime());
}

#[given(expr = "a listener {string} on {string}")]
async fn given_listener(world: &mut EmitterWorld, name: String, event: String) {
    let (listener, count) = counting_listener();
    world.emitter.on(event, listener.clone()).unwrap();
    world.listeners.insert(name, (listener, count));
}

#[given(expr = "the listener {string} is added again on {string}")]
async fn given_listener_again(world: &mut EmitterWorld, name: String, event: String) {
    let listener = world.listener(&name).0.clone();
    world.emitter.on(event, listener).unwrap();
}

#[given(expr = "a once listener {string} on {string}")]
async fn given_once_listener(world: &mut EmitterWorld, name: String, event: String) {
    let (listener, count) = counting_listener();
    world.emitter.once(event, listener.clone()).unwrap();
    world.listeners.insert(name, (listener, count));
}

#[given(expr = "a panicking listener {string} on {string}")]
async fn given_panicking_listener(world: &mut EmitterWorld, name: String, event: String) {
    let listener = panicking_listener("listener panicked");
    world.emitter.on(event, listener.clone()).unwrap();
    world
        .listeners
        .insert(name, (listener, Arc::new(AtomicUsize::new(0))));
}

#[given(expr = "a failing listener {string} on {string}")]
async fn given_failing_listener(world: &mut EmitterWorld, name: String, event: String) {
    let message = format!("{name} failed");
    let listener = Listener::fallible(move |_args| {
        let message = message.clone();
        async move { Err(message) }
    });
    world.emitter.on(event, listener.clone()).unwrap();
    world
        .listeners
        .insert(name, (listener, Arc::new(AtomicUsize::new(0))));
}

#[given("a recovery hook")]
async fn given_recovery_hook(world: &mut EmitterWorld) {
    let failures = Arc::clone(&world.failures);
    world.emitter.recover_with(move |event, _listener, err| {
        failures.lock().push(format!("{event}: {err}"));
    });
}

#[given(expr = "the maximum listener count is {int}")]
async fn given_max_listeners(world: &mut EmitterWorld, max: i64) {
    world.emitter.set_max_listeners(max);
}

#[given(expr = "a script function {string} on {string}")]
async fn given_script_function(world: &mut EmitterWorld, name: String, event: String) {
    let function = MockValue::function(name.clone());
    world
        .emitter
        .on(event, Callback::Foreign(function.clone()))
        .unwrap();
    world.functions.insert(name, function);
}

#[given(expr = "a once script function {string} on {string}")]
async fn given_once_script_function(world: &mut EmitterWorld, name: String, event: String) {
    let function = MockValue::function(name.clone());
    world
        .emitter
        .once(event, Callback::Foreign(function.clone()))
        .unwrap();
    world.functions.insert(name, function);
}

// ==========================================================================
// When Steps
// ==========================================================================

#[when(expr = "{string} is emitted {int} times")]
async fn when_emitted(world: &mut EmitterWorld, event: String, times: usize) {
    for _ in 0..times {
        world.emit(event.clone(), Vec::new()).await;
        if matches!(world.last_emit, Some(Err(_))) {
            break;
        }
    }
}

#[when(expr = "{string} is emitted with {string} and {string}")]
async fn when_emitted_with(world: &mut EmitterWorld, event: String, first: String, second: String) {
    world.emit(event, vec![first, second]).await;
}

#[when(expr = "{string} is removed from {string}")]
async fn when_removed(world: &mut EmitterWorld, name: String, event: String) {
    let listener = world.listener(&name).0.clone();
    world.emitter.off(event, listener).unwrap();
}

#[when(expr = "{int} listeners are added on {string}")]
async fn when_many_added(world: &mut EmitterWorld, count: usize, event: String) {
    for _ in 0..count {
        let (listener, hits) = counting_listener();
        world.emitter.on(event.clone(), listener.clone()).unwrap();
        world.anonymous += 1;
        world
            .listeners
            .insert(format!("anonymous-{}", world.anonymous), (listener, hits));
    }
}

#[when(expr = "the script number {int} is added on {string}")]
async fn when_script_number_added(world: &mut EmitterWorld, number: i64, event: String) {
    let result = world
        .emitter
        .on(event, Callback::Foreign(MockValue::Int(number)))
        .map(|_| ());
    world.last_registration = Some(result);
}

#[when("foreign listeners are reset")]
async fn when_foreign_reset(world: &mut EmitterWorld) {
    world.emitter.reset_foreign_listeners();
}

// ==========================================================================
// Then Steps
// ==========================================================================

#[then("the emit succeeds")]
async fn then_emit_succeeds(world: &mut EmitterWorld) {
    match &world.last_emit {
        Some(Ok(())) => {}
        other => panic!("expected successful emit, got {other:?}"),
    }
}

#[then(expr = "the emit fails with {string}")]
async fn then_emit_fails(world: &mut EmitterWorld, message: String) {
    match &world.last_emit {
        Some(Err(e)) => assert_eq!(e.to_string(), message),
        other => panic!("expected failed emit, got {other:?}"),
    }
}

#[then(expr = "{string} has been called {int} times")]
async fn then_called(world: &mut EmitterWorld, name: String, times: usize) {
    let count = world.listener(&name).1.load(Ordering::SeqCst);
    assert_eq!(count, times, "listener {name}");
}

#[then(expr = "{string} has {int} native listeners")]
async fn then_native_count(world: &mut EmitterWorld, event: String, count: usize) {
    assert_eq!(world.emitter.listener_count(event), count);
}

#[then(expr = "{string} has {int} foreign listeners")]
async fn then_foreign_count(world: &mut EmitterWorld, event: String, count: usize) {
    assert_eq!(world.emitter.foreign_listener_count(event), count);
}

#[then(expr = "the recovery hook saw {int} failures")]
async fn then_hook_failures(world: &mut EmitterWorld, count: usize) {
    assert_eq!(world.failures.lock().len(), count);
}

#[then(expr = "a warning was recorded for {string} with limit {int} and count {int}")]
async fn then_warning(world: &mut EmitterWorld, event: String, limit: usize, count: usize) {
    assert_eq!(world.sink.warnings(), vec![(event, limit, count)]);
}

#[then("no warning was recorded")]
async fn then_no_warning(world: &mut EmitterWorld) {
    assert!(world.sink.warnings().is_empty());
}

#[then(expr = "script function {string} was called {int} times with {int} arguments")]
async fn then_function_called(world: &mut EmitterWorld, name: String, times: usize, arity: usize) {
    let function = world.function(&name).as_function().unwrap().clone();
    let calls = function.calls();
    assert_eq!(calls.len(), times, "script function {name}");
    assert!(calls.iter().all(|args| args.len() == arity));
}

#[then(expr = "registration fails with {string}")]
async fn then_registration_fails(world: &mut EmitterWorld, message: String) {
    match &world.last_registration {
        Some(Err(e)) => assert_eq!(e.to_string(), message),
        other => panic!("expected failed registration, got {other:?}"),
    }
}

#[then("registration succeeds")]
async fn then_registration_succeeds(world: &mut EmitterWorld) {
    assert!(matches!(world.last_registration, Some(Ok(()))));
}
