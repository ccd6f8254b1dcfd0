//! Test utilities and mock implementations.
//!
//! This module provides a scripted stand-in for an embedded scripting
//! runtime, plus small listener and sink helpers, so emitter behavior can
//! be tested without a real interpreter.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ScriptError;
use crate::interfaces::{DiagnosticSink, ScriptRuntime};
use crate::listener::Listener;

/// What a mock function does when called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Behavior {
    /// Record the call and return null.
    Record,
    /// Return a runtime error with this message.
    Fail(String),
    /// Panic inside the runtime with this message.
    Panic(String),
}

/// A function value owned by [`MockRuntime`].
///
/// Clones share the call log; equality is by name.
#[derive(Clone)]
pub struct MockFunction {
    name: String,
    behavior: Behavior,
    calls: Arc<Mutex<Vec<Vec<MockValue>>>>,
}

impl MockFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of times the function has been called.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Arguments of every call, in call order.
    pub fn calls(&self) -> Vec<Vec<MockValue>> {
        self.calls.lock().clone()
    }
}

impl PartialEq for MockFunction {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl fmt::Debug for MockFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockFunction")
            .field("name", &self.name)
            .field("behavior", &self.behavior)
            .finish()
    }
}

/// Value in the mock runtime's universe.
#[derive(Debug, Clone, PartialEq)]
pub enum MockValue {
    Null,
    Int(i64),
    Text(String),
    Function(MockFunction),
}

impl MockValue {
    pub fn function(name: impl Into<String>) -> Self {
        Self::scripted(name, Behavior::Record)
    }

    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::scripted(name, Behavior::Fail(message.into()))
    }

    pub fn panicking(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::scripted(name, Behavior::Panic(message.into()))
    }

    fn scripted(name: impl Into<String>, behavior: Behavior) -> Self {
        Self::Function(MockFunction {
            name: name.into(),
            behavior,
            calls: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// The function behind this value, if it is one.
    pub fn as_function(&self) -> Option<&MockFunction> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }
}

/// Scripted runtime whose host argument type is `String`.
#[derive(Debug, Default)]
pub struct MockRuntime {
    fail_conversion: AtomicBool,
    calls: AtomicUsize,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent argument conversion fail.
    pub fn set_fail_conversion(&self, fail: bool) {
        self.fail_conversion.store(fail, Ordering::SeqCst);
    }

    /// Total calls made through this runtime.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ScriptRuntime<String> for MockRuntime {
    type Value = MockValue;

    fn is_callable(&self, value: &MockValue) -> bool {
        matches!(value, MockValue::Function(_))
    }

    fn to_value(&self, arg: &String) -> Result<MockValue, ScriptError> {
        if self.fail_conversion.load(Ordering::SeqCst) {
            return Err(ScriptError::new(format!("cannot convert {arg:?}")));
        }
        Ok(match arg.parse::<i64>() {
            Ok(n) => MockValue::Int(n),
            Err(_) => MockValue::Text(arg.clone()),
        })
    }

    fn call(&self, function: &MockValue, args: &[MockValue]) -> Result<MockValue, ScriptError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let MockValue::Function(f) = function else {
            return Err(ScriptError::new("TypeError: value is not a function"));
        };

        f.calls.lock().push(args.to_vec());
        match &f.behavior {
            Behavior::Record => Ok(MockValue::Null),
            Behavior::Fail(message) => Err(ScriptError::new(message.clone())),
            Behavior::Panic(message) => panic!("{}", message),
        }
    }

    fn export(&self, value: &MockValue) -> Option<String> {
        match value {
            MockValue::Null => None,
            MockValue::Int(n) => Some(n.to_string()),
            MockValue::Text(s) => Some(s.clone()),
            MockValue::Function(f) => Some(format!("function {}", f.name)),
        }
    }
}

/// Listener that counts its invocations.
pub fn counting_listener<A: Send + Sync + 'static>() -> (Listener<A>, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    let listener = Listener::new(move |_args| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });
    (listener, count)
}

/// Listener that panics with `message` every time it runs.
pub fn panicking_listener<A: Send + Sync + 'static>(message: &'static str) -> Listener<A> {
    Listener::new(move |_args| async move { panic!("{}", message) })
}

/// Diagnostic sink that records every max-listener warning.
#[derive(Debug)]
pub struct RecordingSink<K> {
    warnings: Arc<Mutex<Vec<(K, usize, usize)>>>,
}

impl<K> RecordingSink<K> {
    pub fn new() -> Self {
        Self {
            warnings: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<K: Clone> RecordingSink<K> {
    /// Recorded `(event, limit, count)` triples, oldest first.
    pub fn warnings(&self) -> Vec<(K, usize, usize)> {
        self.warnings.lock().clone()
    }
}

impl<K> Default for RecordingSink<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Clone for RecordingSink<K> {
    fn clone(&self) -> Self {
        Self {
            warnings: Arc::clone(&self.warnings),
        }
    }
}

impl<K: Clone + Send + Sync> DiagnosticSink<K> for RecordingSink<K> {
    fn listeners_exceeded(&self, event: &K, limit: usize, count: usize) {
        self.warnings.lock().push((event.clone(), limit, count));
    }
}
