//! Fanout - in-process event emitter
//!
//! Callers register listeners against arbitrary event keys, then emit a key
//! with a list of arguments. Every listener registered for that key runs in
//! its own tokio task; `emit` waits for all of them.
//!
//! Listeners come in two variants: native closures ([`Listener`]) and
//! foreign values owned by an embedded scripting runtime
//! ([`ScriptRuntime`]). Failures are isolated per listener and can be
//! intercepted by a single recovery hook.
//!
//! Applications embedding the emitter call
//! [`utils::bootstrap::init_tracing`] once at startup so emitter warnings,
//! including the max-listener diagnostic, reach a subscriber filtered by
//! `FANOUT_LOG`.

pub mod config;
pub mod emitter;
pub mod error;
pub mod interfaces;
pub mod listener;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod utils;

pub use config::{ConfigError, EmitterConfig};
pub use emitter::{Emitter, RecoveryHook, DEFAULT_MAX_LISTENERS};
pub use error::{EmitterError, Result, ScriptError};
pub use interfaces::{Detached, DiagnosticSink, ScriptRuntime, SilentSink, TracingSink};
pub use listener::{Callback, Listener, ListenerId, ListenerRef};
