//! Abstract interfaces for emitter collaborators.
//!
//! These traits define the contracts for:
//! - Scripting runtimes (foreign listeners)
//! - Diagnostic sinks (max-listener warnings)

pub mod diagnostics;
pub mod script;

pub use diagnostics::{DiagnosticSink, SilentSink, TracingSink};
pub use script::{Detached, DetachedValue, ScriptRuntime};
