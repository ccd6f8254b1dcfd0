//! Scripting runtime interface.
//!
//! Foreign listeners are opaque values owned by an embedded, dynamically
//! typed runtime. The emitter never looks inside them; everything it needs
//! goes through the four operations below.

use std::fmt::Debug;

use crate::error::ScriptError;

/// Embedded scripting runtime that can host foreign listeners.
///
/// `A` is the host argument type passed to [`Emitter::emit`](crate::Emitter::emit).
///
/// # Example
///
/// ```ignore
/// struct Lua { vm: mlua::Lua }
///
/// impl ScriptRuntime<String> for Lua {
///     type Value = LuaHandle;
///
///     fn is_callable(&self, value: &LuaHandle) -> bool { value.is_function() }
///     fn to_value(&self, arg: &String) -> Result<LuaHandle, ScriptError> { /* ... */ }
///     fn call(&self, f: &LuaHandle, args: &[LuaHandle]) -> Result<LuaHandle, ScriptError> {
///         /* ... */
///     }
///     fn export(&self, value: &LuaHandle) -> Option<String> { /* ... */ }
/// }
/// ```
pub trait ScriptRuntime<A>: Send + Sync + 'static {
    /// Opaque runtime value. Equality is used to remove foreign listeners.
    type Value: Clone + PartialEq + Debug + Send + Sync + 'static;

    /// Whether `value` can currently be called.
    fn is_callable(&self, value: &Self::Value) -> bool;

    /// Convert a host argument into the runtime's representation.
    fn to_value(&self, arg: &A) -> Result<Self::Value, ScriptError>;

    /// Call `function` with a null receiver.
    ///
    /// Runs on tokio's blocking pool; it may block.
    fn call(
        &self,
        function: &Self::Value,
        args: &[Self::Value],
    ) -> Result<Self::Value, ScriptError>;

    /// Export a runtime value back into a host value, if representable.
    fn export(&self, value: &Self::Value) -> Option<A>;
}

/// Runtime type of an emitter that hosts only native listeners.
///
/// Its value type has no inhabitants, so foreign callbacks cannot be built.
#[derive(Debug, Clone, Copy)]
pub enum Detached {}

/// Value type of [`Detached`]; uninhabited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachedValue {}

impl<A: 'static> ScriptRuntime<A> for Detached {
    type Value = DetachedValue;

    fn is_callable(&self, value: &DetachedValue) -> bool {
        match *value {}
    }

    fn to_value(&self, _arg: &A) -> Result<DetachedValue, ScriptError> {
        Err(ScriptError::new("no scripting runtime attached"))
    }

    fn call(
        &self,
        function: &DetachedValue,
        _args: &[DetachedValue],
    ) -> Result<DetachedValue, ScriptError> {
        match *function {}
    }

    fn export(&self, value: &DetachedValue) -> Option<A> {
        match *value {}
    }
}
