//! Emitter error types.

/// Result type for emitter operations.
pub type Result<T> = std::result::Result<T, EmitterError>;

/// Errors that can occur while registering or dispatching listeners.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmitterError {
    /// The value offered as a listener cannot be invoked.
    #[error("Kind of value for listener is not callable")]
    NotCallable,

    /// A foreign listener was offered to an emitter with no scripting runtime.
    #[error("Foreign listeners require a scripting runtime")]
    ForeignUnsupported,

    #[error("Listener failed: {message}")]
    ListenerFailed { message: String },

    #[error("Failed to convert argument {index} for foreign listeners")]
    ArgumentConversion {
        index: usize,
        #[source]
        source: ScriptError,
    },
}

impl EmitterError {
    /// Build a listener failure from anything displayable.
    pub fn listener_failed(message: impl std::fmt::Display) -> Self {
        Self::ListenerFailed {
            message: message.to_string(),
        }
    }

    /// Build a listener failure from a caught panic payload.
    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(msg) = payload.downcast_ref::<&'static str>() {
            (*msg).to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "unknown panic".to_string()
        };
        Self::ListenerFailed { message }
    }
}

/// Error raised by a scripting runtime while converting or calling values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ScriptError {
    message: String,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
