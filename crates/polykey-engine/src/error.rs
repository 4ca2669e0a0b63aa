//! Error types for engine lifecycle operations.

use thiserror::Error;

/// Errors that can occur while building or running an [`Engine`](crate::Engine).
#[derive(Debug, Error)]
pub enum EngineError {
    /// A setting is outside its valid range.
    #[error("invalid engine setting '{field}': {reason}")]
    InvalidSetting {
        /// Name of the setting.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The scheduler is already running.
    #[error("control scheduler is already running")]
    AlreadyRunning,

    /// The operation needs the scheduler stopped.
    #[error("control scheduler is running; stop it before stepping manually")]
    SchedulerRunning,

    /// The scheduler thread could not be spawned.
    #[error("failed to spawn control scheduler thread")]
    Spawn(#[source] std::io::Error),

    /// The scheduler thread panicked; the control state is lost.
    #[error("control scheduler thread panicked")]
    SchedulerPanicked,
}

impl EngineError {
    /// Create an invalid-setting error.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            field,
            reason: reason.into(),
        }
    }
}
