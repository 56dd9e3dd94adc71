//! Error types for the Ingot framework.

use thiserror::Error;

/// Boxed error type used at the handler boundary.
///
/// Handlers may fail with any error; the bus logs the failure and moves on
/// to the next registration, so the concrete type is never inspected.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while wiring the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// A module gate is already installed.
    ///
    /// Two gates would have no sensible precedence between them, so the
    /// second installation is a configuration error, not something to paper
    /// over.
    #[error("a module gate is already installed")]
    GateAlreadyInstalled,
}

/// Errors raised during module initialization.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Bus wiring failed (e.g. double gate installation).
    #[error(transparent)]
    Bus(#[from] BusError),

    /// Module-specific initialization failure.
    #[error("module init failed: {0}")]
    Init(String),
}

/// Errors raised by the conversation-session registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// A waiter is already pending for this conversation key.
    #[error("a conversation is already active for this key")]
    AlreadyActive,
}
