//! Runtime error types.

use thiserror::Error;

use ingot_framework::ModuleError;

use crate::config::ConfigError;

/// Errors that abort bot startup or the event loop.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A module failed to initialize (including a double installation of
    /// the enable/disable gate, which is fatal by design).
    #[error(transparent)]
    Module(#[from] ModuleError),
}
