//! Error types and handling
//!
//! Domain-specific error types for the build orchestrator. Plugin faults are
//! captured and rendered to strings by the runner (see `plugin::runner`) and
//! never reach this enum directly except as `PhaseFailed`. An unresolved
//! plugin name is not an error variant at all: the runner logs and skips it,
//! per §4.2 ("skipped with a logged error, never fatal by themselves").

use thiserror::Error;

/// Domain errors for the build orchestrator.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// A plugin configuration entry was malformed (missing `name`, non-mapping `args`, ...).
    #[error("invalid plugin configuration: {message}")]
    Config { message: String },

    /// One or more non-tolerated plugins raised during a phase run.
    #[error("{message}")]
    PhaseFailed { message: String },

    /// The tasker, source-fetcher, or registry push failed; terminates the workflow.
    #[error("workflow fatal error: {message}")]
    WorkflowFatal { message: String },

    /// Image reference could not be parsed.
    #[error("invalid image reference '{reference}': {reason}")]
    InvalidImageRef { reference: String, reason: String },

    /// Dotted-path substitution override addressed something that does not exist.
    #[error("invalid substitution path '{path}': {reason}")]
    InvalidSubstitution { path: String, reason: String },

    /// An extra plugin library failed to load or register.
    #[error("failed to load plugin file '{path}': {reason}")]
    PluginLoad { path: String, reason: String },

    /// I/O failure underlying any of the above.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results with `OrchestratorError`.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
