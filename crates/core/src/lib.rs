//! Core library for the container-image build orchestrator
//!
//! This crate owns the plugin pipeline engine, the workflow state machine
//! that drives one build end to end, the execution-environment dispatcher,
//! and the built-in collaborator implementations (tasker, source fetcher)
//! that make the crate runnable without any external plugin files.

pub mod dispatcher;
pub mod errors;
pub mod image_ref;
pub mod plugin;
pub mod source;
pub mod substitution;
pub mod tasker;
pub mod workflow;

pub use indexmap::IndexMap;

/// The crate's version, as declared in `Cargo.toml`.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let version = version();
        assert!(!version.is_empty());
        assert!(version.contains('.'));
    }
}
