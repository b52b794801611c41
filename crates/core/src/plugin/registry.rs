//! Plugin discovery and loading
//!
//! Grounded on `PluginsRunner.load_plugins`: the original walks a directory,
//! `imp.load_source`s every `.py` file in it, and registers every subclass
//! of the relevant base class it finds. Rust has no safe equivalent of
//! `imp.load_source`, so discovery here is split in two:
//!
//! - built-in plugins are compiled in and registered eagerly from
//!   [`super::builtin`];
//! - "extra" plugins are `cdylib`s loaded at runtime with [`libloading`],
//!   each exposing a single `extern "C"` entry point that registers its
//!   descriptors into a [`PluginRegistryBuilder`].
//!
//! A later registration with the same `key` overwrites an earlier one
//! (last-writer-wins), logged at `warn` level, matching the original's
//! dict-keyed plugin class map.

use super::{BuildPluginDescriptor, InputPluginDescriptor, Phase};
use crate::errors::{OrchestratorError, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// The symbol every extra plugin library must export.
///
/// Signature: `extern "C" fn(&mut PluginRegistryBuilder)`. Extra plugin
/// libraries must be built against the same core crate version; this is a
/// same-process convenience loader, not a stable ABI boundary.
const REGISTER_SYMBOL: &[u8] = b"register_plugins";

type RegisterFn = unsafe extern "C" fn(&mut PluginRegistryBuilder);

/// Accumulates descriptors during registration, from built-ins and from
/// every loaded extra plugin library in turn.
#[derive(Default)]
pub struct PluginRegistryBuilder {
    input: HashMap<String, InputPluginDescriptor>,
    build: HashMap<String, BuildPluginDescriptor>,
}

impl PluginRegistryBuilder {
    pub fn register_input(&mut self, descriptor: InputPluginDescriptor) {
        if self.input.contains_key(&descriptor.key) {
            warn!("input plugin '{}' redefined, overwriting", descriptor.key);
        }
        self.input.insert(descriptor.key.clone(), descriptor);
    }

    pub fn register_build(&mut self, descriptor: BuildPluginDescriptor) {
        if self.build.contains_key(&descriptor.key) {
            warn!("build plugin '{}' redefined, overwriting", descriptor.key);
        }
        self.build.insert(descriptor.key.clone(), descriptor);
    }
}

/// A resolved, queryable set of loaded plugins for one orchestrator run.
pub struct PluginRegistry {
    input: Vec<InputPluginDescriptor>,
    build: Vec<BuildPluginDescriptor>,
    // Keeps every loaded library alive for the registry's lifetime; dropping
    // it would unmap code our descriptors' function pointers point into.
    _libraries: Vec<libloading::Library>,
}

impl PluginRegistry {
    /// Build a registry from the compiled-in built-ins plus any extra
    /// plugin library files. A failing extra-plugin file is logged and
    /// skipped, not fatal to the whole registry (per §4.1).
    pub fn load(extra_plugin_files: &[std::path::PathBuf]) -> Result<Self> {
        let mut builder = PluginRegistryBuilder::default();
        super::builtin::register_all(&mut builder);

        let mut libraries = Vec::new();
        for path in extra_plugin_files {
            match load_extra_plugin_file(path, &mut builder) {
                Ok(lib) => libraries.push(lib),
                Err(e) => warn!("skipping extra plugin file '{}': {}", path.display(), e),
            }
        }

        Ok(Self {
            input: builder.input.into_values().collect(),
            build: builder.build.into_values().collect(),
            _libraries: libraries,
        })
    }

    /// Registry with only the compiled-in built-ins, no extra files.
    pub fn builtins_only() -> Self {
        Self::load(&[]).expect("builtins-only load cannot fail")
    }

    /// All loaded input plugin descriptors.
    pub fn load_input(&self) -> Vec<InputPluginDescriptor> {
        self.input.clone()
    }

    /// Loaded build-phase plugin descriptors for one phase, in no
    /// particular order (execution order comes from the configured list,
    /// not from registration order).
    pub fn load_build(&self, phase: Phase) -> Vec<BuildPluginDescriptor> {
        self.build
            .iter()
            .filter(|d| d.phase == phase)
            .cloned()
            .collect()
    }
}

#[allow(unsafe_code)]
fn load_extra_plugin_file(
    path: &Path,
    builder: &mut PluginRegistryBuilder,
) -> Result<libloading::Library> {
    // SAFETY: loading and invoking an arbitrary shared library is inherently
    // unsafe; we require extra plugin files to be trusted, same-version
    // build artifacts (documented in the operator-facing plugin guide).
    unsafe {
        let lib = libloading::Library::new(path).map_err(|e| OrchestratorError::PluginLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let register: libloading::Symbol<RegisterFn> =
            lib.get(REGISTER_SYMBOL)
                .map_err(|e| OrchestratorError::PluginLoad {
                    path: path.display().to_string(),
                    reason: format!("missing `register_plugins` symbol: {}", e),
                })?;
        register(builder);
        Ok(lib)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_only_registers_something_in_every_phase_but_input() {
        let registry = PluginRegistry::builtins_only();
        assert!(!registry.load_input().is_empty());
        assert!(!registry.load_build(Phase::PostBuild).is_empty());
    }

    #[test]
    fn unknown_extra_plugin_file_is_skipped_not_fatal() {
        let registry = PluginRegistry::load(&[std::path::PathBuf::from(
            "/nonexistent/plugin.so",
        )])
        .unwrap();
        assert!(!registry.load_input().is_empty());
    }
}
