//! Plugin pipeline engine
//!
//! This module is the hard core of the orchestrator: dynamic plugin
//! discovery ([`registry`]), per-phase ordered execution ([`runner`]),
//! input-plugin auto-selection ([`input_runner`]), and build-phase runtime
//! placeholder substitution ([`build_runner`]).
//!
//! ## Plugin architecture
//!
//! A plugin is identified by a unique `key` within its [`Phase`]. Every
//! instantiated plugin, regardless of which phase it belongs to, exposes the
//! same zero-argument [`PluginInstance::run`] entry point — only the
//! *construction* step differs between input plugins (args only) and
//! build-phase plugins (tasker + workflow + args). [`runner::run_phase`]
//! is therefore written once, against [`BoundPluginEntry`], and both
//! [`input_runner`] and [`build_runner`] bind their phase-specific
//! descriptors down to that shape before delegating to it.

pub mod build_runner;
pub mod builtin;
pub mod input_runner;
pub mod registry;
pub mod runner;

use crate::errors::Result;
use crate::tasker::Tasker;
use crate::workflow::SharedWorkflowState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The four ordered plugin stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Input,
    PreBuild,
    PrePublish,
    PostBuild,
}

impl Phase {
    /// All phases, in execution order.
    pub const ALL: [Phase; 4] = [
        Phase::Input,
        Phase::PreBuild,
        Phase::PrePublish,
        Phase::PostBuild,
    ];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Input => "input",
            Phase::PreBuild => "pre-build",
            Phase::PrePublish => "pre-publish",
            Phase::PostBuild => "post-build",
        };
        write!(f, "{}", s)
    }
}

/// One configured plugin invocation within a phase's plugin list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfigEntry {
    pub name: String,
    #[serde(default)]
    pub args: Option<serde_json::Value>,
    #[serde(default)]
    pub can_fail: Option<bool>,
}

impl PluginConfigEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: None,
            can_fail: None,
        }
    }

    pub fn with_args(mut self, args: serde_json::Value) -> Self {
        self.args = Some(args);
        self
    }

    pub fn with_can_fail(mut self, can_fail: bool) -> Self {
        self.can_fail = Some(can_fail);
        self
    }

    /// Args as a mapping, defaulting to empty. Returns `None` if `args` was
    /// configured but is not itself a JSON object (malformed configuration).
    pub fn args_as_map(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
        match &self.args {
            None => Some(serde_json::Map::new()),
            Some(serde_json::Value::Object(map)) => Some(map.clone()),
            Some(_) => None,
        }
    }
}

/// Sentinel input-plugin name that triggers auto-selection (§4.4).
pub const AUTO_INPUT_NAME: &str = "auto";
/// Result key under which the auto-selected input plugin's output is stored.
pub const AUTO_INPUT_KEY: &str = "auto";

/// An instantiated plugin of any phase, ready to `run()`. Input plugins
/// return a build specification; build-phase plugins return any
/// serializable value.
#[async_trait]
pub trait PluginInstance: Send + Sync {
    async fn run(&self) -> Result<serde_json::Value>;
}

/// Registration-time descriptor for an input plugin.
#[derive(Clone)]
pub struct InputPluginDescriptor {
    pub key: String,
    pub can_fail_default: bool,
    /// Class-level usability probe; takes no instance args, matching the
    /// original's `is_autousable()` classmethod.
    pub is_usable_here: fn() -> bool,
    pub construct:
        fn(serde_json::Map<String, serde_json::Value>) -> Result<Box<dyn PluginInstance>>,
}

/// Registration-time descriptor for a build-phase plugin.
#[derive(Clone)]
pub struct BuildPluginDescriptor {
    pub key: String,
    pub phase: Phase,
    pub can_fail_default: bool,
    pub construct: fn(
        Arc<dyn Tasker>,
        SharedWorkflowState,
        serde_json::Map<String, serde_json::Value>,
    ) -> Result<Box<dyn PluginInstance>>,
}

/// A phase-agnostic, already-bound plugin entry: everything the general
/// runner (§4.2) needs to resolve fatality and instantiate a plugin, with
/// any phase-specific construction arguments (tasker, workflow, ...) already
/// captured in the closure.
pub struct BoundPluginEntry {
    pub key: String,
    pub can_fail_default: bool,
    pub instantiate:
        Box<dyn Fn(serde_json::Map<String, serde_json::Value>) -> Result<Box<dyn PluginInstance>> + Send + Sync>,
}
