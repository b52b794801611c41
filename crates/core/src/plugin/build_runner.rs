//! Build-phase plugin runner (§4.3)
//!
//! Binds [`BuildPluginDescriptor`]s to the shared tasker and workflow state,
//! substitutes runtime placeholders into configured plugin args, and
//! delegates to the general runner.
//!
//! Grounded on `BuildPluginsRunner.create_instance_from_plugin` (adds
//! tasker/workflow to the constructed instance) and
//! `BuildPluginsRunner._translate_special_values` (the placeholder walk).

use super::runner::run_phase;
use super::{BoundPluginEntry, BuildPluginDescriptor, PluginConfigEntry};
use crate::errors::Result;
use crate::tasker::Tasker;
use crate::workflow::SharedWorkflowState;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Runtime placeholder tokens substituted into plugin args before
/// construction (§4.3). Substitution only replaces a string value that is
/// *exactly* one of these tokens; it never rewrites inside a larger string,
/// a map key, or a non-string scalar (§9).
const BUILT_IMAGE_ID: &str = "BUILT_IMAGE_ID";
const BUILD_DOCKERFILE_PATH: &str = "BUILD_DOCKERFILE_PATH";
const BUILD_SOURCE_PATH: &str = "BUILD_SOURCE_PATH";
const BASE_IMAGE: &str = "BASE_IMAGE";

/// Binds a set of build-phase plugin descriptors to one workflow's tasker
/// and state, and runs configured plugin lists against them.
pub struct BuildRunner {
    tasker: Arc<dyn Tasker>,
    state: SharedWorkflowState,
    plugins: Vec<BuildPluginDescriptor>,
}

impl BuildRunner {
    pub fn new(
        tasker: Arc<dyn Tasker>,
        state: SharedWorkflowState,
        plugins: Vec<BuildPluginDescriptor>,
    ) -> Self {
        Self {
            tasker,
            state,
            plugins,
        }
    }

    /// Run `configured` against the bound plugins, writing outcomes into
    /// `results`.
    pub async fn run(
        &mut self,
        configured: &[PluginConfigEntry],
        results: &mut IndexMap<String, serde_json::Value>,
    ) -> Result<()> {
        let substitutions = self.current_substitutions().await;
        let substituted: Vec<PluginConfigEntry> = configured
            .iter()
            .map(|entry| {
                let mut entry = entry.clone();
                if let Some(args) = &entry.args {
                    entry.args = Some(substitute(args, &substitutions));
                }
                entry
            })
            .collect();

        let mut bound: HashMap<String, BoundPluginEntry> = HashMap::new();
        for descriptor in &self.plugins {
            let tasker = self.tasker.clone();
            let state = self.state.clone();
            let construct = descriptor.construct;
            bound.insert(
                descriptor.key.clone(),
                BoundPluginEntry {
                    key: descriptor.key.clone(),
                    can_fail_default: descriptor.can_fail_default,
                    instantiate: Box::new(move |args| construct(tasker.clone(), state.clone(), args)),
                },
            );
        }

        run_phase(&substituted, &bound, results).await
    }

    async fn current_substitutions(&self) -> HashMap<&'static str, String> {
        let state = self.state.lock().await;
        let mut subs = HashMap::new();
        if let Some(id) = &state.built_image_id {
            subs.insert(BUILT_IMAGE_ID, id.clone());
        }
        if let Some(source) = &state.source {
            subs.insert(
                BUILD_DOCKERFILE_PATH,
                source.recipe_path.display().to_string(),
            );
            subs.insert(BUILD_SOURCE_PATH, source.root_path.display().to_string());
        }
        if let Some(base) = &state.base_image {
            subs.insert(BASE_IMAGE, base.canonical());
        }
        subs
    }
}

/// Deep-copy `value`, replacing any string that is exactly one of
/// `substitutions`' keys with the corresponding value. Object keys and
/// non-string scalars are left untouched.
fn substitute(
    value: &serde_json::Value,
    substitutions: &HashMap<&'static str, String>,
) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => substitutions
            .get(s.as_str())
            .map(|replacement| serde_json::Value::String(replacement.clone()))
            .unwrap_or_else(|| value.clone()),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(|v| substitute(v, substitutions)).collect())
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, substitutions)))
                .collect(),
        ),
        other => other.clone(),
    }
}
