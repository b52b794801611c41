//! Workflow: the per-build state holder and phase executor
//!
//! Owns the tasker, source fetcher, and phase-scoped result maps, and drives
//! the build sequence described in §4.5.

use crate::errors::{OrchestratorError, Result};
use crate::image_ref::ImageRef;
use crate::plugin::build_runner::BuildRunner;
use crate::plugin::input_runner::run_input_phase;
use crate::plugin::registry::PluginRegistry;
use crate::plugin::PluginConfigEntry;
use crate::source::{ResolvedSource, SourceFetcher, SourceSpec};
use crate::tasker::Tasker;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// A registry reference with its own insecure-transport flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryTarget {
    pub reference: String,
    #[serde(default)]
    pub insecure: bool,
}

/// Immutable record of everything needed to drive one build (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRequest {
    pub image: String,
    pub source: SourceSpec,
    pub parent_registry: Option<RegistryTarget>,
    #[serde(default)]
    pub target_registries: Vec<RegistryTarget>,
    #[serde(default)]
    pub dont_pull_base_image: bool,
    /// Whether post-build plugins still run after an earlier fatal failure
    /// (Open Question resolution, see SPEC_FULL.md §9).
    #[serde(default = "default_true")]
    pub run_post_build_on_failure: bool,
    #[serde(default)]
    pub input_plugins: Vec<PluginConfigEntry>,
    #[serde(default)]
    pub prebuild_plugins: Vec<PluginConfigEntry>,
    #[serde(default)]
    pub prepublish_plugins: Vec<PluginConfigEntry>,
    #[serde(default)]
    pub postbuild_plugins: Vec<PluginConfigEntry>,
    /// Additional plugin library files to load alongside the built-ins.
    #[serde(default)]
    pub extra_plugin_files: Vec<std::path::PathBuf>,
}

fn default_true() -> bool {
    true
}

/// Mutable state shared by the workflow driver and every build-phase plugin
/// instance across one build. Pre-publish and post-build intentionally
/// write through the same `postbuild_results` map (§9, phase-result
/// aliasing): both phases run after the main build and some post-build
/// plugins read pre-publish's results.
#[derive(Debug, Default)]
pub struct WorkflowState {
    pub source: Option<ResolvedSource>,
    pub base_image: Option<ImageRef>,
    pub built_image_id: Option<String>,
    pub build_is_failing: bool,
    pub prebuild_results: IndexMap<String, serde_json::Value>,
    pub postbuild_results: IndexMap<String, serde_json::Value>,
}

/// Shared handle to [`WorkflowState`], cloned cheaply into every plugin
/// instance constructed for a build.
pub type SharedWorkflowState = Arc<Mutex<WorkflowState>>;

/// Overall status of a finished build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Success,
    Failed,
}

/// The outcome of driving one build end to end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildResult {
    pub status: BuildStatus,
    pub built_image_id: Option<String>,
    pub prebuild_results: IndexMap<String, serde_json::Value>,
    pub postbuild_results: IndexMap<String, serde_json::Value>,
    pub cause: Option<String>,
}

/// Owns the tasker, source fetcher, and plugin phases for one build and
/// drives the build sequence of §4.5.
pub struct Workflow {
    tasker: Arc<dyn Tasker>,
    source_fetcher: Arc<dyn SourceFetcher>,
    registry: Arc<PluginRegistry>,
    request: BuildRequest,
    state: SharedWorkflowState,
}

impl Workflow {
    pub fn new(
        tasker: Arc<dyn Tasker>,
        source_fetcher: Arc<dyn SourceFetcher>,
        registry: Arc<PluginRegistry>,
        request: BuildRequest,
    ) -> Self {
        Self {
            tasker,
            source_fetcher,
            registry,
            request,
            state: Arc::new(Mutex::new(WorkflowState::default())),
        }
    }

    /// Drive one build to completion, per the sequence in §4.5. Post-build
    /// runs exactly once here, after `run_inner` is fully resolved, whether
    /// the build reached step 7 cleanly or failed earlier — never from
    /// inside `run_inner` itself, so a non-tolerated post-build failure
    /// can't trigger a second post-build pass.
    pub async fn run(mut self) -> BuildResult {
        let outcome = self.run_inner().await;

        if let Err(cause) = &outcome {
            error!("workflow failed: {}", cause);
            let mut state = self.state.lock().await;
            state.build_is_failing = true;
        }

        if outcome.is_ok() || self.request.run_post_build_on_failure {
            if let Err(post_err) = self.run_post_build().await {
                warn!("post-build phase failed: {}", post_err);
            }
        }

        let state = self.state.lock().await;
        match outcome {
            Ok(()) => BuildResult {
                status: BuildStatus::Success,
                built_image_id: state.built_image_id.clone(),
                prebuild_results: state.prebuild_results.clone(),
                postbuild_results: state.postbuild_results.clone(),
                cause: None,
            },
            Err(cause) => BuildResult {
                status: BuildStatus::Failed,
                built_image_id: state.built_image_id.clone(),
                prebuild_results: state.prebuild_results.clone(),
                postbuild_results: state.postbuild_results.clone(),
                cause: Some(cause.to_string()),
            },
        }
    }

    async fn run_inner(&mut self) -> Result<()> {
        // 1. Fetch source.
        let resolved = self
            .source_fetcher
            .fetch(&self.request.source)
            .await
            .map_err(|e| OrchestratorError::WorkflowFatal {
                message: format!("source fetch failed: {}", e),
            })?;
        info!("fetched source into {}", resolved.root_path.display());

        // 2. Parse base image from recipe.
        let base_image = parse_base_image(&resolved.recipe_path)?;
        debug!("base image: {}", base_image.canonical());

        {
            let mut state = self.state.lock().await;
            state.source = Some(resolved.clone());
            state.base_image = Some(base_image.clone());
        }

        // 3. Pull base image unless suppressed.
        if !self.request.dont_pull_base_image {
            if let Some(parent) = &self.request.parent_registry {
                let pull_ref = base_image.with_registry(parent.reference.clone());
                self.tasker.pull(&pull_ref, parent.insecure).await?;
            } else {
                self.tasker.pull(&base_image, false).await?;
            }
        }

        // 4. Pre-build phase.
        self.run_phase_prebuild().await?;

        // 5. Build.
        let tag = ImageRef::parse(&self.request.image)?;
        let image_id = self
            .tasker
            .build(&resolved.root_path, &resolved.recipe_path, &tag)
            .await?;
        {
            let mut state = self.state.lock().await;
            state.built_image_id = Some(image_id);
        }

        // 6. Pre-publish phase.
        self.run_phase_prepublish().await?;

        // 7. Tag and push to each target registry, in order.
        for target in &self.request.target_registries {
            let reference = ImageRef::parse(&target.reference)?;
            let image_id = {
                let state = self.state.lock().await;
                state.built_image_id.clone().ok_or_else(|| {
                    OrchestratorError::WorkflowFatal {
                        message: "no built image id to push".to_string(),
                    }
                })?
            };
            self.tasker.tag(&image_id, &reference).await?;
            self.tasker.push(&reference, target.insecure).await?;
        }

        // Post-build (step 8) runs once, from `run`, after this returns.
        Ok(())
    }

    async fn run_phase_prebuild(&mut self) -> Result<()> {
        let plugins = self.registry.load_build(crate::plugin::Phase::PreBuild);
        let mut runner = BuildRunner::new(
            self.tasker.clone(),
            self.state.clone(),
            plugins,
        );
        let mut results = {
            let state = self.state.lock().await;
            state.prebuild_results.clone()
        };
        let outcome = runner
            .run(&self.request.prebuild_plugins, &mut results)
            .await;
        {
            let mut state = self.state.lock().await;
            state.prebuild_results = results;
        }
        outcome
    }

    async fn run_phase_prepublish(&mut self) -> Result<()> {
        let plugins = self.registry.load_build(crate::plugin::Phase::PrePublish);
        let mut runner = BuildRunner::new(self.tasker.clone(), self.state.clone(), plugins);
        let mut results = {
            let state = self.state.lock().await;
            state.postbuild_results.clone()
        };
        let outcome = runner
            .run(&self.request.prepublish_plugins, &mut results)
            .await;
        {
            let mut state = self.state.lock().await;
            state.postbuild_results = results;
        }
        outcome
    }

    async fn run_post_build(&mut self) -> Result<()> {
        let plugins = self.registry.load_build(crate::plugin::Phase::PostBuild);
        let mut runner = BuildRunner::new(self.tasker.clone(), self.state.clone(), plugins);
        let mut results = {
            let state = self.state.lock().await;
            state.postbuild_results.clone()
        };
        let outcome = runner
            .run(&self.request.postbuild_plugins, &mut results)
            .await;
        {
            let mut state = self.state.lock().await;
            state.postbuild_results = results;
        }
        outcome
    }
}

/// Parse the base image reference out of a Dockerfile's first `FROM` line.
fn parse_base_image(recipe_path: &std::path::Path) -> Result<ImageRef> {
    let contents =
        std::fs::read_to_string(recipe_path).map_err(|e| OrchestratorError::WorkflowFatal {
            message: format!("cannot read recipe '{}': {}", recipe_path.display(), e),
        })?;

    for line in contents.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("FROM ") {
            let image_name = rest.split_whitespace().next().unwrap_or("");
            return ImageRef::parse(image_name);
        }
    }

    Err(OrchestratorError::WorkflowFatal {
        message: format!("no FROM instruction found in '{}'", recipe_path.display()),
    })
}

/// Run only the input phase, resolving `auto` selection if requested, and
/// turn the chosen input plugin's output into a [`BuildRequest`].
pub async fn resolve_build_request_from_input(
    registry: Arc<PluginRegistry>,
    input_plugins: &mut [PluginConfigEntry],
    extra_plugin_files: &[std::path::PathBuf],
) -> Result<BuildRequest> {
    let loaded = registry.load_input();
    let mut results = IndexMap::new();
    run_input_phase(&loaded, input_plugins, &mut results).await?;

    let chosen = results
        .get(crate::plugin::AUTO_INPUT_KEY)
        .cloned()
        .ok_or_else(|| OrchestratorError::WorkflowFatal {
            message: "input phase produced no build specification".to_string(),
        })?;

    let mut request: BuildRequest =
        serde_json::from_value(chosen).map_err(|e| OrchestratorError::WorkflowFatal {
            message: format!("input plugin output is not a valid build request: {}", e),
        })?;
    request
        .extra_plugin_files
        .extend(extra_plugin_files.iter().cloned());
    Ok(request)
}
