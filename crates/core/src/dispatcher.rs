//! Execution-environment dispatcher (§4.6)
//!
//! Three entry points over one [`BuildRequest`] shape, grounded on
//! `build_image_here`, `build_image_using_hosts_docker`, and
//! `build_image_in_privileged_container` in `api.py`. All three return the
//! same [`BuildResult`]; only how the workflow's tasker reaches a container
//! engine differs.

use crate::errors::{OrchestratorError, Result};
use crate::image_ref::ImageRef;
use crate::plugin::registry::PluginRegistry;
use crate::source::{GitFetcher, PathFetcher, SourceFetcher};
use crate::tasker::{CliTasker, Tasker};
use crate::workflow::{BuildRequest, BuildResult, BuildStatus, RegistryTarget, Workflow};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{info, instrument, warn};

/// Run the workflow directly in this process, against a tasker that talks
/// to the ambient container engine (§4.6, "in-process").
#[instrument(skip(request))]
pub async fn build_image_here(request: BuildRequest) -> Result<BuildResult> {
    let tasker: Arc<dyn Tasker> = Arc::new(CliTasker::new());
    let fetcher = source_fetcher_for(&request);
    let registry = Arc::new(PluginRegistry::load(&request.extra_plugin_files)?);
    let workflow = Workflow::new(tasker, fetcher, registry, request);
    Ok(workflow.run().await)
}

/// Launch `builder_image` with the host's container-engine socket bind
/// mounted, and run the same workflow inside it (§4.6, "host-engine
/// container"). Mirrors `build_image_using_hosts_docker`.
#[instrument(skip(request, launcher))]
pub async fn build_image_using_hosts_docker(
    request: BuildRequest,
    builder_image: &ImageRef,
    push_buildroot_to: Option<RegistryTarget>,
    launcher: &dyn ContainerLauncher,
) -> Result<BuildResult> {
    run_in_builder_container(request, builder_image, false, push_buildroot_to, launcher).await
}

/// Launch `builder_image` privileged, with a nested container engine
/// started inside it, and run the workflow against that engine (§4.6,
/// "privileged container"). Mirrors `build_image_in_privileged_container`.
#[instrument(skip(request, launcher))]
pub async fn build_image_in_privileged_container(
    request: BuildRequest,
    builder_image: &ImageRef,
    push_buildroot_to: Option<RegistryTarget>,
    launcher: &dyn ContainerLauncher,
) -> Result<BuildResult> {
    run_in_builder_container(request, builder_image, true, push_buildroot_to, launcher).await
}

async fn run_in_builder_container(
    request: BuildRequest,
    builder_image: &ImageRef,
    privileged: bool,
    push_buildroot_to: Option<RegistryTarget>,
    launcher: &dyn ContainerLauncher,
) -> Result<BuildResult> {
    let request_json = serde_json::to_string(&request).map_err(|e| OrchestratorError::Config {
        message: format!("failed to serialize build request: {}", e),
    })?;

    let spec = LaunchSpec {
        builder_image: builder_image.clone(),
        privileged,
        request_json,
    };
    let outcome = launcher.run(&spec).await?;

    let result: BuildResult =
        serde_json::from_str(&outcome.result_json).map_err(|e| OrchestratorError::WorkflowFatal {
            message: format!("builder container produced an invalid build result: {}", e),
        })?;

    if let Some(target) = push_buildroot_to {
        if result.status == BuildStatus::Success {
            let tasker: Arc<dyn Tasker> = Arc::new(CliTasker::new());
            commit_and_push_buildroot(&*tasker, &outcome.container_id, &target).await?;
        } else {
            warn!("build failed, not pushing buildroot image");
        }
    }

    Ok(result)
}

/// Commit the builder container and push it as the "buildroot" image,
/// mirroring `m.commit_buildroot(); m.push_buildroot(push_buildroot_to)`.
async fn commit_and_push_buildroot(
    tasker: &dyn Tasker,
    container_id: &str,
    target: &RegistryTarget,
) -> Result<()> {
    let reference = ImageRef::parse(&target.reference)?;
    let image_id = tasker.commit(container_id, &reference).await?;
    info!("committed buildroot as {}", image_id);
    tasker.push(&reference, target.insecure).await
}

fn source_fetcher_for(request: &BuildRequest) -> Arc<dyn SourceFetcher> {
    match request.source.provider.as_str() {
        "path" => Arc::new(PathFetcher),
        _ => Arc::new(GitFetcher::default()),
    }
}

/// What a container launch needs to reach the builder image and pass it
/// the build request.
pub struct LaunchSpec {
    pub builder_image: ImageRef,
    pub privileged: bool,
    pub request_json: String,
}

/// The outcome of running a builder container to completion.
pub struct LaunchOutcome {
    pub container_id: String,
    pub result_json: String,
}

/// Launches a builder container and waits for it to produce a build
/// result. An external collaborator (§1): the core depends only on this
/// trait, not on any particular orchestration of the nested container.
#[async_trait]
pub trait ContainerLauncher: Send + Sync {
    async fn run(&self, spec: &LaunchSpec) -> Result<LaunchOutcome>;
}

/// [`ContainerLauncher`] that shells out to a configurable container-engine
/// binary, mounting the host engine's socket for the non-privileged variant
/// and requesting elevated privileges otherwise. The builder image is
/// expected to run this same binary's `build --in-container` subcommand,
/// reading the request from `BUILD_REQUEST` and printing the result JSON
/// to stdout.
#[derive(Debug, Clone)]
pub struct CliContainerLauncher {
    engine_bin: String,
    docker_socket: String,
}

impl CliContainerLauncher {
    pub fn new() -> Self {
        Self {
            engine_bin: "docker".to_string(),
            docker_socket: "/var/run/docker.sock".to_string(),
        }
    }
}

impl Default for CliContainerLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerLauncher for CliContainerLauncher {
    async fn run(&self, spec: &LaunchSpec) -> Result<LaunchOutcome> {
        let mut cmd = Command::new(&self.engine_bin);
        cmd.arg("run").arg("--rm").arg("--cidfile").arg("/dev/stdout");
        if spec.privileged {
            cmd.arg("--privileged");
        } else {
            cmd.arg("-v")
                .arg(format!("{}:{}", self.docker_socket, self.docker_socket));
        }
        cmd.arg("-e")
            .arg(format!("BUILD_REQUEST={}", spec.request_json))
            .arg(spec.builder_image.canonical());

        let output = cmd
            .output()
            .await
            .map_err(|e| OrchestratorError::WorkflowFatal {
                message: format!("failed to invoke {}: {}", self.engine_bin, e),
            })?;
        if !output.status.success() {
            return Err(OrchestratorError::WorkflowFatal {
                message: format!(
                    "builder container failed: {}",
                    String::from_utf8_lossy(&output.stderr)
                ),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let (container_id, result_json) = stdout
            .split_once('\n')
            .ok_or_else(|| OrchestratorError::WorkflowFatal {
                message: "builder container produced no output".to_string(),
            })?;

        Ok(LaunchOutcome {
            container_id: container_id.trim().to_string(),
            result_json: result_json.trim().to_string(),
        })
    }
}
