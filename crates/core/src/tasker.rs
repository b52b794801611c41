//! Tasker: abstract driver over a container engine
//!
//! The tasker pulls/builds/commits/pushes/inspects/removes images and
//! containers. The workflow and build-phase plugins depend only on the
//! [`Tasker`] trait; [`CliTasker`] is the concrete, CLI-shelling
//! implementation that makes the crate runnable end to end.

use crate::errors::{OrchestratorError, Result};
use crate::image_ref::ImageRef;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// Metadata returned by [`Tasker::inspect`].
#[derive(Debug, Clone, Default)]
pub struct InspectInfo {
    pub id: String,
    pub labels: HashMap<String, String>,
}

/// Abstract driver over a container engine (build, pull, push, ...).
///
/// All operations may fail; per §6, every failure is fatal to the workflow
/// step that invokes it. Implementations should not retry internally —
/// retry policy, if any, belongs to the caller.
#[async_trait]
pub trait Tasker: Send + Sync {
    /// Pull `reference` from its registry.
    async fn pull(&self, reference: &ImageRef, insecure: bool) -> Result<()>;

    /// Build an image from `context_dir`/`recipe_path`, tagging it `tag`.
    /// Returns the engine-assigned image id.
    async fn build(&self, context_dir: &Path, recipe_path: &Path, tag: &ImageRef)
        -> Result<String>;

    /// Tag `image_id` as `reference`.
    async fn tag(&self, image_id: &str, reference: &ImageRef) -> Result<()>;

    /// Push `reference` to its registry.
    async fn push(&self, reference: &ImageRef, insecure: bool) -> Result<()>;

    /// Commit a running container as a new image tagged `reference`.
    /// Returns the new image id.
    async fn commit(&self, container_id: &str, reference: &ImageRef) -> Result<String>;

    /// Inspect `reference`, returning metadata if it exists locally.
    async fn inspect(&self, reference: &ImageRef) -> Result<Option<InspectInfo>>;

    /// Remove `reference` from local storage.
    async fn remove(&self, reference: &ImageRef) -> Result<()>;
}

/// [`Tasker`] implementation that shells out to a container-engine binary
/// (`docker` by default) and parses its stdout.
#[derive(Debug, Clone)]
pub struct CliTasker {
    engine_bin: String,
}

impl CliTasker {
    /// Use the default engine binary (`docker`).
    pub fn new() -> Self {
        Self {
            engine_bin: "docker".to_string(),
        }
    }

    /// Use a specific engine binary, e.g. `"podman"`.
    pub fn with_engine(engine_bin: impl Into<String>) -> Self {
        Self {
            engine_bin: engine_bin.into(),
        }
    }

    fn command(&self) -> Command {
        Command::new(&self.engine_bin)
    }

    fn fatal(&self, op: &str, output: &std::process::Output) -> OrchestratorError {
        OrchestratorError::WorkflowFatal {
            message: format!(
                "{} {} failed: {}",
                self.engine_bin,
                op,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        }
    }
}

impl Default for CliTasker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tasker for CliTasker {
    #[instrument(skip(self))]
    async fn pull(&self, reference: &ImageRef, insecure: bool) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg("pull");
        if insecure {
            // Most engines key insecure-registry behavior off daemon config
            // rather than a per-pull flag; buildx/podman expose `--tls-verify=false`.
            cmd.arg("--tls-verify=false");
        }
        cmd.arg(reference.canonical());

        let output = cmd
            .output()
            .await
            .map_err(|e| OrchestratorError::WorkflowFatal {
                message: format!("failed to invoke {}: {}", self.engine_bin, e),
            })?;
        if !output.status.success() {
            return Err(self.fatal("pull", &output));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn build(
        &self,
        context_dir: &Path,
        recipe_path: &Path,
        tag: &ImageRef,
    ) -> Result<String> {
        let mut cmd = self.command();
        cmd.arg("build")
            .arg("-f")
            .arg(recipe_path)
            .arg("-t")
            .arg(tag.canonical())
            .arg("-q")
            .arg(context_dir);

        debug!("building {} from {}", tag.canonical(), recipe_path.display());
        let output = cmd
            .output()
            .await
            .map_err(|e| OrchestratorError::WorkflowFatal {
                message: format!("failed to invoke {}: {}", self.engine_bin, e),
            })?;
        if !output.status.success() {
            return Err(self.fatal("build", &output));
        }

        let image_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if image_id.is_empty() {
            return Err(OrchestratorError::WorkflowFatal {
                message: "build succeeded but no image id was reported".to_string(),
            });
        }
        Ok(image_id)
    }

    #[instrument(skip(self))]
    async fn tag(&self, image_id: &str, reference: &ImageRef) -> Result<()> {
        let output = self
            .command()
            .arg("tag")
            .arg(image_id)
            .arg(reference.canonical())
            .output()
            .await
            .map_err(|e| OrchestratorError::WorkflowFatal {
                message: format!("failed to invoke {}: {}", self.engine_bin, e),
            })?;
        if !output.status.success() {
            return Err(self.fatal("tag", &output));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn push(&self, reference: &ImageRef, insecure: bool) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg("push");
        if insecure {
            cmd.arg("--tls-verify=false");
        }
        cmd.arg(reference.canonical());

        let output = cmd
            .output()
            .await
            .map_err(|e| OrchestratorError::WorkflowFatal {
                message: format!("failed to invoke {}: {}", self.engine_bin, e),
            })?;
        if !output.status.success() {
            return Err(self.fatal("push", &output));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn commit(&self, container_id: &str, reference: &ImageRef) -> Result<String> {
        let output = self
            .command()
            .arg("commit")
            .arg(container_id)
            .arg(reference.canonical())
            .output()
            .await
            .map_err(|e| OrchestratorError::WorkflowFatal {
                message: format!("failed to invoke {}: {}", self.engine_bin, e),
            })?;
        if !output.status.success() {
            return Err(self.fatal("commit", &output));
        }
        let image_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(image_id)
    }

    #[instrument(skip(self))]
    async fn inspect(&self, reference: &ImageRef) -> Result<Option<InspectInfo>> {
        let output = self
            .command()
            .arg("inspect")
            .arg(reference.canonical())
            .output()
            .await
            .map_err(|e| OrchestratorError::WorkflowFatal {
                message: format!("failed to invoke {}: {}", self.engine_bin, e),
            })?;
        if !output.status.success() {
            warn!(
                "{} inspect {} returned non-zero; treating as absent",
                self.engine_bin,
                reference.canonical()
            );
            return Ok(None);
        }

        let parsed: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| OrchestratorError::WorkflowFatal {
                message: format!("failed to parse inspect output: {}", e),
            })?;
        let entry = parsed.as_array().and_then(|arr| arr.first());
        let Some(entry) = entry else {
            return Ok(None);
        };

        let id = entry
            .get("Id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let labels = entry
            .get("Config")
            .and_then(|c| c.get("Labels"))
            .and_then(|l| l.as_object())
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(InspectInfo { id, labels }))
    }

    #[instrument(skip(self))]
    async fn remove(&self, reference: &ImageRef) -> Result<()> {
        let output = self
            .command()
            .arg("rmi")
            .arg(reference.canonical())
            .output()
            .await
            .map_err(|e| OrchestratorError::WorkflowFatal {
                message: format!("failed to invoke {}: {}", self.engine_bin, e),
            })?;
        if !output.status.success() {
            return Err(self.fatal("rmi", &output));
        }
        Ok(())
    }
}
