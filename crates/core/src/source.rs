//! Source specification and fetching
//!
//! A [`SourceSpec`] declares where to obtain a build context and recipe; a
//! [`SourceFetcher`] resolves it to a local working tree with a known recipe
//! path. The fetcher is an external collaborator (§1): the core only depends
//! on the trait, not on any particular transport.

use crate::errors::{OrchestratorError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Declarative description of how to obtain a build context and recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Fetcher provider key, e.g. `"git"` or `"path"`.
    pub provider: String,
    /// Repository URL or local filesystem path, interpreted by `provider`.
    pub uri: String,
    /// Git ref (branch/tag/sha) to check out, when applicable.
    #[serde(default)]
    pub git_ref: Option<String>,
    /// Subdirectory within the fetched tree containing the recipe (Dockerfile).
    #[serde(default)]
    pub dockerfile_path: Option<PathBuf>,
    /// Free-form arguments forwarded to the fetcher implementation.
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
}

impl SourceSpec {
    /// Construct a minimal spec with only the required fields.
    pub fn new(provider: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            uri: uri.into(),
            git_ref: None,
            dockerfile_path: None,
            args: serde_json::Map::new(),
        }
    }
}

/// The resolved location of a fetched source tree.
///
/// Holds the scratch directory (when the fetcher created one) for the
/// lifetime of the struct, so the tree is released by ordinary `Drop` when
/// the workflow finishes with it (§5) rather than needing explicit cleanup.
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    /// Root of the fetched working tree.
    pub root_path: PathBuf,
    /// Path to the build recipe (Dockerfile) within the tree.
    pub recipe_path: PathBuf,
    scratch: Option<std::sync::Arc<tempfile::TempDir>>,
}

impl ResolvedSource {
    /// Construct a resolved source with no owned scratch directory, e.g.
    /// for a local path that the caller already owns.
    pub fn new(root_path: PathBuf, recipe_path: PathBuf) -> Self {
        Self {
            root_path,
            recipe_path,
            scratch: None,
        }
    }
}

/// Resolves a [`SourceSpec`] to a local working tree with a known recipe path.
///
/// Implementations must be idempotent: calling `fetch` twice with the same
/// spec within one workflow must not corrupt or duplicate state.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch the source described by `spec`, returning its resolved location.
    async fn fetch(&self, spec: &SourceSpec) -> Result<ResolvedSource>;
}

/// Fetcher for `provider = "path"`: the URI is a local directory, used as-is.
#[derive(Debug, Default)]
pub struct PathFetcher;

#[async_trait]
impl SourceFetcher for PathFetcher {
    #[instrument(skip(self), fields(uri = %spec.uri))]
    async fn fetch(&self, spec: &SourceSpec) -> Result<ResolvedSource> {
        let root_path = PathBuf::from(&spec.uri).canonicalize().map_err(|e| {
            OrchestratorError::WorkflowFatal {
                message: format!("cannot resolve local source path '{}': {}", spec.uri, e),
            }
        })?;

        let recipe_path = recipe_path_for(&root_path, spec);
        debug!("resolved local source at {}", root_path.display());
        Ok(ResolvedSource::new(root_path, recipe_path))
    }
}

/// Fetcher for `provider = "git"`: shallow-clones the URI into a scratch
/// directory with the `git` binary, optionally checking out `git_ref`.
#[derive(Debug)]
pub struct GitFetcher {
    /// Path to the `git` binary (usually just `"git"`).
    pub git_bin: String,
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self {
            git_bin: "git".to_string(),
        }
    }
}

#[async_trait]
impl SourceFetcher for GitFetcher {
    #[instrument(skip(self), fields(uri = %spec.uri, git_ref = ?spec.git_ref))]
    async fn fetch(&self, spec: &SourceSpec) -> Result<ResolvedSource> {
        let scratch = tempfile::tempdir().map_err(OrchestratorError::Io)?;
        let dest = scratch.path();

        let mut cmd = tokio::process::Command::new(&self.git_bin);
        cmd.arg("clone").arg("--depth").arg("1");
        if let Some(git_ref) = &spec.git_ref {
            cmd.arg("--branch").arg(git_ref);
        }
        cmd.arg(&spec.uri).arg(dest);

        debug!("cloning source with {:?}", cmd.as_std().get_args());
        let output = cmd
            .output()
            .await
            .map_err(|e| OrchestratorError::WorkflowFatal {
                message: format!("failed to invoke git: {}", e),
            })?;

        if !output.status.success() {
            return Err(OrchestratorError::WorkflowFatal {
                message: format!(
                    "git clone of '{}' failed: {}",
                    spec.uri,
                    String::from_utf8_lossy(&output.stderr)
                ),
            });
        }

        let root_path = dest.to_path_buf();
        let recipe_path = recipe_path_for(&root_path, spec);
        Ok(ResolvedSource {
            root_path,
            recipe_path,
            scratch: Some(std::sync::Arc::new(scratch)),
        })
    }
}

fn recipe_path_for(root: &Path, spec: &SourceSpec) -> PathBuf {
    match &spec.dockerfile_path {
        Some(rel) => root.join(rel),
        None => root.join("Dockerfile"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn path_fetcher_resolves_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();

        let spec = SourceSpec::new("path", dir.path().to_str().unwrap());
        let fetcher = PathFetcher;
        let resolved = fetcher.fetch(&spec).await.unwrap();

        assert_eq!(resolved.recipe_path, resolved.root_path.join("Dockerfile"));
    }

    #[tokio::test]
    async fn path_fetcher_honors_custom_dockerfile_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("docker")).unwrap();
        std::fs::write(dir.path().join("docker/Dockerfile.alt"), "FROM scratch\n").unwrap();

        let mut spec = SourceSpec::new("path", dir.path().to_str().unwrap());
        spec.dockerfile_path = Some(PathBuf::from("docker/Dockerfile.alt"));

        let fetcher = PathFetcher;
        let resolved = fetcher.fetch(&spec).await.unwrap();
        assert_eq!(
            resolved.recipe_path,
            resolved.root_path.join("docker/Dockerfile.alt")
        );
    }

    #[tokio::test]
    async fn path_fetcher_fails_on_missing_directory() {
        let spec = SourceSpec::new("path", "/nonexistent/path/for/testing");
        let fetcher = PathFetcher;
        assert!(fetcher.fetch(&spec).await.is_err());
    }
}
