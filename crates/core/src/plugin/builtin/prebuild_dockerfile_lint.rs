//! Pre-build plugin performing fast, advisory Dockerfile checks.
//!
//! Structurally grounded on `PreBuildPlugin` in `plugin.py`: a phase plugin
//! that inspects the fetched source before the engine build runs and
//! reports findings without mutating anything.

use crate::errors::{OrchestratorError, Result};
use crate::plugin::{BuildPluginDescriptor, Phase, PluginInstance};
use crate::tasker::Tasker;
use crate::workflow::SharedWorkflowState;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

pub const KEY: &str = "dockerfile_lint";

struct DockerfileLint {
    state: SharedWorkflowState,
}

#[async_trait]
impl PluginInstance for DockerfileLint {
    async fn run(&self) -> Result<Value> {
        let recipe_path = {
            let state = self.state.lock().await;
            state
                .source
                .as_ref()
                .map(|s| s.recipe_path.clone())
                .ok_or_else(|| OrchestratorError::WorkflowFatal {
                    message: "dockerfile_lint plugin requires a fetched source".to_string(),
                })?
        };

        let contents = std::fs::read_to_string(&recipe_path).map_err(OrchestratorError::Io)?;
        let mut warnings = Vec::new();
        let mut from_count = 0;
        for line in contents.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with("FROM ") {
                from_count += 1;
            }
            if trimmed.starts_with("MAINTAINER ") {
                warnings.push("MAINTAINER is deprecated, use a label instead".to_string());
            }
            if trimmed.starts_with("ADD ") && !trimmed.contains("://") {
                warnings.push(format!("prefer COPY over ADD for local files: '{}'", trimmed));
            }
        }
        if from_count > 1 {
            warnings.push(
                "multi-stage build detected, only the first FROM is used as the base image"
                    .to_string(),
            );
        }

        Ok(serde_json::json!({ "warnings": warnings }))
    }
}

fn construct(
    _tasker: Arc<dyn Tasker>,
    state: SharedWorkflowState,
    _args: Map<String, Value>,
) -> Result<Box<dyn PluginInstance>> {
    Ok(Box::new(DockerfileLint { state }))
}

pub fn descriptor() -> BuildPluginDescriptor {
    BuildPluginDescriptor {
        key: KEY.to_string(),
        phase: Phase::PreBuild,
        can_fail_default: true,
        construct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::WorkflowState;
    use tokio::sync::Mutex;

    #[tokio::test]
    async fn flags_deprecated_maintainer_instruction() {
        let dir = tempfile::tempdir().unwrap();
        let recipe_path = dir.path().join("Dockerfile");
        std::fs::write(&recipe_path, "FROM scratch\nMAINTAINER me@example.com\n").unwrap();

        let state = Arc::new(Mutex::new(WorkflowState {
            source: Some(crate::source::ResolvedSource::new(
                dir.path().to_path_buf(),
                recipe_path,
            )),
            ..Default::default()
        }));
        let plugin = DockerfileLint { state };
        let out = plugin.run().await.unwrap();
        let warnings = out["warnings"].as_array().unwrap();
        assert!(warnings.iter().any(|w| w.as_str().unwrap().contains("MAINTAINER")));
    }

    #[tokio::test]
    async fn clean_dockerfile_has_no_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let recipe_path = dir.path().join("Dockerfile");
        std::fs::write(&recipe_path, "FROM scratch\nCOPY . /app\n").unwrap();

        let state = Arc::new(Mutex::new(WorkflowState {
            source: Some(crate::source::ResolvedSource::new(
                dir.path().to_path_buf(),
                recipe_path,
            )),
            ..Default::default()
        }));
        let plugin = DockerfileLint { state };
        let out = plugin.run().await.unwrap();
        assert!(out["warnings"].as_array().unwrap().is_empty());
    }
}
