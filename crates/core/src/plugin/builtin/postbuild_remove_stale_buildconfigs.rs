//! Post-build plugin removing stale build-config resources left behind by
//! earlier builds of the same image, so a cluster does not accumulate one
//! build-config object per rebuild indefinitely.
//!
//! Grounded on `RemoveBuildConfigsPlugin` (`post_remove_buildconfigs.py`):
//! a non-tolerant (`can_fail = False`) post-build plugin that skips
//! deletion when the workflow already failed, leaving state around for
//! inspection.

use super::cluster::{ClusterClient, HttpClusterClient};
use crate::errors::{OrchestratorError, Result};
use crate::plugin::{BuildPluginDescriptor, Phase, PluginInstance};
use crate::tasker::Tasker;
use crate::workflow::SharedWorkflowState;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

pub const KEY: &str = "remove_stale_buildconfigs";

struct RemoveStaleBuildConfigs {
    client: Arc<dyn ClusterClient>,
    state: SharedWorkflowState,
    buildconfig_name: String,
}

#[async_trait]
impl PluginInstance for RemoveStaleBuildConfigs {
    async fn run(&self) -> Result<Value> {
        let build_is_failing = self.state.lock().await.build_is_failing;
        if build_is_failing {
            warn!("build is failing, leaving stale buildconfigs in place for inspection");
            return Ok(serde_json::json!({ "removed": [] }));
        }

        let stale = self
            .client
            .list_stale_build_configs(&self.buildconfig_name)
            .await?;
        for name in &stale {
            self.client.delete_build_config(name).await?;
            info!("removed stale buildconfig '{}'", name);
        }
        Ok(serde_json::json!({ "removed": stale }))
    }
}

fn construct(
    _tasker: Arc<dyn Tasker>,
    state: SharedWorkflowState,
    args: Map<String, Value>,
) -> Result<Box<dyn PluginInstance>> {
    let url = args
        .get("url")
        .and_then(|v| v.as_str())
        .ok_or_else(|| OrchestratorError::Config {
            message: "'remove_stale_buildconfigs' plugin requires 'url'".to_string(),
        })?;
    let buildconfig_name = args
        .get("buildconfig_name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| OrchestratorError::Config {
            message: "'remove_stale_buildconfigs' plugin requires 'buildconfig_name'".to_string(),
        })?
        .to_string();
    let verify_ssl = args
        .get("verify_ssl")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);
    let use_auth = args
        .get("use_auth")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    let client = Arc::new(HttpClusterClient::new(url, verify_ssl, use_auth)?);
    Ok(Box::new(RemoveStaleBuildConfigs {
        client,
        state,
        buildconfig_name,
    }))
}

pub fn descriptor() -> BuildPluginDescriptor {
    BuildPluginDescriptor {
        key: KEY.to_string(),
        phase: Phase::PostBuild,
        can_fail_default: false,
        construct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::builtin::FakeClusterClient;
    use crate::workflow::WorkflowState;
    use tokio::sync::Mutex as TokioMutex;

    #[tokio::test]
    async fn skips_deletion_when_build_is_failing() {
        let client = Arc::new(FakeClusterClient {
            stale: vec!["old-1".to_string()],
            ..Default::default()
        });
        let state = Arc::new(TokioMutex::new(WorkflowState {
            build_is_failing: true,
            ..Default::default()
        }));
        let plugin = RemoveStaleBuildConfigs {
            client: client.clone(),
            state,
            buildconfig_name: "myapp".to_string(),
        };
        let result = plugin.run().await.unwrap();
        assert_eq!(result["removed"], serde_json::json!([]));
        assert!(client.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn deletes_stale_configs_when_build_succeeded() {
        let client = Arc::new(FakeClusterClient {
            stale: vec!["old-1".to_string(), "old-2".to_string()],
            ..Default::default()
        });
        let state = Arc::new(TokioMutex::new(WorkflowState::default()));
        let plugin = RemoveStaleBuildConfigs {
            client: client.clone(),
            state,
            buildconfig_name: "myapp".to_string(),
        };
        let result = plugin.run().await.unwrap();
        assert_eq!(result["removed"], serde_json::json!(["old-1", "old-2"]));
        assert_eq!(client.deleted.lock().unwrap().len(), 2);
    }
}
