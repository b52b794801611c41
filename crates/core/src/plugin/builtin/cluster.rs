//! Cluster client abstraction for build-config cleanup.
//!
//! Grounded on the OSBS client usage inside `RemoveBuildConfigsPlugin.run()`
//! (`post_remove_buildconfigs.py`): list build-config resources related to
//! this image, then delete the stale ones.

use crate::errors::{OrchestratorError, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::debug;

#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Build-config names related to `current` that are no longer the
    /// active one.
    async fn list_stale_build_configs(&self, current: &str) -> Result<Vec<String>>;
    async fn delete_build_config(&self, name: &str) -> Result<()>;
}

/// Talks to an OpenShift-compatible build API over HTTPS.
pub struct HttpClusterClient {
    http: reqwest::Client,
    base_url: String,
    use_auth: bool,
}

impl HttpClusterClient {
    pub fn new(base_url: impl Into<String>, verify_ssl: bool, use_auth: bool) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!verify_ssl)
            .build()
            .map_err(|e| OrchestratorError::WorkflowFatal {
                message: format!("failed to build cluster http client: {}", e),
            })?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            use_auth,
        })
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.use_auth {
            if let Ok(token) =
                std::fs::read_to_string("/var/run/secrets/kubernetes.io/serviceaccount/token")
            {
                return builder.bearer_auth(token.trim());
            }
        }
        builder
    }
}

#[async_trait]
impl ClusterClient for HttpClusterClient {
    async fn list_stale_build_configs(&self, current: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/buildconfigs?labelSelector=buildconfig={}",
            self.base_url, current
        );
        let response = self
            .authorize(self.http.get(&url))
            .send()
            .await
            .map_err(|e| OrchestratorError::WorkflowFatal {
                message: format!("listing buildconfigs failed: {}", e),
            })?;
        let body: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| OrchestratorError::WorkflowFatal {
                    message: format!("parsing buildconfig list failed: {}", e),
                })?;
        let names = body
            .get("items")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("metadata")?.get("name")?.as_str())
                    .filter(|name| *name != current)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(names)
    }

    async fn delete_build_config(&self, name: &str) -> Result<()> {
        let url = format!("{}/buildconfigs/{}", self.base_url, name);
        let response = self
            .authorize(self.http.delete(&url))
            .send()
            .await
            .map_err(|e| OrchestratorError::WorkflowFatal {
                message: format!("deleting buildconfig '{}' failed: {}", name, e),
            })?;
        if !response.status().is_success() {
            return Err(OrchestratorError::WorkflowFatal {
                message: format!(
                    "deleting buildconfig '{}' returned {}",
                    name,
                    response.status()
                ),
            });
        }
        debug!("deleted stale buildconfig '{}'", name);
        Ok(())
    }
}

/// In-memory client for tests: returns a fixed stale list and records
/// delete calls.
#[derive(Default)]
pub struct FakeClusterClient {
    pub stale: Vec<String>,
    pub deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl ClusterClient for FakeClusterClient {
    async fn list_stale_build_configs(&self, _current: &str) -> Result<Vec<String>> {
        Ok(self.stale.clone())
    }

    async fn delete_build_config(&self, name: &str) -> Result<()> {
        self.deleted.lock().unwrap().push(name.to_string());
        Ok(())
    }
}
