//! Pre-publish plugin that inspects the just-built image and surfaces its
//! labels into the phase results, so later post-build plugins or the caller
//! can act on them without shelling out to the engine again.

use crate::errors::{OrchestratorError, Result};
use crate::image_ref::ImageRef;
use crate::plugin::{BuildPluginDescriptor, Phase, PluginInstance};
use crate::tasker::Tasker;
use crate::workflow::SharedWorkflowState;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

pub const KEY: &str = "label_metadata";

struct LabelMetadata {
    tasker: Arc<dyn Tasker>,
    state: SharedWorkflowState,
}

#[async_trait]
impl PluginInstance for LabelMetadata {
    async fn run(&self) -> Result<Value> {
        let image_id = {
            let state = self.state.lock().await;
            state
                .built_image_id
                .clone()
                .ok_or_else(|| OrchestratorError::WorkflowFatal {
                    message: "label_metadata plugin requires a built image id".to_string(),
                })?
        };
        let reference = ImageRef::parse(&image_id)?;
        let info = self.tasker.inspect(&reference).await?;
        match info {
            Some(info) => Ok(serde_json::json!({ "id": info.id, "labels": info.labels })),
            None => Ok(serde_json::json!({ "id": image_id, "labels": {} })),
        }
    }
}

fn construct(
    tasker: Arc<dyn Tasker>,
    state: SharedWorkflowState,
    _args: Map<String, Value>,
) -> Result<Box<dyn PluginInstance>> {
    Ok(Box::new(LabelMetadata { tasker, state }))
}

pub fn descriptor() -> BuildPluginDescriptor {
    BuildPluginDescriptor {
        key: KEY.to_string(),
        phase: Phase::PrePublish,
        can_fail_default: true,
        construct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasker::InspectInfo;
    use crate::workflow::WorkflowState;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    struct StubTasker;

    #[async_trait]
    impl Tasker for StubTasker {
        async fn pull(&self, _reference: &ImageRef, _insecure: bool) -> Result<()> {
            Ok(())
        }
        async fn build(
            &self,
            _context_dir: &std::path::Path,
            _recipe_path: &std::path::Path,
            _tag: &ImageRef,
        ) -> Result<String> {
            Ok("sha256:stub".to_string())
        }
        async fn tag(&self, _image_id: &str, _reference: &ImageRef) -> Result<()> {
            Ok(())
        }
        async fn push(&self, _reference: &ImageRef, _insecure: bool) -> Result<()> {
            Ok(())
        }
        async fn commit(&self, _container_id: &str, _reference: &ImageRef) -> Result<String> {
            Ok("sha256:stub".to_string())
        }
        async fn inspect(&self, reference: &ImageRef) -> Result<Option<InspectInfo>> {
            let mut labels = HashMap::new();
            labels.insert("org.example".to_string(), "value".to_string());
            Ok(Some(InspectInfo {
                id: reference.canonical(),
                labels,
            }))
        }
        async fn remove(&self, _reference: &ImageRef) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn surfaces_labels_from_inspect() {
        let state = Arc::new(Mutex::new(WorkflowState {
            built_image_id: Some("sha256:deadbeef".to_string()),
            ..Default::default()
        }));
        let plugin = LabelMetadata {
            tasker: Arc::new(StubTasker),
            state,
        };
        let out = plugin.run().await.unwrap();
        assert_eq!(out["labels"]["org.example"], "value");
    }
}
