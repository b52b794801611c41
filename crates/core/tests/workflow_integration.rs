//! End-to-end workflow tests driven entirely against fakes, no container
//! engine or network required.

use async_trait::async_trait;
use buildorch_core::errors::Result;
use buildorch_core::image_ref::ImageRef;
use buildorch_core::plugin::registry::PluginRegistry;
use buildorch_core::source::{PathFetcher, SourceSpec};
use buildorch_core::tasker::{InspectInfo, Tasker};
use buildorch_core::workflow::{BuildRequest, BuildStatus, RegistryTarget, Workflow};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct FakeTasker {
    pulled: Mutex<Vec<String>>,
    pushed: Mutex<Vec<String>>,
}

#[async_trait]
impl Tasker for FakeTasker {
    async fn pull(&self, reference: &ImageRef, _insecure: bool) -> Result<()> {
        self.pulled.lock().unwrap().push(reference.canonical());
        Ok(())
    }

    async fn build(&self, _context_dir: &Path, _recipe_path: &Path, _tag: &ImageRef) -> Result<String> {
        Ok("sha256:fakeimageid".to_string())
    }

    async fn tag(&self, _image_id: &str, _reference: &ImageRef) -> Result<()> {
        Ok(())
    }

    async fn push(&self, reference: &ImageRef, _insecure: bool) -> Result<()> {
        self.pushed.lock().unwrap().push(reference.canonical());
        Ok(())
    }

    async fn commit(&self, _container_id: &str, reference: &ImageRef) -> Result<String> {
        Ok(reference.canonical())
    }

    async fn inspect(&self, reference: &ImageRef) -> Result<Option<InspectInfo>> {
        Ok(Some(InspectInfo {
            id: reference.canonical(),
            labels: Default::default(),
        }))
    }

    async fn remove(&self, _reference: &ImageRef) -> Result<()> {
        Ok(())
    }
}

fn write_recipe(dir: &Path) {
    std::fs::write(dir.join("Dockerfile"), "FROM scratch\nLABEL stage=test\n").unwrap();
}

#[tokio::test]
async fn a_clean_build_reaches_every_phase_and_pushes_to_every_target() {
    let dir = tempfile::tempdir().unwrap();
    write_recipe(dir.path());

    let request = BuildRequest {
        image: "myapp:latest".to_string(),
        source: SourceSpec::new("path", dir.path().to_str().unwrap()),
        parent_registry: None,
        target_registries: vec![RegistryTarget {
            reference: "registry.example.com/myapp:latest".to_string(),
            insecure: false,
        }],
        dont_pull_base_image: false,
        run_post_build_on_failure: true,
        input_plugins: vec![],
        prebuild_plugins: vec![],
        prepublish_plugins: vec![],
        postbuild_plugins: vec![],
        extra_plugin_files: vec![],
    };

    let tasker = Arc::new(FakeTasker::default());
    let registry = Arc::new(PluginRegistry::builtins_only());
    let workflow = Workflow::new(tasker.clone(), Arc::new(PathFetcher), registry, request);

    let result = workflow.run().await;

    assert_eq!(result.status, BuildStatus::Success);
    assert_eq!(result.built_image_id.as_deref(), Some("sha256:fakeimageid"));
    assert_eq!(tasker.pulled.lock().unwrap().as_slice(), ["scratch"]);
    assert_eq!(
        tasker.pushed.lock().unwrap().as_slice(),
        ["registry.example.com/myapp:latest"]
    );
}

#[tokio::test]
async fn a_missing_recipe_fails_the_build_before_any_phase_runs() {
    let dir = tempfile::tempdir().unwrap();
    // No Dockerfile written: source fetch succeeds but base-image parsing fails.

    let request = BuildRequest {
        image: "myapp:latest".to_string(),
        source: SourceSpec::new("path", dir.path().to_str().unwrap()),
        parent_registry: None,
        target_registries: vec![],
        dont_pull_base_image: false,
        run_post_build_on_failure: true,
        input_plugins: vec![],
        prebuild_plugins: vec![],
        prepublish_plugins: vec![],
        postbuild_plugins: vec![],
        extra_plugin_files: vec![],
    };

    let tasker = Arc::new(FakeTasker::default());
    let registry = Arc::new(PluginRegistry::builtins_only());
    let workflow = Workflow::new(tasker, Arc::new(PathFetcher), registry, request);

    let result = workflow.run().await;

    assert_eq!(result.status, BuildStatus::Failed);
    assert!(result.built_image_id.is_none());
    assert!(result.cause.unwrap().contains("no FROM instruction"));
}
