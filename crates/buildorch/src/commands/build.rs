use super::plan::load_build_request;
use anyhow::Result;
use buildorch_core::dispatcher::{self, CliContainerLauncher};
use buildorch_core::image_ref::ImageRef;
use buildorch_core::substitution::apply_overrides;
use buildorch_core::workflow::{BuildResult, RegistryTarget};
use std::collections::HashMap;
use std::path::PathBuf;

pub struct BuildArgs {
    pub plan_path: PathBuf,
    pub set: Vec<(String, String)>,
    pub in_container: Option<String>,
    pub privileged: Option<String>,
    pub push_buildroot_to: Option<String>,
}

pub async fn run(args: BuildArgs) -> Result<BuildResult> {
    let mut request = load_build_request(&args.plan_path)?;

    if !args.set.is_empty() {
        let overrides: HashMap<String, serde_json::Value> = args
            .set
            .into_iter()
            .map(|(key, value)| (key, serde_json::Value::String(value)))
            .collect();
        apply_overrides(&mut request, &overrides)?;
    }

    let push_buildroot_to = args.push_buildroot_to.map(|reference| RegistryTarget {
        reference,
        insecure: false,
    });

    let result = if let Some(builder_image) = args.privileged {
        let builder_image = ImageRef::parse(&builder_image)?;
        let launcher = CliContainerLauncher::new();
        dispatcher::build_image_in_privileged_container(
            request,
            &builder_image,
            push_buildroot_to,
            &launcher,
        )
        .await?
    } else if let Some(builder_image) = args.in_container {
        let builder_image = ImageRef::parse(&builder_image)?;
        let launcher = CliContainerLauncher::new();
        dispatcher::build_image_using_hosts_docker(
            request,
            &builder_image,
            push_buildroot_to,
            &launcher,
        )
        .await?
    } else {
        dispatcher::build_image_here(request).await?
    };

    Ok(result)
}
