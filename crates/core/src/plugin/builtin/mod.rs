//! Built-in plugins, compiled into the core crate and registered eagerly.
//!
//! One demonstration plugin per phase. These exist to exercise the
//! pipeline end to end and to give operators a worked example of each
//! descriptor shape; real deployments are expected to add their own via
//! extra plugin files (§4.1).

mod cluster;
mod input_git;
mod input_path;
mod postbuild_remove_stale_buildconfigs;
mod prebuild_dockerfile_lint;
mod prepublish_label_metadata;

pub use cluster::{ClusterClient, FakeClusterClient};

use super::registry::PluginRegistryBuilder;

pub fn register_all(builder: &mut PluginRegistryBuilder) {
    builder.register_input(input_path::descriptor());
    builder.register_input(input_git::descriptor());
    builder.register_build(prebuild_dockerfile_lint::descriptor());
    builder.register_build(prepublish_label_metadata::descriptor());
    builder.register_build(postbuild_remove_stale_buildconfigs::descriptor());
}
