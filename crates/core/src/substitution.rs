//! Dotted-path configuration override utility (§4.7)
//!
//! Applies a flat map of dotted paths to values onto a [`BuildRequest`],
//! independent of the build-runner's runtime placeholder substitution in
//! [`crate::plugin::build_runner`] (that one rewrites fixed tokens at
//! execution time; this one lets a caller override static configuration
//! before a build starts, e.g. from CLI `--set` flags).

use crate::errors::{OrchestratorError, Result};
use crate::workflow::BuildRequest;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Apply every override in `overrides` to `request`, in iteration order.
///
/// A one-segment path (`"image"`) overwrites a top-level field. A
/// three-segment path (`"pre-build.my_plugin.level"`) locates the plugin
/// entry named `my_plugin` in the named phase's plugin list and overwrites
/// `args.level` on it, creating the entry's `args` map if absent. Any other
/// segment count, or a phase/plugin name that does not resolve, is an error.
pub fn apply_overrides(request: &mut BuildRequest, overrides: &HashMap<String, Value>) -> Result<()> {
    let mut tree = serde_json::to_value(&*request).map_err(|e| OrchestratorError::Config {
        message: format!("failed to serialize build request for overrides: {}", e),
    })?;

    for (path, value) in overrides {
        apply_one(&mut tree, path, value.clone())?;
    }

    *request = serde_json::from_value(tree).map_err(|e| OrchestratorError::Config {
        message: format!("overrides produced an invalid build request: {}", e),
    })?;
    Ok(())
}

fn apply_one(tree: &mut Value, path: &str, value: Value) -> Result<()> {
    let segments: Vec<&str> = path.split('.').collect();
    match segments.as_slice() {
        [key] => {
            let object = tree.as_object_mut().ok_or_else(|| OrchestratorError::InvalidSubstitution {
                path: path.to_string(),
                reason: "target is not an object".to_string(),
            })?;
            object.insert((*key).to_string(), value);
            Ok(())
        }
        [phase, plugin_key, arg_name] => {
            let list_key = phase_list_key(phase).ok_or_else(|| OrchestratorError::InvalidSubstitution {
                path: path.to_string(),
                reason: format!("unknown phase '{}'", phase),
            })?;

            let list = tree
                .get_mut(list_key)
                .and_then(|v| v.as_array_mut())
                .ok_or_else(|| OrchestratorError::InvalidSubstitution {
                    path: path.to_string(),
                    reason: format!("'{}' is not a plugin list", list_key),
                })?;

            let entry = list
                .iter_mut()
                .find(|entry| entry.get("name").and_then(|n| n.as_str()) == Some(*plugin_key))
                .ok_or_else(|| OrchestratorError::InvalidSubstitution {
                    path: path.to_string(),
                    reason: format!("no plugin '{}' configured in phase '{}'", plugin_key, phase),
                })?;

            let object = entry.as_object_mut().ok_or_else(|| OrchestratorError::InvalidSubstitution {
                path: path.to_string(),
                reason: "plugin entry is not an object".to_string(),
            })?;

            let args = object
                .entry("args")
                .or_insert_with(|| Value::Object(Map::new()));
            if !args.is_object() {
                *args = Value::Object(Map::new());
            }
            args.as_object_mut()
                .unwrap()
                .insert((*arg_name).to_string(), value);
            Ok(())
        }
        _ => Err(OrchestratorError::InvalidSubstitution {
            path: path.to_string(),
            reason: "path must have exactly one or three dot-separated segments".to_string(),
        }),
    }
}

fn phase_list_key(phase: &str) -> Option<&'static str> {
    match phase {
        "input" => Some("input_plugins"),
        "pre-build" => Some("prebuild_plugins"),
        "pre-publish" => Some("prepublish_plugins"),
        "post-build" => Some("postbuild_plugins"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginConfigEntry;
    use crate::source::SourceSpec;

    fn sample_request() -> BuildRequest {
        BuildRequest {
            image: "myapp:latest".to_string(),
            source: SourceSpec::new("path", "."),
            parent_registry: None,
            target_registries: Vec::new(),
            dont_pull_base_image: false,
            run_post_build_on_failure: true,
            input_plugins: vec![],
            prebuild_plugins: vec![PluginConfigEntry::new("dockerfile_lint")],
            prepublish_plugins: vec![],
            postbuild_plugins: vec![],
            extra_plugin_files: vec![],
        }
    }

    #[test]
    fn overrides_top_level_field() {
        let mut request = sample_request();
        let mut overrides = HashMap::new();
        overrides.insert("image".to_string(), Value::String("myapp:2.0".to_string()));
        apply_overrides(&mut request, &overrides).unwrap();
        assert_eq!(request.image, "myapp:2.0");
    }

    #[test]
    fn overrides_plugin_arg_creating_args_map() {
        let mut request = sample_request();
        let mut overrides = HashMap::new();
        overrides.insert(
            "pre-build.dockerfile_lint.strict".to_string(),
            Value::Bool(true),
        );
        apply_overrides(&mut request, &overrides).unwrap();
        let args = request.prebuild_plugins[0].args.as_ref().unwrap();
        assert_eq!(args["strict"], Value::Bool(true));
    }

    #[test]
    fn unknown_phase_is_an_error() {
        let mut request = sample_request();
        let mut overrides = HashMap::new();
        overrides.insert(
            "nonexistent.plugin.key".to_string(),
            Value::String("x".to_string()),
        );
        assert!(apply_overrides(&mut request, &overrides).is_err());
    }

    #[test]
    fn unconfigured_plugin_is_an_error() {
        let mut request = sample_request();
        let mut overrides = HashMap::new();
        overrides.insert(
            "pre-build.missing_plugin.x".to_string(),
            Value::String("y".to_string()),
        );
        assert!(apply_overrides(&mut request, &overrides).is_err());
    }
}
