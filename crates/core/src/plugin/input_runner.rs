//! Input-phase plugin runner and auto-selection (§4.4)
//!
//! Grounded on `InputPluginsRunner.run()`: when the first (and only)
//! configured input plugin is named `"auto"`, probe every loaded input
//! plugin's usability and require exactly one usable candidate before
//! rewriting the configured name and delegating to the general runner.

use super::runner::run_phase;
use super::{BoundPluginEntry, InputPluginDescriptor, PluginConfigEntry, AUTO_INPUT_KEY, AUTO_INPUT_NAME};
use crate::errors::{OrchestratorError, Result};
use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::info;

/// Run the input phase. `configured` must contain exactly the input plugin
/// list from the build request; when its first entry names [`AUTO_INPUT_NAME`]
/// it is resolved in place before running. The chosen plugin's output is
/// stored under [`AUTO_INPUT_KEY`] regardless of the plugin's own key, so
/// callers always find the build specification at one fixed location.
pub async fn run_input_phase(
    loaded: &[InputPluginDescriptor],
    configured: &mut [PluginConfigEntry],
    results: &mut IndexMap<String, serde_json::Value>,
) -> Result<()> {
    let Some(first) = configured.first_mut() else {
        return Err(OrchestratorError::WorkflowFatal {
            message: "no input plugin configured".to_string(),
        });
    };

    if first.name == AUTO_INPUT_NAME {
        info!("input is autoused, trying to find usable input plugin");
        let usable: Vec<&str> = loaded
            .iter()
            .filter(|d| (d.is_usable_here)())
            .map(|d| d.key.as_str())
            .collect();

        match usable.len() {
            0 => {
                return Err(OrchestratorError::WorkflowFatal {
                    message: "no autousable input plugin, please specify input explicitly"
                        .to_string(),
                });
            }
            1 => {
                let chosen = usable[0].to_string();
                info!("using input plugin '{}'", chosen);
                first.name = chosen;
            }
            _ => {
                return Err(OrchestratorError::WorkflowFatal {
                    message: format!(
                        "multiple usable input plugins: [{}], please specify input explicitly",
                        usable.join(", ")
                    ),
                });
            }
        }
    }

    let chosen_name = configured[0].name.clone();

    let mut bound: HashMap<String, BoundPluginEntry> = HashMap::new();
    for descriptor in loaded {
        let construct = descriptor.construct;
        bound.insert(
            descriptor.key.clone(),
            BoundPluginEntry {
                key: descriptor.key.clone(),
                can_fail_default: descriptor.can_fail_default,
                instantiate: Box::new(move |args| construct(args)),
            },
        );
    }

    let mut raw_results = IndexMap::new();
    run_phase(configured, &bound, &mut raw_results).await?;

    if let Some(value) = raw_results.shift_remove(&chosen_name) {
        results.insert(AUTO_INPUT_KEY.to_string(), value);
    }
    Ok(())
}
