//! General plugin runner (§4.2)
//!
//! Executes a configured plugin list for one phase against a shared result
//! map. This is the phase-agnostic core of the pipeline: both
//! [`super::input_runner`] and [`super::build_runner`] bind their
//! phase-specific descriptors down to [`BoundPluginEntry`] and delegate here.
//!
//! Grounded directly on `PluginsRunner.run()`: resolve name → resolve args →
//! resolve class → resolve fatality → instantiate → run → record outcome →
//! raise at phase end iff the failure buffer is non-empty.

use super::{BoundPluginEntry, PluginConfigEntry};
use crate::errors::{OrchestratorError, Result};
use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Execute `configured` against `plugins` in order, writing outcomes into
/// `results`. Returns `Ok(())` if no non-tolerated plugin raised, else
/// `Err(OrchestratorError::PhaseFailed)` with the accumulated message(s).
pub async fn run_phase(
    configured: &[PluginConfigEntry],
    plugins: &HashMap<String, BoundPluginEntry>,
    results: &mut IndexMap<String, serde_json::Value>,
) -> Result<()> {
    let mut failed_msgs: Vec<String> = Vec::new();

    for entry in configured {
        // 1. Name presence is guaranteed by the typed `PluginConfigEntry`,
        //    but an empty name is still invalid configuration.
        if entry.name.is_empty() {
            error!("invalid plugin request, empty 'name'");
            continue;
        }

        // 2. args must be a mapping if present.
        let Some(args) = entry.args_as_map() else {
            error!(
                "invalid plugin request for '{}': 'args' is not a mapping",
                entry.name
            );
            continue;
        };

        // 3. Resolve name to a loaded plugin.
        let Some(plugin) = plugins.get(&entry.name) else {
            error!(
                "no such plugin: '{}', did you set the correct phase?",
                entry.name
            );
            continue;
        };

        // 4. Fatality precedence: per-entry override > class default > true.
        let can_fail = entry.can_fail.unwrap_or(plugin.can_fail_default);

        // Per-plugin logging scope, matching the original's
        // `logging.getLogger("atomic_reactor.plugins." + key)`: a fixed
        // target (tracing spans carry dynamic fields, not dynamic targets)
        // plus a `plugin` field carrying the key, so every log line emitted
        // while this plugin runs is addressable by it.
        let span = info_span!(target: "orchestrator::plugins", "plugin", plugin = %plugin.key);
        let _enter = span.enter();
        debug!("resolved can_fail={} for plugin '{}'", can_fail, plugin.key);

        // 5. Instantiate.
        let instance = match (plugin.instantiate)(args) {
            Ok(instance) => instance,
            Err(e) => {
                let msg = format!("plugin '{}' failed to instantiate: {}", plugin.key, e);
                warn!("{}", msg);
                if !can_fail {
                    failed_msgs.push(msg.clone());
                }
                results.insert(plugin.key.clone(), serde_json::Value::String(msg));
                continue;
            }
        };

        info!("running plugin '{}'", plugin.key);
        drop(_enter);

        // 6-7. Run and handle the outcome, inside the plugin's own span.
        match instance.run().instrument(span.clone()).await {
            Ok(value) => {
                results.insert(plugin.key.clone(), value);
            }
            Err(e) => {
                let _enter = span.enter();
                let msg = format!("plugin '{}' raised an exception: {}", plugin.key, e);
                warn!("{}", msg);
                debug!("plugin '{}' failure detail: {:?}", plugin.key, e);
                if !can_fail {
                    failed_msgs.push(msg.clone());
                } else {
                    info!("error is not fatal, continuing...");
                }
                drop(_enter);
                results.insert(plugin.key.clone(), serde_json::Value::String(msg));
            }
        }
    }

    match failed_msgs.len() {
        0 => Ok(()),
        1 => Err(OrchestratorError::PhaseFailed {
            message: failed_msgs.into_iter().next().unwrap(),
        }),
        _ => Err(OrchestratorError::PhaseFailed {
            message: format!(
                "multiple plugins raised an exception: [{}]",
                failed_msgs.join(", ")
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginInstance;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Recording {
        value: serde_json::Value,
        order: Arc<AtomicUsize>,
        position: usize,
    }

    #[async_trait]
    impl PluginInstance for Recording {
        async fn run(&self) -> Result<serde_json::Value> {
            self.order.store(self.position, Ordering::SeqCst);
            Ok(self.value.clone())
        }
    }

    struct Raising;

    #[async_trait]
    impl PluginInstance for Raising {
        async fn run(&self) -> Result<serde_json::Value> {
            Err(OrchestratorError::WorkflowFatal {
                message: "boom".to_string(),
            })
        }
    }

    fn entry(
        key: &str,
        can_fail_default: bool,
        instantiate: impl Fn(serde_json::Map<String, serde_json::Value>) -> Result<Box<dyn PluginInstance>>
            + Send
            + Sync
            + 'static,
    ) -> BoundPluginEntry {
        BoundPluginEntry {
            key: key.to_string(),
            can_fail_default,
            instantiate: Box::new(instantiate),
        }
    }

    #[tokio::test]
    async fn s1_non_tolerated_failure_fails_the_phase() {
        let mut plugins = HashMap::new();
        plugins.insert(
            "A".to_string(),
            entry("A", true, |_| {
                Ok(Box::new(Recording {
                    value: serde_json::json!(42),
                    order: Arc::new(AtomicUsize::new(0)),
                    position: 0,
                }) as Box<dyn PluginInstance>)
            }),
        );
        plugins.insert("B".to_string(), entry("B", true, |_| Ok(Box::new(Raising))));

        let configured = vec![
            PluginConfigEntry::new("A"),
            PluginConfigEntry::new("B").with_can_fail(false),
        ];
        let mut results = IndexMap::new();
        let outcome = run_phase(&configured, &plugins, &mut results).await;

        assert!(matches!(outcome, Err(OrchestratorError::PhaseFailed { .. })));
        assert_eq!(results.get("A"), Some(&serde_json::json!(42)));
        assert!(results.get("B").unwrap().as_str().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn s2_tolerated_failure_does_not_fail_the_phase() {
        let mut plugins = HashMap::new();
        plugins.insert(
            "A".to_string(),
            entry("A", true, |_| Ok(Box::new(Recording {
                value: serde_json::json!(42),
                order: Arc::new(AtomicUsize::new(0)),
                position: 0,
            }))),
        );
        plugins.insert("B".to_string(), entry("B", true, |_| Ok(Box::new(Raising))));

        let configured = vec![
            PluginConfigEntry::new("A"),
            PluginConfigEntry::new("B").with_can_fail(true),
        ];
        let mut results = IndexMap::new();
        let outcome = run_phase(&configured, &plugins, &mut results).await;

        assert!(outcome.is_ok());
        assert_eq!(results.get("A"), Some(&serde_json::json!(42)));
        assert!(results.get("B").unwrap().as_str().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn s6_missing_plugin_is_skipped_not_fatal() {
        let mut plugins = HashMap::new();
        plugins.insert(
            "A".to_string(),
            entry("A", true, |_| Ok(Box::new(Recording {
                value: serde_json::json!("ok"),
                order: Arc::new(AtomicUsize::new(0)),
                position: 0,
            }))),
        );

        let configured = vec![PluginConfigEntry::new("missing"), PluginConfigEntry::new("A")];
        let mut results = IndexMap::new();
        let outcome = run_phase(&configured, &plugins, &mut results).await;

        assert!(outcome.is_ok());
        assert_eq!(results.len(), 1);
        assert_eq!(results.get("A"), Some(&serde_json::json!("ok")));
    }

    #[tokio::test]
    async fn order_preservation() {
        let order = Arc::new(AtomicUsize::new(999));
        let mut plugins: HashMap<String, BoundPluginEntry> = HashMap::new();
        for (i, key) in ["first", "second"].iter().enumerate() {
            let order = order.clone();
            let key_owned = key.to_string();
            plugins.insert(
                key_owned.clone(),
                entry(key, true, move |_| {
                    Ok(Box::new(Recording {
                        value: serde_json::json!(i),
                        order: order.clone(),
                        position: i,
                    }))
                }),
            );
        }

        let configured = vec![
            PluginConfigEntry::new("first"),
            PluginConfigEntry::new("second"),
        ];
        let mut results = IndexMap::new();
        run_phase(&configured, &plugins, &mut results).await.unwrap();

        let keys: Vec<&String> = results.keys().collect();
        assert_eq!(keys, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn invalid_args_are_skipped() {
        let mut plugins = HashMap::new();
        plugins.insert(
            "A".to_string(),
            entry("A", true, |_| Ok(Box::new(Recording {
                value: serde_json::json!(1),
                order: Arc::new(AtomicUsize::new(0)),
                position: 0,
            }))),
        );
        let configured = vec![PluginConfigEntry::new("A").with_args(serde_json::json!([1, 2]))];
        let mut results = IndexMap::new();
        let outcome = run_phase(&configured, &plugins, &mut results).await;
        assert!(outcome.is_ok());
        assert!(results.is_empty());
    }
}
