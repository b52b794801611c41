//! "path" input plugin: builds a request from a local filesystem source.
//!
//! Grounded on `InputPlugin`/`is_autousable()` in `plugin.py`: a class-level
//! usability probe with no instance state, used by auto-selection (§4.4).

use crate::errors::{OrchestratorError, Result};
use crate::plugin::{InputPluginDescriptor, PluginInstance};
use async_trait::async_trait;
use serde_json::{Map, Value};

pub const KEY: &str = "path";

struct PathInput {
    args: Map<String, Value>,
}

#[async_trait]
impl PluginInstance for PathInput {
    async fn run(&self) -> Result<Value> {
        let mut request = self.args.clone();
        if !request.contains_key("source") {
            let uri = request
                .get("uri")
                .and_then(|v| v.as_str())
                .ok_or_else(|| OrchestratorError::Config {
                    message: "'path' input plugin requires 'uri'".to_string(),
                })?;
            request.insert(
                "source".to_string(),
                serde_json::json!({ "provider": "path", "uri": uri }),
            );
        }
        Ok(Value::Object(request))
    }
}

fn is_usable_here() -> bool {
    std::env::var_os("BUILD_SOURCE_PATH_INPUT").is_some()
}

fn construct(args: Map<String, Value>) -> Result<Box<dyn PluginInstance>> {
    Ok(Box::new(PathInput { args }))
}

pub fn descriptor() -> InputPluginDescriptor {
    InputPluginDescriptor {
        key: KEY.to_string(),
        can_fail_default: false,
        is_usable_here,
        construct,
    }
}
