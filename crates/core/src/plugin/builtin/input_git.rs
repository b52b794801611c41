//! "git" input plugin: builds a request from a remote git repository.

use crate::errors::{OrchestratorError, Result};
use crate::plugin::{InputPluginDescriptor, PluginInstance};
use async_trait::async_trait;
use serde_json::{Map, Value};

pub const KEY: &str = "git";

struct GitInput {
    args: Map<String, Value>,
}

#[async_trait]
impl PluginInstance for GitInput {
    async fn run(&self) -> Result<Value> {
        let mut request = self.args.clone();
        if !request.contains_key("source") {
            let uri = request
                .get("uri")
                .and_then(|v| v.as_str())
                .ok_or_else(|| OrchestratorError::Config {
                    message: "'git' input plugin requires 'uri'".to_string(),
                })?;
            let git_ref = request.get("git_ref").and_then(|v| v.as_str());
            let mut source = serde_json::json!({ "provider": "git", "uri": uri });
            if let Some(git_ref) = git_ref {
                source["git_ref"] = Value::String(git_ref.to_string());
            }
            request.insert("source".to_string(), source);
        }
        Ok(Value::Object(request))
    }
}

fn is_usable_here() -> bool {
    std::env::var_os("BUILD_SOURCE_GIT_URL").is_some()
}

fn construct(args: Map<String, Value>) -> Result<Box<dyn PluginInstance>> {
    Ok(Box::new(GitInput { args }))
}

pub fn descriptor() -> InputPluginDescriptor {
    InputPluginDescriptor {
        key: KEY.to_string(),
        can_fail_default: false,
        is_usable_here,
        construct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_source_with_git_ref() {
        let mut args = Map::new();
        args.insert(
            "uri".to_string(),
            Value::String("https://example.com/repo.git".to_string()),
        );
        args.insert("git_ref".to_string(), Value::String("main".to_string()));
        let instance = construct(args).unwrap();
        let out = instance.run().await.unwrap();
        assert_eq!(out["source"]["provider"], "git");
        assert_eq!(out["source"]["git_ref"], "main");
    }

    #[tokio::test]
    async fn requires_uri() {
        let instance = construct(Map::new()).unwrap();
        assert!(instance.run().await.is_err());
    }
}
