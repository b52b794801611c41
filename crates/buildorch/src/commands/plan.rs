use anyhow::{Context, Result};
use buildorch_core::workflow::BuildRequest;
use std::path::Path;

/// Load a build-plan file as TOML, falling back to JSON when the extension
/// says so.
pub fn load_build_request(path: &Path) -> Result<BuildRequest> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading build plan '{}'", path.display()))?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(&contents)
            .with_context(|| format!("parsing build plan '{}' as JSON", path.display())),
        _ => toml::from_str(&contents)
            .with_context(|| format!("parsing build plan '{}' as TOML", path.display())),
    }
}

/// Validate `path` and pretty-print the resulting build request, without
/// running it.
pub fn run(path: &Path) -> Result<()> {
    let request = load_build_request(path)?;
    println!("{}", serde_json::to_string_pretty(&request)?);
    Ok(())
}
