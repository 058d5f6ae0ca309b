//! Fetches and parses the OpenAPI specification the server mocks.

use super::Spec;
use anyhow::Context;
use serde_json::Value;

/// Load a specification from an http(s) URL or a local file path
/// (optionally `file://`-prefixed). JSON is tried first, then YAML.
pub async fn load(location: &str) -> anyhow::Result<Spec> {
    let text = if location.starts_with("http://") || location.starts_with("https://") {
        reqwest::get(location)
            .await
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("failed to fetch specification from {location:?}"))?
            .text()
            .await
            .context("failed to read specification response")?
    } else {
        let path = location.strip_prefix("file://").unwrap_or(location);
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read specification file {path:?}"))?
    };

    let root: Value = match serde_json::from_str(&text) {
        Ok(root) => root,
        Err(json_error) => serde_yaml::from_str(&text).map_err(|yaml_error| {
            anyhow::anyhow!(
                "specification is neither valid JSON ({json_error}) nor YAML ({yaml_error})"
            )
        })?,
    };

    Spec::from_value(root)
}

#[cfg(test)]
mod test {
    use std::io::Write;

    #[tokio::test]
    async fn test_load_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"openapi": "3.0.0", "paths": {{"/restconf/data/m:root": {{"get": {{}}}}}}}}"#,
        )
        .unwrap();

        let spec = super::load(file.path().to_str().unwrap()).await.unwrap();
        assert_eq!(spec.routes().len(), 1);
    }

    #[tokio::test]
    async fn test_load_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "openapi: 3.0.0\npaths:\n  /restconf/data/m:root:\n    get: {{}}\n",
        )
        .unwrap();

        let spec = super::load(file.path().to_str().unwrap()).await.unwrap();
        assert_eq!(spec.routes().len(), 1);
    }
}
