//! `ocidist inspect` command - image metadata as JSON.

use std::collections::HashMap;

use clap::Args;
use oci_spec::image::ImageConfiguration;
use ocidist_api::{new_oci_api, RepoType};
use ocidist_core::oci::{sha256_digest, ImageManifest};
use serde::Serialize;

use super::Settings;
use crate::output;

#[derive(Args)]
pub struct InspectArgs {
    /// Image URL, e.g. ocidist://localhost:5000/myrepo/myimage:v2.1
    pub url: String,
}

/// Inspect report, field names as printed by `skopeo inspect`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InspectOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub digest: String,
    pub repo_tags: Vec<String>,
    pub created: Option<String>,
    pub labels: Option<HashMap<String, String>>,
    pub architecture: String,
    pub os: String,
    pub layers: Vec<String>,
    pub env: Option<Vec<String>>,
}

impl InspectOutput {
    fn new(
        name: Option<String>,
        raw_manifest: &[u8],
        manifest: &ImageManifest,
        image: &ImageConfiguration,
        repo_tags: Vec<String>,
    ) -> Self {
        let config = image.config().as_ref();
        Self {
            name,
            digest: sha256_digest(raw_manifest),
            repo_tags,
            created: image.created().clone(),
            labels: config.and_then(|c| c.labels().clone()),
            architecture: image.architecture().to_string(),
            os: image.os().to_string(),
            layers: manifest.layers().iter().map(|l| l.digest().clone()).collect(),
            env: config.and_then(|c| c.env().clone()),
        }
    }
}

pub async fn execute(args: InspectArgs, settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let api = new_oci_api(&args.url, settings.api)?;

    let (manifest, raw) = api.get_manifest().await?;
    let image = api.get_image_config(manifest.config()).await?;
    let tags = api.list_tags().await?;

    let name = match api.repo_type() {
        RepoType::Registry => Some(api.image_name()),
        RepoType::Layout => None,
    };

    let report = InspectOutput::new(name, &raw, &manifest, &image, tags);
    println!("{}", output::to_json_indent(&report, 4)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocidist_core::oci::{descriptor_for, image_manifest, manifest_bytes, MediaType};

    const CONFIG: &str = r#"{
        "created": "2024-05-01T10:00:00Z",
        "architecture": "arm64",
        "os": "linux",
        "config": {"Env": ["PATH=/usr/bin"], "Labels": {"version": "2.1"}},
        "rootfs": {"type": "layers", "diff_ids": []}
    }"#;

    fn report(name: Option<String>) -> serde_json::Value {
        let image: ImageConfiguration = serde_json::from_str(CONFIG).unwrap();
        let config = descriptor_for(MediaType::ImageConfig, CONFIG.as_bytes());
        let layer = descriptor_for(MediaType::ImageLayer, b"l");
        let manifest = image_manifest(config, vec![layer.clone()]).unwrap();
        let raw = manifest_bytes(&manifest).unwrap();

        let output = InspectOutput::new(name, &raw, &manifest, &image, vec!["v2.1".to_string()]);
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["Digest"], sha256_digest(&raw));
        assert_eq!(value["Layers"], serde_json::json!([layer.digest()]));
        value
    }

    #[test]
    fn test_inspect_fields() {
        let value = report(Some("localhost:5000/myrepo/myimage".to_string()));
        assert_eq!(value["Name"], "localhost:5000/myrepo/myimage");
        assert_eq!(value["RepoTags"], serde_json::json!(["v2.1"]));
        assert_eq!(value["Created"], "2024-05-01T10:00:00Z");
        assert_eq!(value["Architecture"], "arm64");
        assert_eq!(value["Os"], "linux");
        assert_eq!(value["Labels"]["version"], "2.1");
        assert_eq!(value["Env"], serde_json::json!(["PATH=/usr/bin"]));
    }

    #[test]
    fn test_layout_report_has_no_name() {
        let value = report(None);
        assert!(value.get("Name").is_none());
    }
}
