//! OCI image-spec and distribution-spec documents.
//!
//! Manifests, indexes and descriptors are the `oci-spec` types; this module
//! adds digest helpers, constructors for the shapes ocidist publishes, and the
//! two distribution list responses.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

pub use oci_spec::image::{
    Descriptor, ImageIndex, ImageManifest, MediaType, ANNOTATION_REF_NAME, ANNOTATION_TITLE,
};
use oci_spec::image::{ImageIndexBuilder, ImageManifestBuilder, SCHEMA_VERSION};

use crate::error::{OciDistError, Result};

/// The two-byte empty JSON object used as an artifact config.
pub const EMPTY_JSON: &[u8] = b"{}";

/// Compute the `sha256:<hex>` digest of a byte slice.
pub fn sha256_digest(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

/// Split a digest into `(algorithm, encoded)`.
pub fn split_digest(digest: &str) -> Result<(&str, &str)> {
    match digest.split_once(':') {
        Some((algo, hash)) if !algo.is_empty() && !hash.is_empty() => Ok((algo, hash)),
        _ => Err(OciDistError::Validation(format!(
            "Failed to split digest '{}' into algo and hash",
            digest
        ))),
    }
}

/// Check fetched bytes against the digest they were addressed by.
///
/// Only sha256 can be recomputed, so any other algorithm is rejected.
pub fn verify_digest(digest: &str, data: &[u8]) -> Result<()> {
    let (algo, _) = split_digest(digest)?;
    if algo != "sha256" {
        return Err(OciDistError::Validation(format!(
            "Unsupported digest algorithm '{}' in {}",
            algo, digest
        )));
    }
    let actual = sha256_digest(data);
    if actual != digest {
        return Err(OciDistError::Validation(format!(
            "Content digest mismatch: expected {}, got {}",
            digest, actual
        )));
    }
    Ok(())
}

/// Describe `data` with the given media type.
pub fn descriptor_for(media_type: MediaType, data: &[u8]) -> Descriptor {
    Descriptor::new(media_type, data.len() as i64, sha256_digest(data))
}

/// The fixed empty-JSON config used by artifact manifests.
pub fn empty_config_descriptor() -> Descriptor {
    descriptor_for(MediaType::EmptyJSON, EMPTY_JSON)
}

/// Add one annotation to a descriptor.
pub fn annotate(desc: &mut Descriptor, key: &str, value: impl Into<String>) {
    let mut annotations = desc.annotations().clone().unwrap_or_default();
    annotations.insert(key.to_string(), value.into());
    desc.set_annotations(Some(annotations));
}

/// Look up one annotation of a descriptor.
pub fn annotation<'a>(desc: &'a Descriptor, key: &str) -> Option<&'a str> {
    desc.annotations()
        .as_ref()
        .and_then(|a| a.get(key))
        .map(|s| s.as_str())
}

/// An OCI image manifest with the given config and layers.
pub fn image_manifest(config: Descriptor, layers: Vec<Descriptor>) -> Result<ImageManifest> {
    Ok(ImageManifestBuilder::default()
        .schema_version(SCHEMA_VERSION)
        .media_type(MediaType::ImageManifest)
        .config(config)
        .layers(layers)
        .build()?)
}

/// An empty `index.json` for a new layout.
pub fn empty_index() -> Result<ImageIndex> {
    Ok(ImageIndexBuilder::default()
        .schema_version(SCHEMA_VERSION)
        .media_type(MediaType::ImageIndex)
        .manifests(Vec::new())
        .build()?)
}

pub fn parse_manifest(data: &[u8]) -> Result<ImageManifest> {
    Ok(serde_json::from_slice(data)?)
}

pub fn manifest_bytes(manifest: &ImageManifest) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(manifest)?)
}

/// True if `manifest` is attached to the manifest with `digest`.
pub fn refers_to(manifest: &ImageManifest, digest: &str) -> bool {
    manifest
        .subject()
        .as_ref()
        .is_some_and(|s| s.digest() == digest)
}

/// Response of `GET /v2/<name>/tags/list`.
///
/// Registries send `"tags": null` for an empty repository, which the
/// `oci-spec` list type does not accept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagList {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,
}

/// Response of `GET /v2/_catalog`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryList {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub repositories: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
