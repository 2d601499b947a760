//! Publishing single-blob artifacts.
//!
//! An artifact is a manifest with an empty config, one layer holding the
//! blob, an `artifactType`, and (when the target tag already exists) a
//! `subject` linking it to that manifest.

use ocidist_core::error::{Result, ResultExt};
use ocidist_core::oci::{
    annotate, descriptor_for, empty_config_descriptor, image_manifest, sha256_digest, Descriptor,
    MediaType, ANNOTATION_TITLE, EMPTY_JSON,
};

use crate::api::OciApi;

/// Media type of an artifact's single layer.
pub const ARTIFACT_LAYER_MEDIA_TYPE: &str = "application/octet-stream";

/// Push `blob` as an artifact named `name` through `api`.
///
/// Steps run strictly in order and the first failure aborts; blobs that
/// were already uploaded are left in place.
pub async fn put_artifact<A: OciApi + ?Sized>(
    api: &A,
    name: &str,
    artifact_type: &str,
    blob: &[u8],
) -> Result<()> {
    let config = empty_config_descriptor();
    api.put_blob(&config, EMPTY_JSON)
        .await
        .context("Failed to put empty config blob")?;

    let mut layer = descriptor_for(MediaType::from(ARTIFACT_LAYER_MEDIA_TYPE), blob);
    annotate(&mut layer, ANNOTATION_TITLE, name);
    api.put_blob(&layer, blob)
        .await
        .with_context(|| format!("Failed to put artifact blob '{}'", name))?;

    let mut manifest =
        image_manifest(config, vec![layer]).context("Failed composing artifact manifest")?;
    manifest.set_artifact_type(Some(MediaType::from(artifact_type)));

    if api
        .manifest_exists()
        .await
        .context("Failed to check for subject manifest")?
    {
        let (subject, raw) = api
            .get_manifest()
            .await
            .context("Failed to get subject manifest")?;
        let media_type = subject
            .media_type()
            .clone()
            .unwrap_or(MediaType::ImageManifest);
        manifest.set_subject(Some(Descriptor::new(
            media_type,
            raw.len() as i64,
            sha256_digest(&raw),
        )));
    }

    let reference = api
        .put_manifest(&manifest)
        .await
        .with_context(|| format!("Failed to PUT artifact '{}' manifest", name))?;

    tracing::info!(
        name = %name,
        artifact_type = %artifact_type,
        reference = %reference,
        subject = manifest.subject().as_ref().map(|s| s.digest().as_str()).unwrap_or(""),
        "Published artifact"
    );
    Ok(())
}
