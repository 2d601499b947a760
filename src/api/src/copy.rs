//! Copying one image between repositories.

use std::iter;

use ocidist_core::config::ApiConfig;
use ocidist_core::error::{OciDistError, Result, ResultExt};
use ocidist_core::oci::{sha256_digest, Descriptor, MediaType};

use crate::api::{new_oci_api, OciApi};
use crate::layout::OciLayout;
use crate::reference::{RepoType, RepositoryRef};
use crate::registry::RegistryRepo;

/// Schemes accepted on either side of a copy.
const COPY_SCHEMES: [&str; 3] = ["ocidist", "docker", "oci"];

/// Per-side TLS settings for [`image_copy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCopyOpts {
    pub src_skip_tls: bool,
    pub dest_skip_tls: bool,
    pub debug: bool,
}

fn parse_copy_url(url: &str) -> Result<RepositoryRef> {
    let reference = RepositoryRef::parse(url)?;
    if !COPY_SCHEMES.contains(&reference.scheme()) {
        return Err(OciDistError::UnsupportedScheme {
            scheme: reference.scheme().to_string(),
            url: url.to_string(),
        });
    }
    Ok(reference)
}

/// Copy the manifest at `src` with its config and layers to `dest`.
///
/// Manifest bytes are copied verbatim so the image keeps its digest.
pub async fn image_copy(src: &str, dest: &str, opts: ImageCopyOpts) -> Result<()> {
    parse_copy_url(src)?;
    let dest_ref = parse_copy_url(dest)?;

    let src_api = new_oci_api(
        src,
        ApiConfig {
            tls_verify: !opts.src_skip_tls,
            debug: opts.debug,
        },
    )?;
    let dest_config = ApiConfig {
        tls_verify: !opts.dest_skip_tls,
        debug: opts.debug,
    };

    let (manifest, raw) = src_api
        .get_manifest()
        .await
        .with_context(|| format!("Failed to read source manifest {}", src))?;
    let blobs: Vec<&Descriptor> = iter::once(manifest.config())
        .chain(manifest.layers().iter())
        .collect();
    let media_type = manifest
        .media_type()
        .clone()
        .unwrap_or(MediaType::ImageManifest);

    tracing::info!(src = %src, dest = %dest, blobs = blobs.len(), "Copying image");

    match dest_ref.repo_type() {
        RepoType::Registry => {
            let tag = dest_ref.reference().to_string();
            if tag.is_empty() {
                return Err(OciDistError::Validation(format!(
                    "No destination tag in url '{}'",
                    dest
                )));
            }
            let dest_repo = RegistryRepo::new(dest_ref, dest_config);
            for desc in blobs {
                if dest_repo.blob_exists(desc).await? {
                    tracing::debug!(digest = %desc.digest(), "Blob already at destination");
                    continue;
                }
                let data = src_api.get_blob(desc).await?;
                dest_repo
                    .put_blob(desc, &data)
                    .await
                    .with_context(|| format!("Failed to copy blob {}", desc.digest()))?;
            }
            dest_repo
                .put_raw_manifest(&tag, &media_type.to_string(), &raw)
                .await
                .context("Failed to put destination manifest")?;
        }
        RepoType::Layout => {
            if dest_ref.image().is_empty() {
                return Err(OciDistError::Validation(format!(
                    "No destination image name in url '{}'",
                    dest
                )));
            }
            let layout = OciLayout::create(dest_ref.layout_dir())?;
            for desc in blobs {
                if layout.has_blob(desc.digest()) {
                    continue;
                }
                let data = src_api.get_blob(desc).await?;
                layout.write_blob(desc.digest(), &data)?;
            }

            let manifest_desc = Descriptor::new(media_type, raw.len() as i64, sha256_digest(&raw));
            layout.write_blob(manifest_desc.digest(), &raw)?;
            layout.tag_manifest(&manifest_desc, &dest_ref.layout_ref_name())?;
        }
    }

    tracing::info!(
        src = %src,
        dest = %dest,
        digest = %sha256_digest(&raw),
        "Copied image"
    );
    Ok(())
}
