//! The repository capability interface and backend selection.

use async_trait::async_trait;
use oci_spec::image::ImageConfiguration;
use ocidist_core::config::ApiConfig;
use ocidist_core::error::Result;
use ocidist_core::oci::{Descriptor, ImageIndex, ImageManifest, TagList};

use crate::layout_repo::LayoutRepo;
use crate::reference::{RepoType, RepositoryRef};
use crate::registry::RegistryRepo;

/// Operations shared by every repository backend.
///
/// A handle is bound to one parsed URL; the tag (or digest) in that URL is
/// the target of the manifest-level operations.
#[async_trait]
pub trait OciApi: Send + Sync {
    /// Which backend this is.
    fn repo_type(&self) -> RepoType;

    /// The URL this handle was created from.
    fn source_url(&self) -> &str;

    /// Repository path (registry) or layout directory (layout).
    fn repo_path(&self) -> &str;

    /// Tag (or digest) the handle points at; empty for a bare repository.
    fn repo_tag(&self) -> &str;

    /// Human-readable image name, e.g. `localhost:5000/ns/app`.
    fn image_name(&self) -> String;

    /// Tags of the repository.
    async fn list_tags(&self) -> Result<Vec<String>> {
        Ok(self.get_tag_list().await?.tags)
    }

    async fn list_repositories(&self) -> Result<Vec<String>>;

    async fn get_tag_list(&self) -> Result<TagList>;

    /// Fetch the manifest at the handle's tag, with its raw bytes.
    async fn get_manifest(&self) -> Result<(ImageManifest, Vec<u8>)>;

    async fn get_manifest_by_digest(
        &self,
        desc: &Descriptor,
    ) -> Result<(ImageManifest, Vec<u8>)>;

    async fn manifest_exists(&self) -> Result<bool>;

    /// Fetch and parse the image configuration a manifest points at.
    async fn get_image_config(&self, desc: &Descriptor) -> Result<ImageConfiguration>;

    /// Manifests whose subject is `desc`.
    async fn get_referrers(&self, desc: &Descriptor) -> Result<ImageIndex>;

    async fn get_blob(&self, desc: &Descriptor) -> Result<Vec<u8>>;

    async fn blob_exists(&self, desc: &Descriptor) -> Result<bool>;

    /// Upload a blob unless the repository already has it.
    async fn put_blob(&self, desc: &Descriptor, data: &[u8]) -> Result<()>;

    /// Push a manifest; returns the reference it was stored under.
    async fn put_manifest(&self, manifest: &ImageManifest) -> Result<String>;

    /// Publish `blob` as a single-layer artifact, attached to the manifest
    /// at the handle's tag when one exists.
    async fn put_artifact(&self, name: &str, artifact_type: &str, blob: &[u8]) -> Result<()> {
        crate::artifact::put_artifact(self, name, artifact_type, blob).await
    }
}

/// Parse `url` and construct the backend that serves it.
pub fn new_oci_api(url: &str, config: ApiConfig) -> Result<Box<dyn OciApi>> {
    let reference = RepositoryRef::parse(url)?;

    tracing::debug!(
        url = %url,
        backend = reference.repo_type().as_str(),
        tls_verify = config.tls_verify,
        "Selected repository backend"
    );

    Ok(match reference.repo_type() {
        RepoType::Registry => Box::new(RegistryRepo::new(reference, config)),
        RepoType::Layout => Box::new(LayoutRepo::new(reference, config)),
    })
}
