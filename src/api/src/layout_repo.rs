//! Layout backend: the repository contract over a local OCI image layout.
//!
//! Layouts have no referrers query, so [`LayoutRepo::get_referrers`] scans
//! every manifest in `index.json` for a matching subject. Writes are not
//! supported through this backend.

use async_trait::async_trait;
use oci_spec::image::ImageConfiguration;
use ocidist_core::config::ApiConfig;
use ocidist_core::error::{OciDistError, Result};
use ocidist_core::oci::{
    empty_index, parse_manifest, refers_to, Descriptor, ImageIndex, ImageManifest, MediaType,
    TagList,
};

use crate::api::OciApi;
use crate::layout::OciLayout;
use crate::reference::{RepoType, RepositoryRef};

/// An image (or the whole layout) inside an OCI layout directory.
#[derive(Debug, Clone)]
pub struct LayoutRepo {
    reference: RepositoryRef,
    config: ApiConfig,
    dir: String,
}

impl LayoutRepo {
    pub fn new(reference: RepositoryRef, config: ApiConfig) -> Self {
        let dir = reference.layout_dir();
        Self {
            reference,
            config,
            dir,
        }
    }

    fn open(&self) -> Result<OciLayout> {
        OciLayout::open(&self.dir)
    }

    /// The single manifest descriptor the URL's `image[:tag]` names.
    fn resolve_manifest(&self, layout: &OciLayout) -> Result<Descriptor> {
        if self.reference.image().is_empty() {
            return Err(OciDistError::Validation(format!(
                "No image name in url '{}'",
                self.reference.raw()
            )));
        }

        let name = self.reference.layout_ref_name();
        let mut resolved = layout.resolve_reference(&name)?;
        if resolved.len() != 1 {
            return Err(OciDistError::Validation(format!(
                "bad descriptor: reference '{}' in {} resolved to {} descriptors",
                name,
                self.dir,
                resolved.len()
            )));
        }

        let desc = resolved.remove(0);
        if desc.media_type() != &MediaType::ImageManifest {
            return Err(OciDistError::Validation(format!(
                "bad descriptor: reference '{}' has media type '{}'",
                name,
                desc.media_type()
            )));
        }
        Ok(desc)
    }

    fn read_manifest(layout: &OciLayout, digest: &str) -> Result<(ImageManifest, Vec<u8>)> {
        let raw = layout.read_blob(digest)?;
        let manifest = parse_manifest(&raw)?;
        Ok((manifest, raw))
    }

    fn unsupported(&self, operation: &str) -> OciDistError {
        OciDistError::NotImplemented(format!(
            "{} is not supported for oci layout '{}'",
            operation, self.dir
        ))
    }
}

#[async_trait]
impl OciApi for LayoutRepo {
    fn repo_type(&self) -> RepoType {
        RepoType::Layout
    }

    fn source_url(&self) -> &str {
        self.reference.raw()
    }

    fn repo_path(&self) -> &str {
        &self.dir
    }

    fn repo_tag(&self) -> &str {
        self.reference.tag()
    }

    fn image_name(&self) -> String {
        self.reference.image().to_string()
    }

    async fn list_repositories(&self) -> Result<Vec<String>> {
        self.open()?;
        Ok(vec![self.dir.clone()])
    }

    async fn get_tag_list(&self) -> Result<TagList> {
        if !self.reference.image().is_empty() {
            return Ok(TagList::default());
        }

        let layout = self.open()?;
        let name = std::path::Path::new(&self.dir)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.dir.clone());
        Ok(TagList {
            name,
            tags: layout.list_references()?,
        })
    }

    async fn get_manifest(&self) -> Result<(ImageManifest, Vec<u8>)> {
        let layout = self.open()?;
        let desc = self.resolve_manifest(&layout)?;
        Self::read_manifest(&layout, desc.digest())
    }

    async fn get_manifest_by_digest(
        &self,
        desc: &Descriptor,
    ) -> Result<(ImageManifest, Vec<u8>)> {
        Self::read_manifest(&self.open()?, desc.digest())
    }

    async fn manifest_exists(&self) -> Result<bool> {
        if self.reference.image().is_empty() {
            return Ok(false);
        }
        let layout = self.open()?;
        Ok(!layout
            .resolve_reference(&self.reference.layout_ref_name())?
            .is_empty())
    }

    async fn get_image_config(&self, desc: &Descriptor) -> Result<ImageConfiguration> {
        if desc.media_type() != &MediaType::ImageConfig {
            return Err(OciDistError::Validation(format!(
                "Descriptor {} has media type '{}', expected '{}'",
                desc.digest(),
                desc.media_type(),
                MediaType::ImageConfig
            )));
        }
        let raw = self.open()?.read_blob(desc.digest())?;
        Ok(serde_json::from_slice(&raw)?)
    }

    async fn get_referrers(&self, desc: &Descriptor) -> Result<ImageIndex> {
        let layout = self.open()?;
        let index = layout.read_index()?;

        let mut referrers = Vec::new();
        for entry in index.manifests().iter().filter(|d| {
            d.media_type() == &MediaType::ImageManifest && d.digest() != desc.digest()
        }) {
            let (manifest, _) = Self::read_manifest(&layout, entry.digest())?;
            if refers_to(&manifest, desc.digest()) {
                let mut referrer =
                    Descriptor::new(entry.media_type().clone(), entry.size(), entry.digest());
                referrer.set_artifact_type(manifest.artifact_type().clone());
                referrers.push(referrer);
            }
        }

        if self.config.debug {
            tracing::info!(
                subject = %desc.digest(),
                scanned = index.manifests().len(),
                found = referrers.len(),
                "Scanned layout index for referrers"
            );
        }

        let mut result = empty_index()?;
        result.set_manifests(referrers);
        Ok(result)
    }

    async fn get_blob(&self, desc: &Descriptor) -> Result<Vec<u8>> {
        self.open()?.read_blob(desc.digest())
    }

    async fn blob_exists(&self, desc: &Descriptor) -> Result<bool> {
        Ok(self.open()?.has_blob(desc.digest()))
    }

    async fn put_blob(&self, _desc: &Descriptor, _data: &[u8]) -> Result<()> {
        Err(self.unsupported("PutBlob"))
    }

    async fn put_manifest(&self, _manifest: &ImageManifest) -> Result<String> {
        Err(self.unsupported("PutManifest"))
    }

    async fn put_artifact(&self, _name: &str, _artifact_type: &str, _blob: &[u8]) -> Result<()> {
        Err(self.unsupported("PutArtifact"))
    }
}
