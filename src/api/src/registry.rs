//! Registry backend speaking the OCI distribution protocol.
//!
//! Every operation builds its own `reqwest` client from the immutable
//! [`ApiConfig`], so a handle carries no connection state.

use async_trait::async_trait;
use oci_spec::image::ImageConfiguration;
use ocidist_core::config::ApiConfig;
use ocidist_core::error::{OciDistError, Result};
use ocidist_core::oci::{
    manifest_bytes, parse_manifest, sha256_digest, verify_digest, Descriptor, ImageIndex,
    ImageManifest, MediaType, RepositoryList, TagList,
};
use reqwest::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};

use crate::api::OciApi;
use crate::reference::{RepoType, RepositoryRef};

/// User agent sent with every registry request.
pub const USER_AGENT: &str = concat!(
    "ocidist/",
    env!("CARGO_PKG_VERSION"),
    " (https://github.com/project-machine/ocidist)"
);

/// Media types accepted when fetching manifests.
const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.manifest.v1+json, \
     application/vnd.docker.distribution.manifest.v2+json";

const CONTENT_TYPE_BLOB: &str = "application/octet-stream";

/// A repository on a remote registry.
#[derive(Debug, Clone)]
pub struct RegistryRepo {
    reference: RepositoryRef,
    config: ApiConfig,
    base_path: String,
}

impl RegistryRepo {
    pub fn new(reference: RepositoryRef, config: ApiConfig) -> Self {
        let protocol = if config.tls_verify { "https" } else { "http" };
        let base_path = format!("{}://{}", protocol, reference.authority());
        Self {
            reference,
            config,
            base_path,
        }
    }

    /// `http://<authority>` or `https://<authority>`.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    fn client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(!self.config.tls_verify)
            .build()
            .map_err(|e| OciDistError::Network(format!("Failed to build HTTP client: {}", e)))
    }

    fn repo_url(&self, suffix: &str) -> String {
        format!("{}/v2/{}/{}", self.base_path, self.reference.path(), suffix)
    }

    fn require_repository(&self) -> Result<()> {
        if self.reference.path().is_empty() {
            return Err(OciDistError::Validation(format!(
                "No repository path in url '{}'",
                self.reference.raw()
            )));
        }
        Ok(())
    }

    fn request(&self, method: Method, url: &str) -> Result<RequestBuilder> {
        Ok(self.client()?.request(method, url))
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| OciDistError::Network(format!("Failed to {}: {}", what, e)))?;

        if self.config.debug {
            tracing::info!(
                url = %response.url(),
                status = response.status().as_u16(),
                "{}",
                what
            );
        } else {
            tracing::debug!(
                url = %response.url(),
                status = response.status().as_u16(),
                "{}",
                what
            );
        }
        Ok(response)
    }

    /// GET a resource that must answer 2xx; 404 maps to NotFound.
    async fn get_bytes(&self, url: &str, accept: &str, what: &str) -> Result<Vec<u8>> {
        let request = self.request(Method::GET, url)?.header(ACCEPT, accept);
        let response = self.send(request, what).await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(OciDistError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(OciDistError::Protocol {
                context: format!("Failed to {} {}", what, url),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| OciDistError::Network(format!("Failed to read response body: {}", e)))?;
        Ok(body.to_vec())
    }

    async fn fetch_manifest(&self, reference: &str) -> Result<(ImageManifest, Vec<u8>)> {
        self.require_repository()?;
        if reference.is_empty() {
            return Err(OciDistError::Validation(format!(
                "No tag or digest in url '{}'",
                self.reference.raw()
            )));
        }

        let url = self.repo_url(&format!("manifests/{}", reference));
        let raw = self.get_bytes(&url, MANIFEST_ACCEPT, "GET manifest").await?;
        if reference.contains(':') {
            verify_digest(reference, &raw)?;
        }
        let manifest = parse_manifest(&raw)?;
        Ok((manifest, raw))
    }

    /// PUT manifest bytes under `reference` (a tag or digest).
    pub async fn put_raw_manifest(
        &self,
        reference: &str,
        media_type: &str,
        raw: &[u8],
    ) -> Result<()> {
        self.require_repository()?;
        let media_type = if media_type.is_empty() {
            MediaType::ImageManifest.to_string()
        } else {
            media_type.to_string()
        };

        let url = self.repo_url(&format!("manifests/{}", reference));
        let request = self
            .request(Method::PUT, &url)?
            .header(CONTENT_TYPE, media_type)
            .body(raw.to_vec());
        let response = self.send(request, "PUT manifest").await?;

        if response.status() != StatusCode::CREATED {
            return Err(OciDistError::Protocol {
                context: format!("Failed to PUT manifest {}", url),
                status: response.status().as_u16(),
            });
        }

        tracing::debug!(
            repository = %self.reference.path(),
            reference = %reference,
            digest = %sha256_digest(raw),
            "Pushed manifest"
        );
        Ok(())
    }

    /// Resolve an upload `Location` header against the URL that was POSTed.
    fn upload_url(start_url: &str, location: &str) -> Result<Url> {
        Url::parse(start_url)
            .and_then(|base| base.join(location))
            .map_err(|e| {
                OciDistError::Validation(format!(
                    "Invalid upload location '{}' from {}: {}",
                    location, start_url, e
                ))
            })
    }

    async fn upload_blob(&self, desc: &Descriptor, data: &[u8]) -> Result<()> {
        let start_url = self.repo_url("blobs/uploads/");
        let response = self
            .send(self.request(Method::POST, &start_url)?, "POST blob upload")
            .await?;

        if !response.status().is_success() {
            return Err(OciDistError::Protocol {
                context: format!("Failed to POST blob upload {}", start_url),
                status: response.status().as_u16(),
            });
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                OciDistError::Validation(format!(
                    "Blob upload to {} returned no Location header",
                    start_url
                ))
            })?;
        let upload_url = Self::upload_url(&start_url, location)?;

        let request = self
            .request(Method::PUT, upload_url.as_str())?
            .query(&[("digest", desc.digest().as_str())])
            .header(CONTENT_TYPE, CONTENT_TYPE_BLOB)
            .header(CONTENT_LENGTH, data.len())
            .body(data.to_vec());
        let response = self.send(request, "PUT blob").await?;

        if response.status() != StatusCode::CREATED {
            return Err(OciDistError::Protocol {
                context: format!("Failed to PUT blob {}", desc.digest()),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl OciApi for RegistryRepo {
    fn repo_type(&self) -> RepoType {
        RepoType::Registry
    }

    fn source_url(&self) -> &str {
        self.reference.raw()
    }

    fn repo_path(&self) -> &str {
        self.reference.path()
    }

    fn repo_tag(&self) -> &str {
        self.reference.reference()
    }

    fn image_name(&self) -> String {
        format!("{}/{}", self.reference.authority(), self.reference.path())
    }

    async fn list_repositories(&self) -> Result<Vec<String>> {
        let url = format!("{}/v2/_catalog", self.base_path);
        let raw = self
            .get_bytes(&url, "application/json", "GET catalog")
            .await?;
        let list: RepositoryList = serde_json::from_slice(&raw)?;
        Ok(list.repositories)
    }

    async fn get_tag_list(&self) -> Result<TagList> {
        self.require_repository()?;
        let url = self.repo_url("tags/list");
        let raw = self
            .get_bytes(&url, "application/json", "GET tag list")
            .await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    async fn get_manifest(&self) -> Result<(ImageManifest, Vec<u8>)> {
        self.fetch_manifest(self.reference.reference()).await
    }

    async fn get_manifest_by_digest(
        &self,
        desc: &Descriptor,
    ) -> Result<(ImageManifest, Vec<u8>)> {
        self.fetch_manifest(desc.digest()).await
    }

    async fn manifest_exists(&self) -> Result<bool> {
        self.require_repository()?;
        let reference = self.reference.reference();
        if reference.is_empty() {
            return Ok(false);
        }

        let url = self.repo_url(&format!("manifests/{}", reference));
        let request = self
            .request(Method::HEAD, &url)?
            .header(ACCEPT, MANIFEST_ACCEPT);
        let response = self.send(request, "HEAD manifest").await?;
        Ok(response.status() == StatusCode::OK)
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
        let raw = self.get_blob(desc).await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    async fn get_referrers(&self, desc: &Descriptor) -> Result<ImageIndex> {
        self.require_repository()?;
        let url = self.repo_url(&format!("referrers/{}", desc.digest()));
        let accept = MediaType::ImageIndex.to_string();
        let raw = self.get_bytes(&url, &accept, "GET referrers").await?;
        let index: ImageIndex = serde_json::from_slice(&raw)?;

        tracing::debug!(
            subject = %desc.digest(),
            count = index.manifests().len(),
            "Fetched referrers"
        );
        Ok(index)
    }

    async fn get_blob(&self, desc: &Descriptor) -> Result<Vec<u8>> {
        self.require_repository()?;
        let url = self.repo_url(&format!("blobs/{}", desc.digest()));
        let raw = self.get_bytes(&url, "*/*", "GET blob").await?;
        verify_digest(desc.digest(), &raw)?;
        Ok(raw)
    }

    async fn blob_exists(&self, desc: &Descriptor) -> Result<bool> {
        self.require_repository()?;
        let url = self.repo_url(&format!("blobs/{}", desc.digest()));
        let response = self
            .send(self.request(Method::HEAD, &url)?, "HEAD blob")
            .await?;
        Ok(response.status() == StatusCode::OK)
    }

    async fn put_blob(&self, desc: &Descriptor, data: &[u8]) -> Result<()> {
        self.require_repository()?;
        if desc.size() != data.len() as i64 {
            return Err(OciDistError::Validation(format!(
                "Blob {} is {} bytes, descriptor says {}",
                desc.digest(),
                data.len(),
                desc.size()
            )));
        }

        if self.blob_exists(desc).await? {
            tracing::debug!(digest = %desc.digest(), "Blob already present, skipping upload");
            return Ok(());
        }

        self.upload_blob(desc, data).await?;
        tracing::debug!(digest = %desc.digest(), size = desc.size(), "Uploaded blob");
        Ok(())
    }

    async fn put_manifest(&self, manifest: &ImageManifest) -> Result<String> {
        let raw = manifest_bytes(manifest)?;

        // A manifest with a subject is addressed by its own digest so it
        // never displaces the tag of the image it refers to.
        let reference = if manifest.subject().is_some() {
            sha256_digest(&raw)
        } else {
            let tag = self.reference.reference();
            if tag.is_empty() {
                return Err(OciDistError::Validation(format!(
                    "Cannot put manifest without a tag in url '{}'",
                    self.reference.raw()
                )));
            }
            tag.to_string()
        };

        let media_type = manifest
            .media_type()
            .as_ref()
            .map(|m| m.to_string())
            .unwrap_or_default();
        self.put_raw_manifest(&reference, &media_type, &raw).await?;
        Ok(reference)
    }
}
