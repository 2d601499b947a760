//! SOCI signed bundles distributed as linked artifacts.
//!
//! ```text
//!   <repo>:<tag>  install manifest (artifactType application/vnd.<product>.install)
//!        ▲   ▲
//!        │   └── referrer: pubkeycrt manifest  ── layer: pubkeycrt.pem
//!        └────── referrer: signature manifest  ── layer: install.json.signature
//! ```
//!
//! The install manifest is found by tag; certificate and signature are found
//! through the referrers of its digest.

pub mod bundle;
pub mod crypto;
pub mod verify;

use ocidist_core::error::{OciDistError, Result, ResultExt};
use ocidist_core::oci::{sha256_digest, Descriptor, ImageManifest, MediaType};
use serde::Serialize;

use crate::api::OciApi;

pub use bundle::{bundle_file_name, SignedBundle, UnsignedBundle};
pub use crypto::{BundleSigner, BundleVerifier, NativeCrypto, PublicKey};
pub use verify::{verify, VerificationResult};

/// The three artifacts of a SOCI bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SociArtifactKind {
    Install,
    PubKeyCrt,
    Signature,
}

impl SociArtifactKind {
    pub const ALL: [SociArtifactKind; 3] = [
        SociArtifactKind::Install,
        SociArtifactKind::PubKeyCrt,
        SociArtifactKind::Signature,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SociArtifactKind::Install => "install",
            SociArtifactKind::PubKeyCrt => "pubkeycrt",
            SociArtifactKind::Signature => "signature",
        }
    }

    /// `application/vnd.<product>.<kind>`
    pub fn artifact_type(&self, product: &str) -> String {
        format!("application/vnd.{}.{}", product, self.as_str())
    }

    /// Display name stored in the layer's title annotation.
    pub fn file_name(&self) -> &'static str {
        match self {
            SociArtifactKind::Install => "install.json",
            SociArtifactKind::PubKeyCrt => "pubkeycrt.pem",
            SociArtifactKind::Signature => "install.json.signature",
        }
    }

    pub fn from_artifact_type(product: &str, artifact_type: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.artifact_type(product) == artifact_type)
    }
}

/// A resolved SOCI install manifest and its attached artifacts.
#[derive(Debug, Clone)]
pub struct SociRef {
    pub manifest: ImageManifest,
    pub manifest_digest: String,
    pub install: Descriptor,
    pub pubkeycrt: Option<Descriptor>,
    pub signature: Option<Descriptor>,
}

impl SociRef {
    /// Fetch the install manifest at the handle's tag and classify its referrers.
    pub async fn resolve(api: &dyn OciApi, product: &str) -> Result<Self> {
        let (manifest, raw) = api
            .get_manifest()
            .await
            .with_context(|| format!("Failed to get SOCI manifest {}", api.source_url()))?;

        let install_type = SociArtifactKind::Install.artifact_type(product);
        let artifact_type = manifest
            .artifact_type()
            .as_ref()
            .map(|t| t.to_string())
            .unwrap_or_default();
        if artifact_type != install_type {
            return Err(OciDistError::Validation(format!(
                "{} is not a SOCI install artifact: artifactType '{}', expected '{}'",
                api.source_url(),
                artifact_type,
                install_type
            )));
        }
        if manifest.layers().len() != 1 {
            return Err(OciDistError::Validation(format!(
                "SOCI install manifest has {} layers, expected 1",
                manifest.layers().len()
            )));
        }

        let manifest_digest = sha256_digest(&raw);
        let subject = Descriptor::new(
            manifest
                .media_type()
                .clone()
                .unwrap_or(MediaType::ImageManifest),
            raw.len() as i64,
            manifest_digest.clone(),
        );

        let referrers = api
            .get_referrers(&subject)
            .await
            .context("Failed to get SOCI referrers")?;

        let mut pubkeycrt = None;
        let mut signature = None;
        for desc in referrers.manifests() {
            let kind = desc
                .artifact_type()
                .as_ref()
                .and_then(|t| SociArtifactKind::from_artifact_type(product, &t.to_string()));
            match kind {
                Some(SociArtifactKind::PubKeyCrt) => pubkeycrt = Some(desc.clone()),
                Some(SociArtifactKind::Signature) => signature = Some(desc.clone()),
                _ => {}
            }
        }

        tracing::debug!(
            digest = %manifest_digest,
            has_pubkeycrt = pubkeycrt.is_some(),
            has_signature = signature.is_some(),
            "Resolved SOCI manifest"
        );

        let install = manifest.layers()[0].clone();
        Ok(Self {
            manifest,
            manifest_digest,
            install,
            pubkeycrt,
            signature,
        })
    }

    /// Referrer descriptors that were found.
    pub fn referrers(&self) -> Vec<&Descriptor> {
        self.pubkeycrt.iter().chain(self.signature.iter()).collect()
    }

    pub async fn install_blob(&self, api: &dyn OciApi) -> Result<Vec<u8>> {
        api.get_blob(&self.install)
            .await
            .context("Failed to get SOCI install blob")
    }

    pub async fn pubkeycrt_blob(&self, api: &dyn OciApi) -> Result<Vec<u8>> {
        self.referrer_blob(api, self.pubkeycrt.as_ref(), SociArtifactKind::PubKeyCrt)
            .await
    }

    pub async fn signature_blob(&self, api: &dyn OciApi) -> Result<Vec<u8>> {
        self.referrer_blob(api, self.signature.as_ref(), SociArtifactKind::Signature)
            .await
    }

    /// Referrer manifest by digest, then its single layer.
    async fn referrer_blob(
        &self,
        api: &dyn OciApi,
        desc: Option<&Descriptor>,
        kind: SociArtifactKind,
    ) -> Result<Vec<u8>> {
        let desc = desc.ok_or_else(|| {
            OciDistError::NotFound(format!(
                "no {} referrer for {}",
                kind.as_str(),
                self.manifest_digest
            ))
        })?;

        let (manifest, _) = api
            .get_manifest_by_digest(desc)
            .await
            .with_context(|| format!("Failed to get SOCI {} manifest", kind.as_str()))?;
        if manifest.layers().len() != 1 {
            return Err(OciDistError::Validation(format!(
                "SOCI {} manifest {} has {} layers, expected 1",
                kind.as_str(),
                desc.digest(),
                manifest.layers().len()
            )));
        }

        api.get_blob(&manifest.layers()[0])
            .await
            .with_context(|| format!("Failed to get SOCI {} blob", kind.as_str()))
    }

    /// Reassemble the portable bundle from the registry.
    pub async fn get_bundle(&self, api: &dyn OciApi) -> Result<SignedBundle> {
        let install = self.install_blob(api).await?;
        let pubkeycrt = self.pubkeycrt_blob(api).await?;
        let signature = self.signature_blob(api).await?;

        let text = |bytes: Vec<u8>, what: &str| {
            String::from_utf8(bytes).map_err(|_| {
                OciDistError::Validation(format!("SOCI {} is not valid UTF-8", what))
            })
        };
        Ok(SignedBundle::new(
            text(install, "install payload")?,
            text(pubkeycrt, "certificate")?,
            &signature,
        ))
    }

    /// Summary for `soci inspect`.
    pub fn info(&self, source_url: &str, verification: Option<VerificationResult>) -> SociInfo {
        SociInfo {
            reference: source_url.to_string(),
            digest: self.manifest_digest.clone(),
            install_layer: self.install.clone(),
            referrers: self.referrers().into_iter().cloned().collect(),
            verification,
        }
    }
}

/// Report printed by `soci inspect`.
#[derive(Debug, Clone, Serialize)]
pub struct SociInfo {
    #[serde(rename = "ref")]
    pub reference: String,
    pub digest: String,
    #[serde(rename = "install-layer")]
    pub install_layer: Descriptor,
    pub referrers: Vec<Descriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationResult>,
}

/// Push install, certificate and signature, in that order, to `api`'s tag.
///
/// The install artifact takes the tag; the other two attach to it as
/// referrers.
pub async fn publish_bundle(api: &dyn OciApi, bundle: &SignedBundle, product: &str) -> Result<()> {
    let signature = bundle.signature_blob()?;
    let artifacts: [(SociArtifactKind, &[u8]); 3] = [
        (SociArtifactKind::Install, bundle.install.as_bytes()),
        (SociArtifactKind::PubKeyCrt, bundle.pubkeycrt.as_bytes()),
        (SociArtifactKind::Signature, &signature),
    ];

    for (kind, blob) in artifacts {
        api.put_artifact(kind.file_name(), &kind.artifact_type(product), blob)
            .await
            .with_context(|| format!("failed to PUT artifact '{}'", kind.as_str()))?;
    }

    tracing::info!(url = %api.source_url(), product = %product, "Published SOCI bundle");
    Ok(())
}
