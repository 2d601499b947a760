//! Portable signed bundles (`<name>.soci`).
//!
//! A bundle is assembled in two steps: an [`UnsignedBundle`] holds the
//! install payload and certificate, and signing it yields a
//! [`SignedBundle`], the only form that can be written or published.

use std::io::Write;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ocidist_core::error::{OciDistError, Result};
use serde::{Deserialize, Serialize};

use super::crypto::BundleSigner;

/// The only supported signature encoding.
pub const SIGNATURE_ENCODING: &str = "base64";

/// File extension of bundle files.
pub const BUNDLE_EXTENSION: &str = "soci";

/// Encoded detached signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleSignature {
    pub encoding: String,
    pub data: String,
}

/// Install payload, signing certificate and detached signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBundle {
    /// Raw install JSON
    pub install: String,

    /// PEM certificate holding the verification key
    pub pubkeycrt: String,

    pub signature: BundleSignature,
}

impl SignedBundle {
    /// Build a bundle from its parts, base64-encoding the signature.
    pub fn new(install: impl Into<String>, pubkeycrt: impl Into<String>, signature: &[u8]) -> Self {
        Self {
            install: install.into(),
            pubkeycrt: pubkeycrt.into(),
            signature: BundleSignature {
                encoding: SIGNATURE_ENCODING.to_string(),
                data: BASE64.encode(signature),
            },
        }
    }

    /// Decode the raw signature bytes.
    pub fn signature_blob(&self) -> Result<Vec<u8>> {
        if self.signature.encoding != SIGNATURE_ENCODING {
            return Err(OciDistError::Validation(format!(
                "Unsupported signature encoding '{}', expected '{}'",
                self.signature.encoding, SIGNATURE_ENCODING
            )));
        }
        BASE64.decode(self.signature.data.as_bytes()).map_err(|e| {
            OciDistError::Validation(format!("Failed to decode bundle signature: {}", e))
        })
    }

    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let bundle: Self = serde_json::from_slice(data)?;
        bundle.signature_blob()?;
        Ok(bundle)
    }

    /// Load a bundle file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| {
            OciDistError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to read bundle {}: {}", path.display(), e),
            ))
        })?;
        Self::from_slice(&data).map_err(|e| e.context(format!("Bad bundle {}", path.display())))
    }

    /// Pretty-printed JSON, two-space indented.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the bundle to `path` atomically; a failed write leaves nothing behind.
    pub fn write_file(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.persist(path).map_err(|e| OciDistError::IoError(e.error))?;

        tracing::info!(path = %path.display(), "Wrote SOCI bundle");
        Ok(())
    }
}

/// Install payload and certificate waiting for a signature.
#[derive(Debug, Clone)]
pub struct UnsignedBundle {
    install: String,
    pubkeycrt: String,
}

impl UnsignedBundle {
    /// The install payload must be valid JSON.
    pub fn new(install: impl Into<String>, pubkeycrt: impl Into<String>) -> Result<Self> {
        let install = install.into();
        serde_json::from_str::<serde_json::Value>(&install).map_err(|e| {
            OciDistError::Validation(format!("Install payload is not valid JSON: {}", e))
        })?;
        Ok(Self {
            install,
            pubkeycrt: pubkeycrt.into(),
        })
    }

    /// Read the install payload and certificate from files.
    pub fn from_files(install_file: &Path, pubkeycrt_file: &Path) -> Result<Self> {
        let read = |path: &Path, what: &str| {
            std::fs::read_to_string(path).map_err(|e| {
                OciDistError::IoError(std::io::Error::new(
                    e.kind(),
                    format!("Failed to read {} {}: {}", what, path.display(), e),
                ))
            })
        };
        Self::new(
            read(install_file, "install file")?,
            read(pubkeycrt_file, "certificate")?,
        )
    }

    pub fn install(&self) -> &str {
        &self.install
    }

    /// Sign the install bytes with the key at `key_path`.
    pub fn sign(self, signer: &dyn BundleSigner, key_path: &Path) -> Result<SignedBundle> {
        let signature = signer.sign(self.install.as_bytes(), key_path)?;
        Ok(SignedBundle::new(self.install, self.pubkeycrt, &signature))
    }
}

/// `<name>.soci`
pub fn bundle_file_name(name: &str) -> String {
    format!("{}.{}", name, BUNDLE_EXTENSION)
}
