//! Verification of a published SOCI bundle.

use std::path::Path;

use ocidist_core::error::Result;
use serde::Serialize;

use super::crypto::{certificate_subject, BundleVerifier};
use super::SociRef;
use crate::api::OciApi;

/// Diagnostic of a successful verification.
pub const VERIFIED_OK: &str = "Verified OK";

/// Outcome of [`verify`]. A failed check is a value, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub verified: bool,
    pub diagnostic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl VerificationResult {
    fn ok() -> Self {
        Self {
            verified: true,
            diagnostic: VERIFIED_OK.to_string(),
            cause: None,
        }
    }

    pub fn failed(diagnostic: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            verified: false,
            diagnostic: diagnostic.into(),
            cause: Some(cause.into()),
        }
    }

    /// `Verification Failed: <cause>`
    fn signature_failed(cause: impl Into<String>) -> Self {
        let cause = cause.into();
        Self::failed(format!("Verification Failed: {}", cause), cause)
    }
}

/// Check that the install payload was signed by the attached certificate's
/// key and, when `ca_file` is given, that the certificate chains to it.
///
/// Fetch failures are returned as errors. An unreadable CA file is a failed
/// CA check.
pub async fn verify(
    soci: &SociRef,
    api: &dyn OciApi,
    verifier: &dyn BundleVerifier,
    ca_file: Option<&Path>,
) -> Result<VerificationResult> {
    let install = soci.install_blob(api).await?;
    let signature = soci.signature_blob(api).await?;
    let cert = soci.pubkeycrt_blob(api).await?;

    let key = match verifier.extract_public_key(&cert) {
        Ok(key) => key,
        Err(e) => {
            return Ok(VerificationResult::failed(
                "Verification Failed: cannot read SOCI cert",
                e.to_string(),
            ))
        }
    };

    if let Some(ca_file) = ca_file {
        let checked = std::fs::read(ca_file)
            .map_err(|e| format!("Failed to read CA file {}: {}", ca_file.display(), e))
            .and_then(|ca| match verifier.validate_certificate(&cert, &ca) {
                Ok(true) => Ok(()),
                Ok(false) => Err("certificate does not chain to the CA bundle".to_string()),
                Err(e) => Err(e.to_string()),
            });
        if let Err(cause) = checked {
            let subject =
                certificate_subject(&cert).unwrap_or_else(|_| "pubkeycrt.pem".to_string());
            tracing::debug!(ca = %ca_file.display(), subject = %subject, "CA check failed");
            return Ok(VerificationResult::failed(
                format!(
                    "Verification Failed: CA file '{}' cannot verify SOCI cert '{}'",
                    ca_file.display(),
                    subject
                ),
                cause,
            ));
        }
    }

    let result = match verifier.verify(&install, &signature, &key) {
        Ok(true) => VerificationResult::ok(),
        Ok(false) => {
            VerificationResult::signature_failed("signature does not match install payload")
        }
        Err(e) => VerificationResult::signature_failed(e.to_string()),
    };

    tracing::info!(
        digest = %soci.manifest_digest,
        verified = result.verified,
        "Verified SOCI bundle"
    );
    Ok(result)
}
