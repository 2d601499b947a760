//! Signing and verification for SOCI bundles.
//!
//! Signatures are SHA-256 based and byte-compatible with
//! `openssl dgst -sha256 -sign <key>` / `-verify <pubkey>`: RSA keys produce
//! PKCS#1 v1.5 signatures, EC keys (P-256, P-384) produce DER-encoded ECDSA
//! signatures.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use der::asn1::ObjectIdentifier;
use der::{Decode, Encode};
use ocidist_core::error::{OciDistError, Result};
use ring::rand::SystemRandom;
use ring::signature::{self as ring_sig, RsaKeyPair, UnparsedPublicKey, VerificationAlgorithm};
use rustls_pki_types::PrivateKeyDer;
use sha2::{Digest as _, Sha256};
use x509_cert::Certificate;

const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const SECP256R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
const SECP384R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");

const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const SHA384_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
const SHA512_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");
const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const ECDSA_WITH_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");

/// Issuer chains longer than this are rejected.
const MAX_CHAIN_DEPTH: usize = 8;

/// A public key taken from a certificate.
///
/// Holds the raw `subjectPublicKey` bytes: a DER `RSAPublicKey` for RSA,
/// an uncompressed SEC1 point for EC keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    Rsa(Vec<u8>),
    EcP256(Vec<u8>),
    EcP384(Vec<u8>),
}

impl PublicKey {
    fn signature_algorithm(&self) -> &'static dyn VerificationAlgorithm {
        match self {
            PublicKey::Rsa(_) => &ring_sig::RSA_PKCS1_2048_8192_SHA256,
            PublicKey::EcP256(_) => &ring_sig::ECDSA_P256_SHA256_ASN1,
            PublicKey::EcP384(_) => &ring_sig::ECDSA_P384_SHA256_ASN1,
        }
    }

    fn bytes(&self) -> &[u8] {
        match self {
            PublicKey::Rsa(b) | PublicKey::EcP256(b) | PublicKey::EcP384(b) => b,
        }
    }
}

/// Produces detached signatures over install payloads.
pub trait BundleSigner: Send + Sync {
    /// Sign `data` with the PEM private key at `key_path`.
    fn sign(&self, data: &[u8], key_path: &Path) -> Result<Vec<u8>>;
}

/// Checks certificates and detached signatures.
pub trait BundleVerifier: Send + Sync {
    /// True if `signature` over `data` was made by the private half of `key`.
    fn verify(&self, data: &[u8], signature: &[u8], key: &PublicKey) -> Result<bool>;

    /// Public key of the first certificate in `cert_pem`.
    fn extract_public_key(&self, cert_pem: &[u8]) -> Result<PublicKey>;

    /// True if `cert_pem` is currently valid and chains to a self-signed
    /// root inside the `ca_pem` bundle.
    fn validate_certificate(&self, cert_pem: &[u8], ca_pem: &[u8]) -> Result<bool>;
}

/// In-process implementation backed by `ring` and the RustCrypto curves.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeCrypto;

impl BundleSigner for NativeCrypto {
    fn sign(&self, data: &[u8], key_path: &Path) -> Result<Vec<u8>> {
        let pem = std::fs::read(key_path).map_err(|e| {
            OciDistError::Crypto(format!(
                "Failed to read private key {}: {}",
                key_path.display(),
                e
            ))
        })?;
        let key = rustls_pemfile::private_key(&mut pem.as_slice())
            .map_err(|e| {
                OciDistError::Crypto(format!(
                    "Failed to parse private key {}: {}",
                    key_path.display(),
                    e
                ))
            })?
            .ok_or_else(|| {
                OciDistError::Crypto(format!("No private key found in {}", key_path.display()))
            })?;

        let signature = match &key {
            PrivateKeyDer::Pkcs1(k) => sign_rsa(RsaKeyPair::from_der(k.secret_pkcs1_der()), data),
            PrivateKeyDer::Pkcs8(k) => {
                let der = k.secret_pkcs8_der();
                if let Ok(pair) = RsaKeyPair::from_pkcs8(der) {
                    sign_rsa(Ok(pair), data)
                } else if let Ok(secret) =
                    <p256::SecretKey as p256::pkcs8::DecodePrivateKey>::from_pkcs8_der(der)
                {
                    sign_p256(&secret, data)
                } else if let Ok(secret) =
                    <p384::SecretKey as p384::pkcs8::DecodePrivateKey>::from_pkcs8_der(der)
                {
                    sign_p384(&secret, data)
                } else {
                    Err(OciDistError::Crypto(
                        "Unsupported PKCS#8 key type (expected RSA, P-256 or P-384)".to_string(),
                    ))
                }
            }
            PrivateKeyDer::Sec1(k) => {
                let der = k.secret_sec1_der();
                if let Ok(secret) = p256::SecretKey::from_sec1_der(der) {
                    sign_p256(&secret, data)
                } else if let Ok(secret) = p384::SecretKey::from_sec1_der(der) {
                    sign_p384(&secret, data)
                } else {
                    Err(OciDistError::Crypto(
                        "Unsupported EC curve (expected P-256 or P-384)".to_string(),
                    ))
                }
            }
            _ => Err(OciDistError::Crypto("Unsupported private key format".to_string())),
        }?;

        tracing::debug!(
            key = %key_path.display(),
            signature_len = signature.len(),
            "Signed payload"
        );
        Ok(signature)
    }
}

fn sign_rsa(
    pair: std::result::Result<RsaKeyPair, ring::error::KeyRejected>,
    data: &[u8],
) -> Result<Vec<u8>> {
    let pair = pair.map_err(|e| OciDistError::Crypto(format!("Invalid RSA key: {}", e)))?;
    let mut signature = vec![0u8; pair.public().modulus_len()];
    pair.sign(
        &ring_sig::RSA_PKCS1_SHA256,
        &SystemRandom::new(),
        data,
        &mut signature,
    )
    .map_err(|_| OciDistError::Crypto("RSA signing failed".to_string()))?;
    Ok(signature)
}

fn sign_p256(secret: &p256::SecretKey, data: &[u8]) -> Result<Vec<u8>> {
    use p256::ecdsa::signature::Signer as _;

    let key = p256::ecdsa::SigningKey::from(secret);
    let signature: p256::ecdsa::Signature = key.sign(data);
    Ok(signature.to_der().as_bytes().to_vec())
}

fn sign_p384(secret: &p384::SecretKey, data: &[u8]) -> Result<Vec<u8>> {
    use p384::ecdsa::signature::hazmat::PrehashSigner as _;

    // openssl signs the SHA-256 digest even on P-384 keys.
    let key = p384::ecdsa::SigningKey::from(secret);
    let signature: p384::ecdsa::Signature = key
        .sign_prehash(&Sha256::digest(data))
        .map_err(|e| OciDistError::Crypto(format!("P-384 signing failed: {}", e)))?;
    Ok(signature.to_der().as_bytes().to_vec())
}

impl BundleVerifier for NativeCrypto {
    fn verify(&self, data: &[u8], signature: &[u8], key: &PublicKey) -> Result<bool> {
        let verified = UnparsedPublicKey::new(key.signature_algorithm(), key.bytes())
            .verify(data, signature)
            .is_ok();
        tracing::debug!(verified, "Checked detached signature");
        Ok(verified)
    }

    fn extract_public_key(&self, cert_pem: &[u8]) -> Result<PublicKey> {
        let cert = parse_certificates(cert_pem)?
            .into_iter()
            .next()
            .ok_or_else(|| OciDistError::Crypto("No certificate found in PEM".to_string()))?;
        public_key_of(&cert)
    }

    fn validate_certificate(&self, cert_pem: &[u8], ca_pem: &[u8]) -> Result<bool> {
        let cert = parse_certificates(cert_pem)?
            .into_iter()
            .next()
            .ok_or_else(|| OciDistError::Crypto("No certificate found in PEM".to_string()))?;
        let bundle = parse_certificates(ca_pem)?;
        if bundle.is_empty() {
            return Err(OciDistError::Crypto(
                "No certificates found in CA bundle".to_string(),
            ));
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| OciDistError::Crypto(format!("System clock error: {}", e)))?;

        let mut current = &cert;
        for _ in 0..MAX_CHAIN_DEPTH {
            if !within_validity(current, now) {
                tracing::debug!(
                    subject = %current.tbs_certificate.subject,
                    "Certificate outside its validity period"
                );
                return Ok(false);
            }

            let issuer = bundle.iter().find(|candidate| {
                candidate.tbs_certificate.subject == current.tbs_certificate.issuer
                    && signed_by(current, candidate)
            });
            let Some(issuer) = issuer else {
                tracing::debug!(
                    issuer = %current.tbs_certificate.issuer,
                    "No matching issuer in CA bundle"
                );
                return Ok(false);
            };

            if issuer.tbs_certificate.issuer == issuer.tbs_certificate.subject {
                return Ok(within_validity(issuer, now) && signed_by(issuer, issuer));
            }
            current = issuer;
        }

        tracing::debug!("Certificate chain too long");
        Ok(false)
    }
}

/// Subject name of the first certificate in `cert_pem`, RFC 4514 style.
pub fn certificate_subject(cert_pem: &[u8]) -> Result<String> {
    parse_certificates(cert_pem)?
        .into_iter()
        .next()
        .map(|c| c.tbs_certificate.subject.to_string())
        .ok_or_else(|| OciDistError::Crypto("No certificate found in PEM".to_string()))
}

fn parse_certificates(pem: &[u8]) -> Result<Vec<Certificate>> {
    rustls_pemfile::certs(&mut &pem[..])
        .map(|der| {
            let der = der.map_err(|e| {
                OciDistError::Crypto(format!("Failed to read certificate PEM: {}", e))
            })?;
            Certificate::from_der(der.as_ref())
                .map_err(|e| OciDistError::Crypto(format!("Failed to parse certificate: {}", e)))
        })
        .collect()
}

fn public_key_of(cert: &Certificate) -> Result<PublicKey> {
    let spki = &cert.tbs_certificate.subject_public_key_info;
    let key_bytes = spki
        .subject_public_key
        .as_bytes()
        .ok_or_else(|| OciDistError::Crypto("Malformed subjectPublicKey".to_string()))?
        .to_vec();

    let algorithm = spki.algorithm.oid;
    if algorithm == RSA_ENCRYPTION {
        return Ok(PublicKey::Rsa(key_bytes));
    }
    if algorithm != EC_PUBLIC_KEY {
        return Err(OciDistError::Crypto(format!(
            "Unsupported public key algorithm {}",
            algorithm
        )));
    }

    let curve = spki
        .algorithm
        .parameters
        .as_ref()
        .and_then(|p| p.decode_as::<ObjectIdentifier>().ok())
        .ok_or_else(|| OciDistError::Crypto("EC key without named curve".to_string()))?;
    if curve == SECP256R1 {
        Ok(PublicKey::EcP256(key_bytes))
    } else if curve == SECP384R1 {
        Ok(PublicKey::EcP384(key_bytes))
    } else {
        Err(OciDistError::Crypto(format!("Unsupported EC curve {}", curve)))
    }
}

fn within_validity(cert: &Certificate, now: std::time::Duration) -> bool {
    let validity = &cert.tbs_certificate.validity;
    validity.not_before.to_unix_duration() <= now && now <= validity.not_after.to_unix_duration()
}

/// True if `issuer`'s key produced `cert`'s signature.
fn signed_by(cert: &Certificate, issuer: &Certificate) -> bool {
    let Ok(issuer_key) = public_key_of(issuer) else {
        return false;
    };
    let Some(algorithm) = certificate_signature_algorithm(cert.signature_algorithm.oid, &issuer_key)
    else {
        tracing::debug!(
            algorithm = %cert.signature_algorithm.oid,
            "Unsupported certificate signature algorithm"
        );
        return false;
    };

    let Ok(tbs_der) = cert.tbs_certificate.to_der() else {
        return false;
    };
    let Some(signature) = cert.signature.as_bytes() else {
        return false;
    };

    UnparsedPublicKey::new(algorithm, issuer_key.bytes())
        .verify(&tbs_der, signature)
        .is_ok()
}

/// The ring algorithm matching a certificate signature OID and issuer key.
fn certificate_signature_algorithm(
    oid: ObjectIdentifier,
    issuer_key: &PublicKey,
) -> Option<&'static dyn VerificationAlgorithm> {
    let algorithm: &'static dyn VerificationAlgorithm = match issuer_key {
        PublicKey::Rsa(_) if oid == SHA256_WITH_RSA => &ring_sig::RSA_PKCS1_2048_8192_SHA256,
        PublicKey::Rsa(_) if oid == SHA384_WITH_RSA => &ring_sig::RSA_PKCS1_2048_8192_SHA384,
        PublicKey::Rsa(_) if oid == SHA512_WITH_RSA => &ring_sig::RSA_PKCS1_2048_8192_SHA512,
        PublicKey::EcP256(_) if oid == ECDSA_WITH_SHA256 => &ring_sig::ECDSA_P256_SHA256_ASN1,
        PublicKey::EcP256(_) if oid == ECDSA_WITH_SHA384 => &ring_sig::ECDSA_P256_SHA384_ASN1,
        PublicKey::EcP384(_) if oid == ECDSA_WITH_SHA256 => &ring_sig::ECDSA_P384_SHA256_ASN1,
        PublicKey::EcP384(_) if oid == ECDSA_WITH_SHA384 => &ring_sig::ECDSA_P384_SHA384_ASN1,
        _ => return None,
    };
    Some(algorithm)
}
