//! Registry backend against an in-process distribution server.

mod common;

use common::{MockRegistry, IMAGE_CONFIG};
use ocidist_api::{new_oci_api, put_artifact, OciApi, RegistryRepo, RepositoryRef};
use ocidist_core::config::ApiConfig;
use ocidist_core::error::OciDistError;
use ocidist_core::oci::{
    annotation, descriptor_for, empty_config_descriptor, image_manifest, manifest_bytes,
    sha256_digest, Descriptor, MediaType, ANNOTATION_TITLE,
};

const PLAIN_HTTP: ApiConfig = ApiConfig {
    tls_verify: false,
    debug: false,
};

fn api(registry: &MockRegistry, path: &str) -> Box<dyn OciApi> {
    new_oci_api(&registry.url(path), PLAIN_HTTP).unwrap()
}

fn octet_stream(data: &[u8]) -> Descriptor {
    descriptor_for(MediaType::from("application/octet-stream"), data)
}

fn artifact_type(desc_type: &Option<MediaType>) -> Option<String> {
    desc_type.as_ref().map(|t| t.to_string())
}

#[tokio::test]
async fn test_get_manifest_by_tag() {
    let registry = MockRegistry::start().await;
    let image = registry.seed_image("ns/app", "1.0");

    let repo = api(&registry, "ns/app:1.0");
    let (manifest, raw) = repo.get_manifest().await.unwrap();
    assert_eq!(manifest, image.manifest);
    assert_eq!(sha256_digest(&raw), image.digest);
    assert!(repo.manifest_exists().await.unwrap());
    assert_eq!(repo.image_name(), format!("{}/ns/app", registry.addr()));
}

#[tokio::test]
async fn test_get_manifest_by_digest_url() {
    let registry = MockRegistry::start().await;
    let image = registry.seed_image("ns/app", "1.0");

    let repo = api(&registry, &format!("ns/app@{}", image.digest));
    let (manifest, _) = repo.get_manifest().await.unwrap();
    assert_eq!(manifest.layers().len(), 1);
    assert_eq!(
        registry.count("GET", &format!("/manifests/{}", image.digest)),
        1
    );
}

#[tokio::test]
async fn test_missing_manifest() {
    let registry = MockRegistry::start().await;
    let repo = api(&registry, "ns/app:nope");

    assert!(!repo.manifest_exists().await.unwrap());
    let err = repo.get_manifest().await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_image_config() {
    let registry = MockRegistry::start().await;
    let image = registry.seed_image("ns/app", "1.0");

    let repo = api(&registry, "ns/app:1.0");
    let config = repo.get_image_config(image.manifest.config()).await.unwrap();
    assert_eq!(config.architecture().to_string(), "amd64");
    assert_eq!(config.os().to_string(), "linux");
    assert_eq!(
        repo.get_blob(image.manifest.config()).await.unwrap(),
        IMAGE_CONFIG.as_bytes()
    );
}

#[tokio::test]
async fn test_list_tags_and_repositories() {
    let registry = MockRegistry::start().await;
    registry.seed_image("ns/app", "1.0");
    registry.seed_image("ns/app", "2.0");
    registry.seed_image("other", "latest");

    let repo = api(&registry, "ns/app");
    assert_eq!(repo.list_tags().await.unwrap(), vec!["1.0", "2.0"]);
    assert_eq!(
        repo.list_repositories().await.unwrap(),
        vec!["ns/app", "other"]
    );
}

#[tokio::test]
async fn test_put_blob_uploads_once() {
    let registry = MockRegistry::start().await;
    let repo = api(&registry, "ns/app:1.0");
    let data = b"some layer";
    let desc = octet_stream(data);

    repo.put_blob(&desc, data).await.unwrap();
    repo.put_blob(&desc, data).await.unwrap();

    assert!(registry.has_blob(desc.digest()));
    assert_eq!(registry.count("POST", "/blobs/uploads/"), 1);
    assert_eq!(registry.count("PUT", "/blobs/uploads/"), 1);
    assert_eq!(registry.count("HEAD", desc.digest()), 2);
    assert!(repo.blob_exists(&desc).await.unwrap());
}

#[tokio::test]
async fn test_put_blob_follows_relative_upload_location() {
    let registry = MockRegistry::start().await;
    registry.relative_upload_locations();
    let repo = api(&registry, "ns/app:1.0");
    let data = b"relative upload";
    let desc = octet_stream(data);

    repo.put_blob(&desc, data).await.unwrap();

    assert!(registry.has_blob(desc.digest()));
    assert_eq!(registry.count("PUT", "/v2/ns/app/blobs/uploads/upload-1"), 1);
}

#[tokio::test]
async fn test_get_blob_detects_corruption() {
    let registry = MockRegistry::start().await;
    let digest = registry.seed_blob(b"original");
    registry.overwrite_blob(&digest, b"tampered");

    let repo = api(&registry, "ns/app:1.0");
    let desc = octet_stream(b"original");
    let err = repo.get_blob(&desc).await.unwrap_err();
    assert!(matches!(err.root(), OciDistError::Validation(_)));
}

#[tokio::test]
async fn test_put_manifest_by_tag() {
    let registry = MockRegistry::start().await;
    let repo = api(&registry, "ns/app:2.0");
    let manifest = image_manifest(empty_config_descriptor(), vec![]).unwrap();

    let reference = repo.put_manifest(&manifest).await.unwrap();
    assert_eq!(reference, "2.0");
    assert_eq!(
        registry.manifest("ns/app", "2.0").unwrap(),
        manifest_bytes(&manifest).unwrap()
    );
}

#[tokio::test]
async fn test_put_raw_manifest_keeps_bytes() {
    let registry = MockRegistry::start().await;
    let raw = br#"{"schemaVersion":2,"config":{"mediaType":"application/vnd.oci.empty.v1+json","digest":"sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a","size":2},"layers":[]}"#;

    let reference = RepositoryRef::parse(&registry.url("ns/app:raw")).unwrap();
    let repo = RegistryRepo::new(reference, PLAIN_HTTP);
    repo.put_raw_manifest("raw", "", raw).await.unwrap();
    assert_eq!(registry.manifest("ns/app", "raw").unwrap(), raw.to_vec());
    assert_eq!(
        registry.manifest("ns/app", &sha256_digest(raw)).unwrap(),
        raw.to_vec()
    );
}

#[tokio::test]
async fn test_put_artifact_attaches_to_existing_tag() {
    let registry = MockRegistry::start().await;
    let image = registry.seed_image("ns/app", "1.0");
    let repo = api(&registry, "ns/app:1.0");

    put_artifact(repo.as_ref(), "sbom.json", "application/vnd.example.sbom", b"{}")
        .await
        .unwrap();

    // The tag still points at the image.
    let (manifest, _) = repo.get_manifest().await.unwrap();
    assert_eq!(manifest, image.manifest);

    let subject = descriptor_for(MediaType::ImageManifest, &image.raw);
    let referrers = repo.get_referrers(&subject).await.unwrap();
    assert_eq!(referrers.manifests().len(), 1);
    let referrer = &referrers.manifests()[0];
    assert_eq!(
        artifact_type(referrer.artifact_type()).as_deref(),
        Some("application/vnd.example.sbom")
    );

    let (artifact, _) = repo.get_manifest_by_digest(referrer).await.unwrap();
    assert_eq!(artifact.subject().as_ref().unwrap().digest(), &image.digest);
    assert_eq!(
        annotation(&artifact.layers()[0], ANNOTATION_TITLE),
        Some("sbom.json")
    );
    assert_eq!(repo.get_blob(&artifact.layers()[0]).await.unwrap(), b"{}");
}

#[tokio::test]
async fn test_put_artifact_without_subject_takes_tag() {
    let registry = MockRegistry::start().await;
    let repo = api(&registry, "ns/notes:v1");

    repo.put_artifact("notes.txt", "text/x-notes", b"hello")
        .await
        .unwrap();

    let (manifest, _) = repo.get_manifest().await.unwrap();
    assert_eq!(
        artifact_type(manifest.artifact_type()).as_deref(),
        Some("text/x-notes")
    );
    assert!(manifest.subject().is_none());
    assert_eq!(registry.count("PUT", "/manifests/v1"), 1);
}

#[tokio::test]
async fn test_rejected_manifest_put_reports_status() {
    let registry = MockRegistry::start().await;
    registry.seed_image("ns/app", "1.0");
    registry.reject_digest_manifest_puts();
    let repo = api(&registry, "ns/app:1.0");

    let err = repo
        .put_artifact("sig", "application/vnd.example.sig", b"sig")
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert!(err.to_string().contains("Failed to PUT artifact 'sig' manifest"));
}

#[tokio::test]
async fn test_tls_verify_uses_https() {
    let registry = MockRegistry::start().await;
    let repo = new_oci_api(
        &registry.url("ns/app:1.0"),
        ApiConfig {
            tls_verify: true,
            debug: false,
        },
    )
    .unwrap();

    // The mock speaks plain HTTP, so a TLS handshake cannot succeed.
    let err = repo.get_manifest().await.unwrap_err();
    assert!(matches!(err.root(), OciDistError::Network(_)));
}
