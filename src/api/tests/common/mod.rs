//! In-process distribution registry for integration tests.
//!
//! Implements just enough of the OCI distribution API for the client:
//! catalog, tag list, manifests (GET/HEAD/PUT), blobs (GET/HEAD), two-step
//! uploads (POST then PUT) and the referrers query. Every request is logged.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use ocidist_core::oci::{
    descriptor_for, image_manifest, manifest_bytes, parse_manifest, refers_to, sha256_digest,
    ImageManifest, MediaType,
};
use serde_json::json;

#[derive(Default)]
struct RegistryData {
    /// digest -> content
    blobs: HashMap<String, Vec<u8>>,
    /// (repository, tag or digest) -> (media type, content)
    manifests: HashMap<(String, String), (String, Vec<u8>)>,
    /// upload id -> repository
    uploads: HashMap<String, String>,
    next_upload: u64,
    /// (method, path) of every request
    requests: Vec<(String, String)>,
    reject_digest_manifest_puts: bool,
    relative_upload_locations: bool,
}

/// Handle to a running mock registry.
#[derive(Clone, Default)]
pub struct MockRegistry {
    data: Arc<Mutex<RegistryData>>,
    addr: String,
}

impl MockRegistry {
    /// Serve on an ephemeral localhost port.
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let registry = MockRegistry {
            data: Arc::default(),
            addr: listener.local_addr().unwrap().to_string(),
        };

        let app = Router::new()
            .fallback(handle)
            .with_state(registry.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        registry
    }

    /// `host:port` of the server.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// `ocidist://host:port/<path>`
    pub fn url(&self, path: &str) -> String {
        format!("ocidist://{}/{}", self.addr, path)
    }

    pub fn requests(&self) -> Vec<(String, String)> {
        self.data.lock().unwrap().requests.clone()
    }

    /// Number of requests with `method` whose path contains `fragment`.
    pub fn count(&self, method: &str, fragment: &str) -> usize {
        self.requests()
            .iter()
            .filter(|(m, p)| m == method && p.contains(fragment))
            .count()
    }

    pub fn clear_requests(&self) {
        self.data.lock().unwrap().requests.clear();
    }

    pub fn reject_digest_manifest_puts(&self) {
        self.data.lock().unwrap().reject_digest_manifest_puts = true;
    }

    /// Answer upload POSTs with a `Location` relative to the POST URL.
    pub fn relative_upload_locations(&self) {
        self.data.lock().unwrap().relative_upload_locations = true;
    }

    pub fn has_blob(&self, digest: &str) -> bool {
        self.data.lock().unwrap().blobs.contains_key(digest)
    }

    pub fn seed_blob(&self, data: &[u8]) -> String {
        let digest = sha256_digest(data);
        self.data
            .lock()
            .unwrap()
            .blobs
            .insert(digest.clone(), data.to_vec());
        digest
    }

    /// Store manifest bytes under a tag (and their digest).
    pub fn seed_manifest(&self, repo: &str, tag: &str, raw: &[u8]) -> String {
        let mut data = self.data.lock().unwrap();
        store_manifest(&mut data, repo, tag, raw)
    }

    /// Raw manifest stored under `reference`.
    pub fn manifest(&self, repo: &str, reference: &str) -> Option<Vec<u8>> {
        self.data
            .lock()
            .unwrap()
            .manifests
            .get(&(repo.to_string(), reference.to_string()))
            .map(|(_, raw)| raw.clone())
    }

    /// Replace a blob's bytes while keeping its digest key.
    pub fn overwrite_blob(&self, digest: &str, data: &[u8]) {
        self.data
            .lock()
            .unwrap()
            .blobs
            .insert(digest.to_string(), data.to_vec());
    }
}

/// An image stored by [`MockRegistry::seed_image`].
pub struct SeededImage {
    pub manifest: ImageManifest,
    pub raw: Vec<u8>,
    pub digest: String,
}

/// Image config accepted by `oci_spec::image::ImageConfiguration`.
pub const IMAGE_CONFIG: &str = r#"{
    "created": "2024-05-01T10:00:00Z",
    "architecture": "amd64",
    "os": "linux",
    "config": {"Env": ["PATH=/usr/bin"], "Labels": {"org.example.role": "demo"}},
    "rootfs": {"type": "layers", "diff_ids": ["sha256:2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae"]},
    "history": []
}"#;

impl MockRegistry {
    /// Store a one-layer image (config, layer, manifest) under `repo:tag`.
    pub fn seed_image(&self, repo: &str, tag: &str) -> SeededImage {
        let config = descriptor_for(MediaType::ImageConfig, IMAGE_CONFIG.as_bytes());
        let layer = descriptor_for(MediaType::ImageLayerGzip, b"layer bytes");
        self.seed_blob(IMAGE_CONFIG.as_bytes());
        self.seed_blob(b"layer bytes");

        let manifest = image_manifest(config, vec![layer]).unwrap();
        let raw = manifest_bytes(&manifest).unwrap();
        let digest = self.seed_manifest(repo, tag, &raw);
        SeededImage {
            manifest,
            raw,
            digest,
        }
    }
}

const MANIFEST_CONTENT_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
const INDEX_CONTENT_TYPE: &str = "application/vnd.oci.image.index.v1+json";

fn store_manifest(data: &mut RegistryData, repo: &str, reference: &str, raw: &[u8]) -> String {
    let digest = sha256_digest(raw);
    let entry = (MANIFEST_CONTENT_TYPE.to_string(), raw.to_vec());
    data.manifests
        .insert((repo.to_string(), digest.clone()), entry.clone());
    if !reference.starts_with("sha256:") {
        data.manifests
            .insert((repo.to_string(), reference.to_string()), entry);
    }
    digest
}

fn status(code: StatusCode) -> Response {
    code.into_response()
}

fn content_response(content_type: &str, body: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type.to_string())],
        body,
    )
        .into_response()
}

async fn handle(
    State(registry): State<MockRegistry>,
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let mut data = registry.data.lock().unwrap();
    data.requests.push((method.to_string(), path.clone()));

    let Some(rest) = path.strip_prefix("/v2/") else {
        return status(StatusCode::NOT_FOUND);
    };

    if rest == "_catalog" {
        let repos: BTreeSet<&String> = data.manifests.keys().map(|(repo, _)| repo).collect();
        let body = serde_json::to_vec(&json!({ "repositories": repos })).unwrap();
        return content_response("application/json", body);
    }

    if let Some(repo) = rest.strip_suffix("/tags/list") {
        let tags: BTreeSet<&String> = data
            .manifests
            .keys()
            .filter(|(r, reference)| r == repo && !reference.starts_with("sha256:"))
            .map(|(_, reference)| reference)
            .collect();
        let body = serde_json::to_vec(&json!({ "name": repo, "tags": tags })).unwrap();
        return content_response("application/json", body);
    }

    if let Some((repo, upload)) = rest.split_once("/blobs/uploads/") {
        let repo = repo.to_string();
        return match method {
            Method::POST => {
                data.next_upload += 1;
                let id = format!("upload-{}", data.next_upload);
                data.uploads.insert(id.clone(), repo.clone());
                let location = if data.relative_upload_locations {
                    id
                } else {
                    format!("/v2/{}/blobs/uploads/{}", repo, id)
                };
                (StatusCode::ACCEPTED, [(header::LOCATION, location)]).into_response()
            }
            Method::PUT => {
                if data.uploads.remove(upload).is_none() {
                    return status(StatusCode::NOT_FOUND);
                }
                match query.get("digest") {
                    Some(digest) if *digest == sha256_digest(&body) => {
                        data.blobs.insert(digest.clone(), body.to_vec());
                        status(StatusCode::CREATED)
                    }
                    _ => status(StatusCode::BAD_REQUEST),
                }
            }
            _ => status(StatusCode::METHOD_NOT_ALLOWED),
        };
    }

    if let Some((_, digest)) = rest.split_once("/blobs/") {
        return match (method, data.blobs.get(digest)) {
            (Method::HEAD, Some(_)) => status(StatusCode::OK),
            (Method::GET, Some(blob)) => content_response("application/octet-stream", blob.clone()),
            _ => status(StatusCode::NOT_FOUND),
        };
    }

    if let Some((repo, reference)) = rest.split_once("/manifests/") {
        let key = (repo.to_string(), reference.to_string());
        return match method {
            Method::GET | Method::HEAD => match data.manifests.get(&key) {
                Some((media_type, raw)) if method == Method::GET => {
                    content_response(media_type, raw.clone())
                }
                Some(_) => status(StatusCode::OK),
                None => status(StatusCode::NOT_FOUND),
            },
            Method::PUT => {
                if reference.starts_with("sha256:") {
                    if data.reject_digest_manifest_puts {
                        return status(StatusCode::BAD_REQUEST);
                    }
                    if sha256_digest(&body) != reference {
                        return status(StatusCode::BAD_REQUEST);
                    }
                }
                let digest = store_manifest(&mut data, repo, reference, &body);
                (
                    StatusCode::CREATED,
                    [(header::HeaderName::from_static("docker-content-digest"), digest)],
                )
                    .into_response()
            }
            _ => status(StatusCode::METHOD_NOT_ALLOWED),
        };
    }

    if let Some((repo, digest)) = rest.split_once("/referrers/") {
        let mut seen = BTreeSet::new();
        let mut referrers = Vec::new();
        for ((r, _), (media_type, raw)) in data.manifests.iter() {
            let manifest_digest = sha256_digest(raw);
            if r != repo || !seen.insert(manifest_digest.clone()) {
                continue;
            }
            let Ok(manifest) = parse_manifest(raw) else {
                continue;
            };
            if refers_to(&manifest, digest) {
                referrers.push(json!({
                    "mediaType": media_type,
                    "digest": manifest_digest,
                    "size": raw.len(),
                    "artifactType": manifest.artifact_type(),
                }));
            }
        }
        let body = serde_json::to_vec(&json!({
            "schemaVersion": 2,
            "mediaType": INDEX_CONTENT_TYPE,
            "manifests": referrers,
        }))
        .unwrap();
        return content_response(INDEX_CONTENT_TYPE, body);
    }

    status(StatusCode::NOT_FOUND)
}

/// Path of a file under `tests/fixtures`.
pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}
