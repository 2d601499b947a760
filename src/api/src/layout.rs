//! OCI image layout on disk.
//!
//! ```text
//! layout/
//! ├── oci-layout           (layout marker)
//! ├── index.json           (top-level index, entries named by
//! │                         org.opencontainers.image.ref.name)
//! └── blobs/
//!     └── sha256/
//!         └── <hex>        (manifests, configs, layers)
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use ocidist_core::error::{OciDistError, Result};
use ocidist_core::oci::{
    annotate, annotation, empty_index, split_digest, verify_digest, Descriptor, ImageIndex,
    MediaType, ANNOTATION_REF_NAME,
};

const OCI_LAYOUT_FILE: &str = "oci-layout";
const OCI_LAYOUT_CONTENT: &str = r#"{"imageLayoutVersion":"1.0.0"}"#;
const INDEX_FILE: &str = "index.json";
const BLOBS_DIR: &str = "blobs";

/// An opened OCI image layout directory.
#[derive(Debug, Clone)]
pub struct OciLayout {
    root: PathBuf,
}

impl OciLayout {
    /// Open an existing layout.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        Self::validate(&root)?;
        Ok(Self { root })
    }

    /// Open a layout, creating an empty one if the directory has none.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        if Self::validate(&root).is_ok() {
            return Ok(Self { root });
        }

        std::fs::create_dir_all(root.join(BLOBS_DIR).join("sha256")).map_err(|e| {
            OciDistError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to create layout at {}: {}", root.display(), e),
            ))
        })?;
        std::fs::write(root.join(OCI_LAYOUT_FILE), OCI_LAYOUT_CONTENT)?;

        let layout = Self { root };
        if !layout.root.join(INDEX_FILE).exists() {
            layout.write_index(&empty_index()?)?;
        }

        tracing::debug!(path = %layout.root.display(), "Created OCI layout");
        Ok(layout)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn validate(root: &Path) -> Result<()> {
        for (entry, what) in [
            (OCI_LAYOUT_FILE, "oci-layout file"),
            (INDEX_FILE, "index.json"),
            (BLOBS_DIR, "blobs directory"),
        ] {
            if !root.join(entry).exists() {
                return Err(OciDistError::NotFound(format!(
                    "Not a valid OCI layout: missing {} in {}",
                    what,
                    root.display()
                )));
            }
        }
        Ok(())
    }

    /// Read the top-level `index.json`.
    pub fn read_index(&self) -> Result<ImageIndex> {
        let index_path = self.root.join(INDEX_FILE);
        let content = std::fs::read(&index_path).map_err(|e| {
            OciDistError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to read {}: {}", index_path.display(), e),
            ))
        })?;
        serde_json::from_slice(&content).map_err(|e| {
            OciDistError::SerializationError(format!(
                "Failed to parse {}: {}",
                index_path.display(),
                e
            ))
        })
    }

    /// Replace `index.json` atomically.
    fn write_index(&self, index: &ImageIndex) -> Result<()> {
        write_atomic(&self.root.join(INDEX_FILE), &serde_json::to_vec(index)?)
    }

    /// Path of a blob inside `blobs/<algorithm>/<hex>`.
    pub fn blob_path(&self, digest: &str) -> Result<PathBuf> {
        let (algorithm, hash) = split_digest(digest)?;
        let safe = |s: &str| s.chars().all(|c| c.is_ascii_alphanumeric() || "+._-".contains(c));
        if !safe(algorithm) || !safe(hash) || hash.contains("..") {
            return Err(OciDistError::Validation(format!(
                "Invalid digest '{}'",
                digest
            )));
        }
        Ok(self.root.join(BLOBS_DIR).join(algorithm).join(hash))
    }

    pub fn has_blob(&self, digest: &str) -> bool {
        self.blob_path(digest).is_ok_and(|p| p.is_file())
    }

    /// Read a blob and check it against its digest.
    pub fn read_blob(&self, digest: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(digest)?;
        let data = std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                OciDistError::NotFound(format!("blob {} in {}", digest, self.root.display()))
            }
            _ => OciDistError::IoError(e),
        })?;
        verify_digest(digest, &data)?;
        Ok(data)
    }

    /// Store a blob under its digest. Existing blobs are left untouched.
    pub fn write_blob(&self, digest: &str, data: &[u8]) -> Result<()> {
        verify_digest(digest, data)?;
        let path = self.blob_path(digest)?;
        if path.is_file() {
            return Ok(());
        }
        write_atomic(&path, data)?;

        tracing::debug!(digest = %digest, size = data.len(), "Wrote layout blob");
        Ok(())
    }

    /// Descriptors named `name` in the index, with nested indexes expanded
    /// to the manifests they contain.
    pub fn resolve_reference(&self, name: &str) -> Result<Vec<Descriptor>> {
        let index = self.read_index()?;
        let mut resolved = Vec::new();
        for desc in index
            .manifests()
            .iter()
            .filter(|d| annotation(d, ANNOTATION_REF_NAME) == Some(name))
        {
            self.expand_descriptor(desc, &mut resolved)?;
        }
        Ok(resolved)
    }

    fn expand_descriptor(&self, desc: &Descriptor, out: &mut Vec<Descriptor>) -> Result<()> {
        if desc.media_type() != &MediaType::ImageIndex {
            out.push(desc.clone());
            return Ok(());
        }
        let nested: ImageIndex = serde_json::from_slice(&self.read_blob(desc.digest())?)?;
        for child in nested.manifests() {
            self.expand_descriptor(child, out)?;
        }
        Ok(())
    }

    /// All reference names in the index, sorted and de-duplicated.
    pub fn list_references(&self) -> Result<Vec<String>> {
        let index = self.read_index()?;
        let mut names: Vec<String> = index
            .manifests()
            .iter()
            .filter_map(|d| annotation(d, ANNOTATION_REF_NAME))
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Point reference `name` at `desc`, replacing any previous entry.
    pub fn tag_manifest(&self, desc: &Descriptor, name: &str) -> Result<()> {
        let mut index = self.read_index()?;
        let mut manifests: Vec<Descriptor> = index
            .manifests()
            .iter()
            .filter(|d| annotation(d, ANNOTATION_REF_NAME) != Some(name))
            .cloned()
            .collect();
        let mut entry = desc.clone();
        annotate(&mut entry, ANNOTATION_REF_NAME, name);
        manifests.push(entry);
        index.set_manifests(manifests);
        self.write_index(&index)?;

        tracing::debug!(name = %name, digest = %desc.digest(), "Tagged layout manifest");
        Ok(())
    }

    /// Add an untagged manifest entry to the index if it is not there yet.
    pub fn add_manifest(&self, desc: &Descriptor) -> Result<()> {
        let mut index = self.read_index()?;
        if index.manifests().iter().any(|d| d.digest() == desc.digest()) {
            return Ok(());
        }
        let mut manifests = index.manifests().clone();
        manifests.push(desc.clone());
        index.set_manifests(manifests);
        self.write_index(&index)
    }
}

/// Write `data` to a uniquely named temp file beside `path`, then rename it
/// into place.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| OciDistError::IoError(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocidist_core::oci::{
        descriptor_for, empty_config_descriptor, image_manifest, manifest_bytes, sha256_digest,
    };
    use std::fs;
    use tempfile::TempDir;

    /// Store an empty image manifest and return its descriptor.
    fn manifest_descriptor(layout: &OciLayout) -> Descriptor {
        let manifest = image_manifest(empty_config_descriptor(), vec![]).unwrap();
        let raw = manifest_bytes(&manifest).unwrap();
        let desc = descriptor_for(MediaType::ImageManifest, &raw);
        layout.write_blob(desc.digest(), &raw).unwrap();
        desc
    }

    #[test]
    fn test_open_missing_oci_layout_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = OciLayout::open(temp_dir.path()).unwrap_err();
        assert!(err.to_string().contains("oci-layout"));
    }

    #[test]
    fn test_open_missing_index_json() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("oci-layout"), OCI_LAYOUT_CONTENT).unwrap();
        let err = OciLayout::open(temp_dir.path()).unwrap_err();
        assert!(err.to_string().contains("index.json"));
    }

    #[test]
    fn test_open_missing_blobs_dir() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("oci-layout"), OCI_LAYOUT_CONTENT).unwrap();
        fs::write(temp_dir.path().join("index.json"), "{\"schemaVersion\":2}").unwrap();
        let err = OciLayout::open(temp_dir.path()).unwrap_err();
        assert!(err.to_string().contains("blobs"));
    }

    #[test]
    fn test_create_then_open() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("layout");
        OciLayout::create(&root).unwrap();

        let layout = OciLayout::open(&root).unwrap();
        assert!(layout.read_index().unwrap().manifests().is_empty());
        assert!(layout.list_references().unwrap().is_empty());
    }

    #[test]
    fn test_write_and_read_blob() {
        let temp_dir = TempDir::new().unwrap();
        let layout = OciLayout::create(temp_dir.path()).unwrap();

        let digest = sha256_digest(b"layer data");
        layout.write_blob(&digest, b"layer data").unwrap();
        assert!(layout.has_blob(&digest));
        assert_eq!(layout.read_blob(&digest).unwrap(), b"layer data");

        // Rewriting an existing blob is a no-op.
        layout.write_blob(&digest, b"layer data").unwrap();
    }

    #[test]
    fn test_writes_leave_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let layout = OciLayout::create(temp_dir.path()).unwrap();
        let desc = manifest_descriptor(&layout);
        layout.tag_manifest(&desc, "app:v1").unwrap();

        let names = |dir: &Path| -> Vec<String> {
            fs::read_dir(dir)
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        };
        let mut root = names(temp_dir.path());
        root.sort();
        assert_eq!(root, vec!["blobs", "index.json", "oci-layout"]);
        assert_eq!(
            names(&temp_dir.path().join("blobs").join("sha256")),
            vec![desc.digest().trim_start_matches("sha256:").to_string()]
        );
    }

    #[test]
    fn test_concurrent_blob_writes() {
        let temp_dir = TempDir::new().unwrap();
        let layout = OciLayout::create(temp_dir.path()).unwrap();
        let data = vec![7u8; 256 * 1024];
        let digest = sha256_digest(&data);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| layout.write_blob(&digest, &data).unwrap());
            }
        });
        assert_eq!(layout.read_blob(&digest).unwrap(), data);
    }

    #[test]
    fn test_write_blob_rejects_wrong_digest() {
        let temp_dir = TempDir::new().unwrap();
        let layout = OciLayout::create(temp_dir.path()).unwrap();
        let digest = sha256_digest(b"a");
        assert!(layout.write_blob(&digest, b"b").is_err());
        assert!(!layout.has_blob(&digest));
    }

    #[test]
    fn test_read_blob_detects_corruption() {
        let temp_dir = TempDir::new().unwrap();
        let layout = OciLayout::create(temp_dir.path()).unwrap();
        let digest = sha256_digest(b"good");
        fs::write(layout.blob_path(&digest).unwrap(), b"evil").unwrap();

        let err = layout.read_blob(&digest).unwrap_err();
        assert!(matches!(err, OciDistError::Validation(_)));
    }

    #[test]
    fn test_read_missing_blob_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let layout = OciLayout::create(temp_dir.path()).unwrap();
        let err = layout.read_blob(&sha256_digest(b"absent")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_blob_path_rejects_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let layout = OciLayout::create(temp_dir.path()).unwrap();
        assert!(layout.blob_path("sha256:../../etc/passwd").is_err());
        assert!(layout.blob_path("nodigest").is_err());
        assert_eq!(
            layout.blob_path("sha256:abc").unwrap(),
            temp_dir.path().join("blobs").join("sha256").join("abc")
        );
    }

    #[test]
    fn test_tag_and_resolve() {
        let temp_dir = TempDir::new().unwrap();
        let layout = OciLayout::create(temp_dir.path()).unwrap();

        let desc = manifest_descriptor(&layout);
        layout.tag_manifest(&desc, "app:v1").unwrap();
        layout.tag_manifest(&desc, "app:v1").unwrap();
        layout.tag_manifest(&desc, "app:latest").unwrap();

        let resolved = layout.resolve_reference("app:v1").unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].digest(), desc.digest());
        assert_eq!(
            annotation(&resolved[0], ANNOTATION_REF_NAME),
            Some("app:v1")
        );
        assert!(layout.resolve_reference("app:v2").unwrap().is_empty());
        assert_eq!(
            layout.list_references().unwrap(),
            vec!["app:latest", "app:v1"]
        );
    }

    #[test]
    fn test_resolve_descends_into_nested_index() {
        let temp_dir = TempDir::new().unwrap();
        let layout = OciLayout::create(temp_dir.path()).unwrap();

        let manifest_desc = manifest_descriptor(&layout);

        let mut nested = empty_index().unwrap();
        nested.set_manifests(vec![manifest_desc.clone()]);
        let nested_raw = serde_json::to_vec(&nested).unwrap();
        let nested_desc = descriptor_for(MediaType::ImageIndex, &nested_raw);
        layout.write_blob(nested_desc.digest(), &nested_raw).unwrap();
        layout.tag_manifest(&nested_desc, "multi").unwrap();

        let resolved = layout.resolve_reference("multi").unwrap();
        assert_eq!(resolved, vec![manifest_desc]);
    }

    #[test]
    fn test_add_manifest_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let layout = OciLayout::create(temp_dir.path()).unwrap();
        let desc = descriptor_for(MediaType::ImageManifest, b"{}");
        layout.add_manifest(&desc).unwrap();
        layout.add_manifest(&desc).unwrap();
        assert_eq!(layout.read_index().unwrap().manifests().len(), 1);
    }
}
