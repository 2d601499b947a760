//! Repository URL parsing.
//!
//! Parses URLs like `ocidist://localhost:5000/myrepo/myimage:v2.1` or
//! `oci:///data/oci:myimage:v1` into structured components and decides
//! which backend serves them.
//!
//! ```text
//! ocidist://localhost:5000/myrepo/myimage:v2.1
//!           \____________/ \____________/ \__/
//!             authority      repository    tag
//!
//! oci://home/ubuntu/build/oci:img:v2.31
//!       \__/\_______________/ \_/ \___/
//!     authority  path          name  tag     dir = authority + path
//! ```

use ocidist_core::error::{OciDistError, Result};

/// Which backend serves a repository URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoType {
    /// Remote registry over the distribution protocol
    Registry,
    /// Local OCI image layout directory
    Layout,
}

impl RepoType {
    /// Map a URL scheme to its backend.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "ocidist" | "docker" | "http" | "https" => Some(RepoType::Registry),
            "oci" => Some(RepoType::Layout),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RepoType::Registry => "ocidist",
            RepoType::Layout => "oci",
        }
    }
}

/// Parsed repository URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRef {
    raw: String,
    scheme: String,
    repo_type: RepoType,
    /// `[userinfo@]host[:port]`, empty for `oci:///abs/path`
    authority: String,
    /// Registry: repository name without a leading '/'.
    /// Layout: layout directory as written in the URL path.
    path: String,
    /// Layout only: image name inside the layout
    image: String,
    /// Empty when the URL names a repository rather than an image
    tag: String,
    /// Registry only: `name@sha256:...` references
    digest: Option<String>,
}

impl RepositoryRef {
    /// Parse a repository URL.
    pub fn parse(raw_url: &str) -> Result<Self> {
        let raw = raw_url.trim();
        let parse_err = |message: &str| OciDistError::UrlParse {
            url: raw.to_string(),
            message: message.to_string(),
        };

        let (scheme, rest) = raw
            .split_once("://")
            .ok_or_else(|| parse_err("missing '://' after scheme"))?;
        if scheme.is_empty()
            || !scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return Err(parse_err("invalid scheme"));
        }
        let scheme = scheme.to_ascii_lowercase();

        let repo_type =
            RepoType::from_scheme(&scheme).ok_or_else(|| OciDistError::UnsupportedScheme {
                scheme: scheme.clone(),
                url: raw.to_string(),
            })?;

        // The authority ends at the first '/', so ports and IPv6 hosts never
        // take part in tag splitting.
        let (authority, path) = match rest.find('/') {
            Some(pos) => (&rest[..pos], &rest[pos..]),
            None => (rest, ""),
        };

        let mut parsed = RepositoryRef {
            raw: raw.to_string(),
            scheme,
            repo_type,
            authority: authority.to_string(),
            path: String::new(),
            image: String::new(),
            tag: String::new(),
            digest: None,
        };

        match repo_type {
            RepoType::Registry => parsed.parse_registry_path(path)?,
            RepoType::Layout => parsed.parse_layout_path(path)?,
        }
        Ok(parsed)
    }

    /// `name[:tag]` or `name@digest`, split on the last ':' after the last '/'.
    fn parse_registry_path(&mut self, path: &str) -> Result<()> {
        let path = path.trim_start_matches('/');

        let (name, tag, digest) = if let Some((name, digest)) = path.rsplit_once('@') {
            if !digest.contains(':') {
                return Err(OciDistError::UrlParse {
                    url: self.raw.clone(),
                    message: format!("invalid digest '{}': expected algorithm:hex", digest),
                });
            }
            (name, "", Some(digest.to_string()))
        } else {
            let last_segment_start = path.rfind('/').map(|p| p + 1).unwrap_or(0);
            match path[last_segment_start..].rfind(':') {
                Some(colon) => {
                    let colon = last_segment_start + colon;
                    (&path[..colon], &path[colon + 1..], None)
                }
                None => (path, "", None),
            }
        };

        if name.contains(':') {
            return Err(OciDistError::UrlParse {
                url: self.raw.clone(),
                message: format!("repository name '{}' may not contain ':'", name),
            });
        }

        self.path = name.trim_end_matches('/').to_string();
        self.tag = tag.to_string();
        self.digest = digest;
        Ok(())
    }

    /// `dir[:image[:tag]]`
    fn parse_layout_path(&mut self, path: &str) -> Result<()> {
        let toks: Vec<&str> = path.split(':').collect();
        if toks.len() > 3 {
            return Err(OciDistError::UrlParse {
                url: self.raw.clone(),
                message: format!(
                    "expected <dir>[:<image>[:<tag>]], found {} ':'-separated fields",
                    toks.len()
                ),
            });
        }

        self.path = toks[0].to_string();
        self.image = toks.get(1).copied().unwrap_or_default().to_string();
        self.tag = toks.get(2).copied().unwrap_or_default().to_string();
        Ok(())
    }

    /// The URL as given.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn repo_type(&self) -> RepoType {
        self.repo_type
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Registry repository name, or the layout directory path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Image name inside a layout (empty for registries).
    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Manifest reference: the digest if one was given, else the tag.
    pub fn reference(&self) -> &str {
        self.digest.as_deref().unwrap_or(&self.tag)
    }

    /// Layout directory: the authority joined with the first path field.
    pub fn layout_dir(&self) -> String {
        if self.authority.is_empty() {
            self.path.clone()
        } else if self.path.is_empty() {
            self.authority.clone()
        } else {
            format!(
                "{}/{}",
                self.authority.trim_end_matches('/'),
                self.path.trim_start_matches('/')
            )
        }
    }

    /// Layout reference name: `image` or `image:tag`.
    pub fn layout_ref_name(&self) -> String {
        if self.tag.is_empty() {
            self.image.clone()
        } else {
            format!("{}:{}", self.image, self.tag)
        }
    }
}

impl std::fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}
