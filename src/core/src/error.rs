use thiserror::Error;

/// ocidist error types
#[derive(Error, Debug)]
pub enum OciDistError {
    /// URL could not be split into scheme, authority and path
    #[error("Failed to parse url '{url}': {message}")]
    UrlParse { url: String, message: String },

    /// URL scheme has no backend
    #[error("Unknown URL scheme '{scheme}' in url '{url}'")]
    UnsupportedScheme { scheme: String, url: String },

    /// Transport-level failure (connect, TLS, body read)
    #[error("Network error: {0}")]
    Network(String),

    /// Registry answered with an unexpected HTTP status
    #[error("{context}, StatusCode: {status}")]
    Protocol { context: String, status: u16 },

    /// Manifest, blob or referrer is missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Wrong media type, artifact type, layer count, digest or bundle contents
    #[error("Validation error: {0}")]
    Validation(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Operation not supported by this backend
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Key, certificate or signature handling failed
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An inner error annotated with the operation that produced it
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<OciDistError>,
    },
}

impl OciDistError {
    /// Wrap this error with a description of the failing step.
    pub fn context(self, context: impl Into<String>) -> Self {
        OciDistError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any context wrappers.
    pub fn root(&self) -> &OciDistError {
        match self {
            OciDistError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), OciDistError::NotFound(_))
    }

    /// HTTP status carried by a protocol error, if any.
    pub fn status(&self) -> Option<u16> {
        match self.root() {
            OciDistError::Protocol { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for OciDistError {
    fn from(err: serde_json::Error) -> Self {
        OciDistError::SerializationError(err.to_string())
    }
}

impl From<oci_spec::OciSpecError> for OciDistError {
    fn from(err: oci_spec::OciSpecError) -> Self {
        OciDistError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for OciDistError {
    fn from(err: serde_yaml::Error) -> Self {
        OciDistError::SerializationError(err.to_string())
    }
}

/// Attach step context to the error side of a result.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.context(f()))
    }
}

/// Result type alias for ocidist operations
pub type Result<T> = std::result::Result<T, OciDistError>;
