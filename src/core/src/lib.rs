//! ocidist core - foundational types shared by the repository backends,
//! the SOCI protocol and the CLI.

pub mod config;
pub mod error;
pub mod oci;

// Re-export commonly used types
pub use config::{ApiConfig, LogLevel, OciDistConfig, DEFAULT_PRODUCT};
pub use error::{OciDistError, Result, ResultExt};
pub use oci::{Descriptor, ImageIndex, ImageManifest, MediaType, RepositoryList, TagList};

/// ocidist version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
