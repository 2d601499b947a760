//! ocidist API - fetch and publish OCI content.
//!
//! One capability interface ([`OciApi`]) over two backends: remote registries
//! spoken to over the distribution protocol, and local OCI image layouts.
//! On top of it sit the artifact publisher, the SOCI signed-bundle protocol
//! and image copy.

pub mod api;
pub mod artifact;
pub mod copy;
pub mod layout;
pub mod layout_repo;
pub mod reference;
pub mod registry;
pub mod soci;

pub use api::{new_oci_api, OciApi};
pub use artifact::put_artifact;
pub use copy::{image_copy, ImageCopyOpts};
pub use layout::OciLayout;
pub use layout_repo::LayoutRepo;
pub use reference::{RepoType, RepositoryRef};
pub use registry::{RegistryRepo, USER_AGENT};
pub use soci::{
    publish_bundle, NativeCrypto, SignedBundle, SociArtifactKind, SociInfo, SociRef,
    UnsignedBundle, VerificationResult,
};

/// ocidist API version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
