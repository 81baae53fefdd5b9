//! Registry access used by discovery and copy.
//!
//! [`RegistryClient`] is the seam between the migration core and whatever
//! actually talks to registries: [`SkopeoClient`] in production,
//! [`MemoryRegistry`] in tests. [`Retrying`] layers a [`RetryPolicy`] over
//! either one.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub mod memory;
mod retry;
mod skopeo;

pub use memory::MemoryRegistry;
pub use retry::{RetryPolicy, Retrying};
pub use skopeo::SkopeoClient;


#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("registry unavailable: {0}")]
    Unavailable(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("skopeo binary not found in PATH")]
    ToolMissing,
}

impl RegistryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound(_))
    }
}

/// A fully qualified `host/repository:tag` reference
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImageRef {
    pub host: String,
    pub repository: String,
    pub tag: String,
}

impl ImageRef {
    pub fn new(host: &str, repository: &str, tag: &str) -> Self {
        Self {
            host: host.to_string(),
            repository: repository.to_string(),
            tag: tag.to_string(),
        }
    }

    /// `host/repository` without the tag
    pub fn repository_path(&self) -> String {
        repository_path(&self.host, &self.repository)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.host, self.repository, self.tag)
    }
}

pub fn repository_path(host: &str, repository: &str) -> String {
    format!("{}/{}", host, repository)
}

/// A manifest as returned by inspect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawManifest {
    /// Media type declared by the registry, if the client reports one
    pub media_type: Option<String>,
    /// The manifest document, byte for byte
    pub document: String,
}

impl RawManifest {
    pub fn new(media_type: Option<String>, document: String) -> Self {
        Self {
            media_type,
            document,
        }
    }

    /// Content digest of the manifest document
    pub fn digest(&self) -> String {
        format!("sha256:{}", sha256::digest(self.document.as_bytes()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiArch {
    /// Copy only the image matching the copying host
    None,
    /// Copy the index and every image it references
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyOptions {
    pub preserve_digests: bool,
    pub multi_arch: MultiArch,
}

impl CopyOptions {
    /// Options for migrating an image with the given cached platform set
    pub fn for_platforms(platforms: &[String]) -> Self {
        Self {
            preserve_digests: true,
            multi_arch: if platforms.is_empty() {
                MultiArch::None
            } else {
                MultiArch::All
            },
        }
    }
}

#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// List every tag of `host/repository`
    async fn list_tags(&self, host: &str, repository: &str) -> Result<Vec<String>, RegistryError>;

    /// Fetch the manifest at `image`
    async fn inspect(&self, image: &ImageRef) -> Result<RawManifest, RegistryError>;

    /// Copy `source` to `target`
    async fn copy(
        &self,
        source: &ImageRef,
        target: &ImageRef,
        options: CopyOptions,
    ) -> Result<(), RegistryError>;

    /// The user currently logged in to `host`, if any
    async fn login_user(&self, host: &str) -> Result<Option<String>, RegistryError>;
}
