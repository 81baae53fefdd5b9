//! In-memory registry for tests and dry experiments.
//!
//! Every call is recorded so callers can assert exactly which registry
//! operations a run issued. Failures can be scripted per operation and key.

use async_trait::async_trait;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::{CopyOptions, ImageRef, RawManifest, RegistryClient, RegistryError};
use crate::constants::{annotation, media_type};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ListTags,
    Inspect,
    Copy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListTags { host: String, repository: String },
    Inspect(ImageRef),
    Copy {
        source: ImageRef,
        target: ImageRef,
        options: CopyOptions,
    },
}

struct ScriptedFailure {
    operation: Operation,
    key: String,
    remaining: u32,
    error: RegistryError,
}

#[derive(Default)]
struct Inner {
    images: BTreeMap<ImageRef, RawManifest>,
    logins: HashMap<String, String>,
    failures: Vec<ScriptedFailure>,
    calls: Vec<Call>,
}

impl Inner {
    /// Consume one scripted failure for `operation` on `key`, if any remain
    fn take_failure(&mut self, operation: Operation, key: &str) -> Option<RegistryError> {
        let failure = self
            .failures
            .iter_mut()
            .find(|f| f.operation == operation && f.key == key && f.remaining > 0)?;
        failure.remaining -= 1;
        Some(failure.error.clone())
    }
}

#[derive(Default)]
pub struct MemoryRegistry {
    inner: Mutex<Inner>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_image(self, image: ImageRef, manifest: RawManifest) -> Self {
        self.push(image, manifest);
        self
    }

    pub fn push(&self, image: ImageRef, manifest: RawManifest) {
        self.state().images.insert(image, manifest);
    }

    pub fn remove(&self, image: &ImageRef) -> Option<RawManifest> {
        self.state().images.remove(image)
    }

    pub fn contains(&self, image: &ImageRef) -> bool {
        self.state().images.contains_key(image)
    }

    pub fn manifest(&self, image: &ImageRef) -> Option<RawManifest> {
        self.state().images.get(image).cloned()
    }

    pub fn set_login(&self, host: &str, user: &str) {
        self.state()
            .logins
            .insert(host.to_string(), user.to_string());
    }

    /// Make the next `times` calls of `operation` on `key` fail with `error`.
    ///
    /// `key` is `host/repository` for list-tags, the image reference for
    /// inspect, and the source image reference for copy.
    pub fn fail(&self, operation: Operation, key: impl Into<String>, times: u32, error: RegistryError) {
        self.state().failures.push(ScriptedFailure {
            operation,
            key: key.into(),
            remaining: times,
            error,
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn list_count(&self) -> usize {
        self.count(|c| matches!(c, Call::ListTags { .. }))
    }

    pub fn inspect_count(&self) -> usize {
        self.count(|c| matches!(c, Call::Inspect(_)))
    }

    /// Inspect calls issued against `host`
    pub fn inspect_count_for(&self, host: &str) -> usize {
        self.count(|c| matches!(c, Call::Inspect(image) if image.host == host))
    }

    pub fn copy_count(&self) -> usize {
        self.count(|c| matches!(c, Call::Copy { .. }))
    }

    fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.state().calls.iter().filter(|c| predicate(c)).count()
    }
}

#[async_trait]
impl RegistryClient for MemoryRegistry {
    async fn list_tags(&self, host: &str, repository: &str) -> Result<Vec<String>, RegistryError> {
        let mut inner = self.state();
        inner.calls.push(Call::ListTags {
            host: host.to_string(),
            repository: repository.to_string(),
        });

        let key = super::repository_path(host, repository);
        if let Some(error) = inner.take_failure(Operation::ListTags, &key) {
            return Err(error);
        }

        let tags: Vec<String> = inner
            .images
            .keys()
            .filter(|i| i.host == host && i.repository == repository)
            .map(|i| i.tag.clone())
            .collect();
        if tags.is_empty() {
            return Err(RegistryError::NotFound(format!("repository {} not found", key)));
        }
        Ok(tags)
    }

    async fn inspect(&self, image: &ImageRef) -> Result<RawManifest, RegistryError> {
        let mut inner = self.state();
        inner.calls.push(Call::Inspect(image.clone()));

        if let Some(error) = inner.take_failure(Operation::Inspect, &image.to_string()) {
            return Err(error);
        }

        inner
            .images
            .get(image)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(format!("manifest unknown: {}", image)))
    }

    async fn copy(
        &self,
        source: &ImageRef,
        target: &ImageRef,
        options: CopyOptions,
    ) -> Result<(), RegistryError> {
        let mut inner = self.state();
        inner.calls.push(Call::Copy {
            source: source.clone(),
            target: target.clone(),
            options,
        });

        if let Some(error) = inner.take_failure(Operation::Copy, &source.to_string()) {
            return Err(error);
        }

        let manifest = inner
            .images
            .get(source)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(format!("manifest unknown: {}", source)))?;
        inner.images.insert(target.clone(), manifest);
        Ok(())
    }

    async fn login_user(&self, host: &str) -> Result<Option<String>, RegistryError> {
        Ok(self.state().logins.get(host).cloned())
    }
}

/// An OCI index listing one image per platform, plus a buildx attestation
pub fn oci_index(platforms: &[&str]) -> RawManifest {
    let mut manifests: Vec<serde_json::Value> = platforms
        .iter()
        .enumerate()
        .map(|(i, platform)| {
            let (os, architecture) = platform.split_once('/').unwrap_or((*platform, ""));
            json!({
                "mediaType": media_type::OCI_MANIFEST,
                "digest": format!("sha256:{:064x}", i + 1),
                "size": 512,
                "platform": {"os": os, "architecture": architecture},
            })
        })
        .collect();
    manifests.push(json!({
        "mediaType": media_type::OCI_MANIFEST,
        "digest": format!("sha256:{:064x}", 0xa77e57u32),
        "size": 512,
        "platform": {"os": "unknown", "architecture": "unknown"},
        "annotations": {(annotation::REFERENCE_TYPE): annotation::ATTESTATION_MANIFEST},
    }));

    let document = json!({
        "schemaVersion": 2,
        "mediaType": media_type::OCI_INDEX,
        "manifests": manifests,
    });
    RawManifest::new(None, document.to_string())
}

/// A single-platform Docker schema 2 manifest
pub fn docker_image(config_digest: &str) -> RawManifest {
    let document = json!({
        "schemaVersion": 2,
        "mediaType": media_type::DOCKER_MANIFEST,
        "config": {
            "mediaType": "application/vnd.docker.container.image.v1+json",
            "digest": config_digest,
            "size": 1024,
        },
        "layers": [],
    });
    RawManifest::new(None, document.to_string())
}

/// A schema 1 manifest, which the classifier does not accept
pub fn schema1_manifest() -> RawManifest {
    let document = json!({
        "schemaVersion": 1,
        "mediaType": "application/vnd.docker.distribution.manifest.v1+prettyjws",
        "fsLayers": [],
    });
    RawManifest::new(None, document.to_string())
}
