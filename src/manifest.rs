use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::constants::{annotation, media_type};

/// Classification of a manifest's media type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    /// OCI image index or Docker manifest list
    MultiPlatform,
    /// A single runnable image manifest
    SinglePlatform,
    /// Anything we do not know how to copy
    Unrecognized,
}

impl ManifestKind {
    pub fn from_media_type(media_type: &str) -> Self {
        match media_type {
            media_type::OCI_INDEX | media_type::DOCKER_MANIFEST_LIST => Self::MultiPlatform,
            media_type::OCI_MANIFEST | media_type::DOCKER_MANIFEST => Self::SinglePlatform,
            _ => Self::Unrecognized,
        }
    }

    /// Whether items of this kind can be scheduled for copy
    pub fn is_copyable(self) -> bool {
        !matches!(self, Self::Unrecognized)
    }
}

/// The fields of an index or manifest document that classification needs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestDocument {
    #[serde(rename = "mediaType", default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub manifests: Option<Vec<ManifestDescriptor>>,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
    #[serde(default)]
    pub layers: Option<Vec<serde_json::Value>>,
}

/// Descriptor for a platform-specific manifest in an index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestDescriptor {
    #[serde(rename = "mediaType", default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub platform: Option<Platform>,
    #[serde(default)]
    pub annotations: Option<HashMap<String, String>>,
}

/// Platform information for a manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Platform {
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub os: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl ManifestDescriptor {
    /// Attestation entries carry provenance metadata, not a runnable image
    pub fn is_attestation(&self) -> bool {
        let annotated = self
            .annotations
            .as_ref()
            .and_then(|a| a.get(annotation::REFERENCE_TYPE))
            .is_some_and(|v| v == annotation::ATTESTATION_MANIFEST);

        let unknown_platform = self
            .platform
            .as_ref()
            .is_some_and(|p| p.os == "unknown" && p.architecture == "unknown");

        annotated || unknown_platform
    }
}

/// Result of classifying an inspected manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub media_type: String,
    pub kind: ManifestKind,
    pub platforms: Vec<String>,
}

/// Classify a raw manifest. `declared` is the media type reported by the
/// registry client and wins over the document's own field.
pub fn classify(declared: Option<&str>, raw: &str) -> serde_json::Result<Classification> {
    let doc: ManifestDocument = serde_json::from_str(raw)?;

    let media_type = declared
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .or_else(|| doc.media_type.clone())
        .unwrap_or_else(|| infer_media_type(&doc).to_string());

    let kind = ManifestKind::from_media_type(&media_type);
    let platforms = match kind {
        ManifestKind::MultiPlatform => index_platforms(&doc),
        ManifestKind::SinglePlatform | ManifestKind::Unrecognized => Vec::new(),
    };

    Ok(Classification {
        media_type,
        kind,
        platforms,
    })
}

/// OCI documents may omit `mediaType`; fall back to their shape.
fn infer_media_type(doc: &ManifestDocument) -> &'static str {
    if doc.manifests.is_some() {
        media_type::OCI_INDEX
    } else if doc.config.is_some() && doc.layers.is_some() {
        media_type::OCI_MANIFEST
    } else {
        ""
    }
}

/// Distinct `os/architecture` pairs of an index, in index order
fn index_platforms(doc: &ManifestDocument) -> Vec<String> {
    let mut platforms: Vec<String> = Vec::new();
    for descriptor in doc.manifests.iter().flatten() {
        if descriptor.is_attestation() {
            continue;
        }
        let Some(platform) = &descriptor.platform else {
            continue;
        };
        if platform.os.is_empty() || platform.architecture.is_empty() {
            continue;
        }
        let entry = format!("{}/{}", platform.os, platform.architecture);
        if !platforms.contains(&entry) {
            platforms.push(entry);
        }
    }
    platforms
}
