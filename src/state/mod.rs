//! Durable migration state.
//!
//! The state file is a JSON object keyed by repository, then tag:
//!
//! ```json
//! { "org/app": { "v1": { "mediaType": "...", "platforms": ["linux/amd64"], "status": "complete" } } }
//! ```
//!
//! [`StateStore`] owns the in-memory copy. Callers mutate it and then call
//! [`StateStore::save`], which replaces the file atomically.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{MigrateError, Result};
use crate::manifest::{Classification, ManifestKind};


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStatus {
    Complete,
    Error,
}

/// Everything known about one (repository, tag) pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default)]
    pub platforms: Vec<String>,
    /// Absent until the first copy attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MigrationStatus>,
}

/// Cached manifest metadata for a resolved tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRecord {
    pub media_type: String,
    pub kind: ManifestKind,
    pub platforms: Vec<String>,
}

impl TagRecord {
    /// The cached manifest, once the tag has been inspected
    pub fn manifest(&self) -> Option<ManifestRecord> {
        self.media_type.as_ref().map(|media_type| ManifestRecord {
            media_type: media_type.clone(),
            kind: ManifestKind::from_media_type(media_type),
            platforms: self.platforms.clone(),
        })
    }

    pub fn is_complete(&self) -> bool {
        self.status == Some(MigrationStatus::Complete)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MigrationState {
    repositories: BTreeMap<String, BTreeMap<String, TagRecord>>,
}

impl MigrationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, repo: &str, tag: &str) -> Option<&TagRecord> {
        self.repositories.get(repo).and_then(|tags| tags.get(tag))
    }

    pub fn contains(&self, repo: &str, tag: &str) -> bool {
        self.get(repo, tag).is_some()
    }

    /// Add an empty record for (repo, tag). Returns false if it already existed.
    pub fn register(&mut self, repo: &str, tag: &str) -> bool {
        let tags = self.repositories.entry(repo.to_string()).or_default();
        if tags.contains_key(tag) {
            return false;
        }
        tags.insert(tag.to_string(), TagRecord::default());
        true
    }

    /// Store the manifest classification for (repo, tag).
    ///
    /// A record that already carries a media type is left alone; returns
    /// whether anything was written.
    pub fn record_manifest(&mut self, repo: &str, tag: &str, classification: &Classification) -> bool {
        let record = self
            .repositories
            .entry(repo.to_string())
            .or_default()
            .entry(tag.to_string())
            .or_default();
        if record.media_type.is_some() {
            debug!("Manifest for {}:{} already cached, not overwriting", repo, tag);
            return false;
        }
        record.media_type = Some(classification.media_type.clone());
        record.platforms = classification.platforms.clone();
        true
    }

    /// Set the migration status of (repo, tag). `complete` is terminal: once
    /// reached, further updates are ignored. Returns whether anything changed.
    pub fn set_status(&mut self, repo: &str, tag: &str, status: MigrationStatus) -> bool {
        let record = self
            .repositories
            .entry(repo.to_string())
            .or_default()
            .entry(tag.to_string())
            .or_default();
        match record.status {
            Some(MigrationStatus::Complete) => {
                if status != MigrationStatus::Complete {
                    warn!(
                        "Ignoring {:?} status for {}:{}, already complete",
                        status, repo, tag
                    );
                }
                false
            }
            current => {
                record.status = Some(status);
                current != Some(status)
            }
        }
    }

    /// Every (repo, tag, record), ordered by repository then tag
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &TagRecord)> {
        self.repositories.iter().flat_map(|(repo, tags)| {
            tags.iter()
                .map(move |(tag, record)| (repo.as_str(), tag.as_str(), record))
        })
    }

    pub fn repository_count(&self) -> usize {
        self.repositories.len()
    }

    pub fn tag_count(&self) -> usize {
        self.repositories.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tag_count() == 0
    }
}

/// Owns the persisted [`MigrationState`] for one state file
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: MigrationState,
}

impl StateStore {
    /// Load the state at `path`, or start empty if the file does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let data = std::fs::read_to_string(&path).map_err(|source| MigrateError::State {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&data).map_err(|e| MigrateError::StateCorruption {
                path: path.clone(),
                reason: e.to_string(),
            })?
        } else {
            debug!("No state file at {}, starting fresh", path.display());
            MigrationState::new()
        };

        Ok(Self { path, state })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &MigrationState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut MigrationState {
        &mut self.state
    }

    /// Write the full state to a temporary file next to the target, then
    /// rename it into place.
    pub fn save(&self) -> Result<()> {
        let io_err = |source| MigrateError::State {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(io_err)?;

        let json = serde_json::to_string_pretty(&self.state)
            .map_err(|e| io_err(std::io::Error::other(e)))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(json.as_bytes()).map_err(io_err)?;
        tmp.write_all(b"\n").map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;

        debug!("Saved state to {}", self.path.display());
        Ok(())
    }
}
