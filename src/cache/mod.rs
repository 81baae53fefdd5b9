//! Manifest metadata cache.
//!
//! Inspect calls against the source registry are rate limited, so each
//! (repository, tag) is inspected at most once per state file. The result
//! lives in the [`StateStore`] alongside the tag's migration status.

use tracing::{debug, info, warn};

use crate::error::{MigrateError, Result};
use crate::manifest::{self, Classification, ManifestKind};
use crate::registry::{ImageRef, RegistryClient};
use crate::state::{ManifestRecord, StateStore};

#[cfg(test)]
mod tests;

pub struct ManifestCache<'a, C> {
    client: &'a C,
    source_host: &'a str,
}

impl<'a, C: RegistryClient> ManifestCache<'a, C> {
    pub fn new(client: &'a C, source_host: &'a str) -> Self {
        Self {
            client,
            source_host,
        }
    }

    /// Return the cached manifest for (repo, tag), inspecting the source
    /// registry only when nothing is cached yet.
    ///
    /// Fails with [`MigrateError::UnrecognizedManifest`] when the manifest
    /// cannot be migrated; that outcome is cached as well.
    pub async fn get_or_fetch(
        &self,
        store: &mut StateStore,
        repo: &str,
        tag: &str,
    ) -> Result<ManifestRecord> {
        if let Some(record) = store.state().get(repo, tag).and_then(|r| r.manifest()) {
            debug!("Manifest cache hit for {}:{}", repo, tag);
            return usable(repo, tag, record);
        }

        let image = ImageRef::new(self.source_host, repo, tag);
        debug!("Inspecting {}", image);
        let raw = self
            .client
            .inspect(&image)
            .await
            .map_err(|source| MigrateError::Discovery {
                repo: repo.to_string(),
                tag: Some(tag.to_string()),
                source,
            })?;

        let classification = match manifest::classify(raw.media_type.as_deref(), &raw.document) {
            Ok(c) => c,
            Err(e) => {
                // The record's kind is derived from its media type, so a
                // declared type must not be stored for an unreadable document.
                warn!(
                    "Manifest for {} (declared {:?}) is not valid JSON: {}",
                    image, raw.media_type, e
                );
                Classification {
                    media_type: String::new(),
                    kind: ManifestKind::Unrecognized,
                    platforms: Vec::new(),
                }
            }
        };

        match classification.kind {
            ManifestKind::MultiPlatform => {
                info!("{} is multi-platform: {:?}", image, classification.platforms)
            }
            ManifestKind::SinglePlatform => info!("{} is single-platform", image),
            ManifestKind::Unrecognized => info!(
                "{} has unrecognized media type {:?}, it will not be migrated",
                image, classification.media_type
            ),
        }

        store
            .state_mut()
            .record_manifest(repo, tag, &classification);
        store.save()?;

        usable(
            repo,
            tag,
            ManifestRecord {
                media_type: classification.media_type,
                kind: classification.kind,
                platforms: classification.platforms,
            },
        )
    }
}

fn usable(repo: &str, tag: &str, record: ManifestRecord) -> Result<ManifestRecord> {
    if record.kind.is_copyable() {
        Ok(record)
    } else {
        Err(MigrateError::UnrecognizedManifest {
            repo: repo.to_string(),
            tag: tag.to_string(),
            media_type: record.media_type,
        })
    }
}
