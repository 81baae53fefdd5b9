//! Tag discovery: expands a plan entry into registered (repository, tag)
//! records with cached manifests.

use tracing::{debug, info, warn};

use crate::cache::ManifestCache;
use crate::config::PlanEntry;
use crate::error::{MigrateError, Result};
use crate::registry::RegistryClient;
use crate::state::StateStore;


/// Counts from discovering one plan entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub repo: String,
    pub listed: usize,
    pub selected: usize,
    /// Tags inspected for the first time in this run
    pub resolved: usize,
    /// Tags whose manifest was already cached
    pub cached: usize,
    pub unrecognized: usize,
    pub failed: usize,
}

pub struct TagDiscoverer<'a, C> {
    client: &'a C,
    source_host: &'a str,
}

impl<'a, C: RegistryClient> TagDiscoverer<'a, C> {
    pub fn new(client: &'a C, source_host: &'a str) -> Self {
        Self {
            client,
            source_host,
        }
    }

    /// Register and resolve every source tag of `entry` that matches its
    /// patterns.
    ///
    /// A failed tag listing is returned as [`MigrateError::Discovery`]; a
    /// failed inspect only counts against the report so the remaining tags
    /// still get resolved. State file errors are returned as-is.
    pub async fn discover(&self, entry: &PlanEntry, store: &mut StateStore) -> Result<DiscoveryReport> {
        let repo = entry.source_repo.as_str();
        let mut report = DiscoveryReport {
            repo: repo.to_string(),
            ..Default::default()
        };

        info!("Listing tags for {}/{}", self.source_host, repo);
        let tags = self
            .client
            .list_tags(self.source_host, repo)
            .await
            .map_err(|source| MigrateError::Discovery {
                repo: repo.to_string(),
                tag: None,
                source,
            })?;
        report.listed = tags.len();

        let selected: Vec<&String> = tags.iter().filter(|t| entry.matches(t)).collect();
        report.selected = selected.len();
        debug!(
            "{} of {} tags of {} match {:?}",
            selected.len(),
            tags.len(),
            repo,
            entry.tag_patterns
        );

        let cache = ManifestCache::new(self.client, self.source_host);
        for tag in selected {
            let already_resolved = store
                .state()
                .get(repo, tag)
                .is_some_and(|r| r.media_type.is_some());
            if already_resolved {
                report.cached += 1;
                continue;
            }

            store.state_mut().register(repo, tag);
            match cache.get_or_fetch(store, repo, tag).await {
                Ok(_) => report.resolved += 1,
                Err(MigrateError::UnrecognizedManifest { .. }) => report.unrecognized += 1,
                Err(e @ MigrateError::Discovery { .. }) => {
                    warn!("Skipping {}:{}: {}", repo, tag, e);
                    report.failed += 1;
                    // Keep the registration so the tag shows up as unresolved
                    store.save()?;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "Discovered {}: {} selected, {} new, {} cached, {} unrecognized, {} failed",
            repo,
            report.selected,
            report.resolved,
            report.cached,
            report.unrecognized,
            report.failed
        );
        Ok(report)
    }
}
