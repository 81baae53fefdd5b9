//! Migration service
//!
//! Runs discovery for every plan entry, plans the remaining work from the
//! state, then hands it to the copy executor.

use tracing::{error, info};

use crate::config::Config;
use crate::discovery::{DiscoveryReport, TagDiscoverer};
use crate::error::Result;
use crate::executor::{CopyExecutor, ExecutionReport};
use crate::planner::{remaining_work, summarize, StateSummary, WorkItem};
use crate::registry::RegistryClient;
use crate::service::preflight::LoginCheck;
use crate::state::StateStore;

/// Outcome of a full run
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    pub discovery: Vec<DiscoveryReport>,
    /// Plan entries whose tags could not be listed
    pub discovery_failures: usize,
    /// State summary taken after discovery, before any copy
    pub summary: StateSummary,
    pub execution: ExecutionReport,
}

pub struct MigrationService<'a, C> {
    config: &'a Config,
    client: &'a C,
}

impl<'a, C: RegistryClient> MigrationService<'a, C> {
    pub fn new(config: &'a Config, client: &'a C) -> Self {
        Self { config, client }
    }

    pub async fn preflight(&self) -> Result<()> {
        LoginCheck::verify(self.config, self.client).await
    }

    /// Discover every plan entry. Entries that fail are logged and skipped.
    pub async fn discover(&self, store: &mut StateStore) -> Result<(Vec<DiscoveryReport>, usize)> {
        let discoverer = TagDiscoverer::new(self.client, &self.config.source_host);
        let mut reports = Vec::new();
        let mut failures = 0;

        for entry in self.config.plan()? {
            match discoverer.discover(&entry, store).await {
                Ok(report) => reports.push(report),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!("{}", e);
                    failures += 1;
                }
            }
        }

        Ok((reports, failures))
    }

    /// Discover, then report the work left without copying anything
    pub async fn plan(&self, store: &mut StateStore) -> Result<Vec<WorkItem>> {
        self.preflight().await?;
        self.discover(store).await?;
        Ok(remaining_work(store.state()))
    }

    pub async fn run(&self, store: &mut StateStore, dry_run: bool) -> Result<MigrationReport> {
        self.preflight().await?;

        let (discovery, discovery_failures) = self.discover(store).await?;
        let summary = summarize(store.state());
        let items = remaining_work(store.state());

        info!(
            "{} item(s) to migrate ({} new, {} retrying); {} complete, {} unrecognized, {} unresolved",
            items.len(),
            summary.pending,
            summary.error,
            summary.complete,
            summary.unrecognized,
            summary.unresolved
        );
        if dry_run {
            info!("Dry run: no images will be copied and no status will be recorded");
        }

        let execution = CopyExecutor::new(self.client, self.config)
            .execute(&items, store, dry_run)
            .await?;

        Ok(MigrationReport {
            discovery,
            discovery_failures,
            summary,
            execution,
        })
    }
}
