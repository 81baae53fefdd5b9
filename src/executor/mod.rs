//! Copy execution: migrates planned work items one at a time and records
//! each outcome in the state store.

use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{MigrateError, Result};
use crate::planner::WorkItem;
use crate::registry::{CopyOptions, ImageRef, RegistryClient, RegistryError};
use crate::state::{MigrationStatus, StateStore};


/// Counts from one execution pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Copy calls issued
    pub attempted: usize,
    pub copied: usize,
    /// Items found at the target and marked complete without copying
    pub already_present: usize,
    pub failed: usize,
    /// Dry run only: items that would have been copied
    pub would_copy: usize,
}

enum TargetState {
    Present,
    Missing,
    /// Present, but its manifest digest differs from the source
    Differs { source: String, target: String },
}

/// A failed inspect while checking the target, and which side it hit
struct InspectFailure {
    side: &'static str,
    image: ImageRef,
    error: RegistryError,
}

impl InspectFailure {
    fn new(side: &'static str, image: &ImageRef, error: RegistryError) -> Self {
        Self {
            side,
            image: image.clone(),
            error,
        }
    }
}

pub struct CopyExecutor<'a, C> {
    client: &'a C,
    config: &'a Config,
}

impl<'a, C: RegistryClient> CopyExecutor<'a, C> {
    pub fn new(client: &'a C, config: &'a Config) -> Self {
        Self { client, config }
    }

    pub fn source_ref(&self, item: &WorkItem) -> ImageRef {
        ImageRef::new(&self.config.source_host, &item.repo, &item.tag)
    }

    pub fn target_ref(&self, item: &WorkItem) -> ImageRef {
        ImageRef::new(
            &self.config.target_host,
            self.config.target_repo(&item.repo),
            &item.tag,
        )
    }

    /// Process `items` in order. Per-item failures are recorded as status
    /// `error` and never stop the batch; only state file errors are returned.
    ///
    /// With `dry_run`, nothing is copied and the state is not modified.
    pub async fn execute(
        &self,
        items: &[WorkItem],
        store: &mut StateStore,
        dry_run: bool,
    ) -> Result<ExecutionReport> {
        let mut report = ExecutionReport::default();

        for (i, item) in items.iter().enumerate() {
            let source = self.source_ref(item);
            let target = self.target_ref(item);
            debug!("[{}/{}] {} -> {}", i + 1, items.len(), source, target);

            let status = match self.target_state(&source, &target).await {
                Ok(TargetState::Present) => {
                    info!("{} already exists, marking complete", target);
                    report.already_present += 1;
                    MigrationStatus::Complete
                }
                Ok(TargetState::Missing) => {
                    match self.copy(item, &source, &target, dry_run, &mut report).await {
                        Some(status) => status,
                        None => continue,
                    }
                }
                Ok(TargetState::Differs { source: s, target: t }) => {
                    warn!(
                        "{} exists with digest {} but source has {}, copying over it",
                        target, t, s
                    );
                    match self.copy(item, &source, &target, dry_run, &mut report).await {
                        Some(status) => status,
                        None => continue,
                    }
                }
                Err(e) => {
                    error!(
                        "Could not inspect {} {} for {}:{}: {}",
                        e.side, e.image, item.repo, item.tag, e.error
                    );
                    report.failed += 1;
                    MigrationStatus::Error
                }
            };

            if dry_run {
                continue;
            }
            store
                .state_mut()
                .set_status(&item.repo, &item.tag, status);
            store.save()?;
        }

        info!(
            "Copied {}, already present {}, failed {}{}",
            report.copied,
            report.already_present,
            report.failed,
            if dry_run {
                format!(", would copy {}", report.would_copy)
            } else {
                String::new()
            }
        );
        Ok(report)
    }

    async fn target_state(
        &self,
        source: &ImageRef,
        target: &ImageRef,
    ) -> std::result::Result<TargetState, InspectFailure> {
        let existing = match self.client.inspect(target).await {
            Ok(manifest) => manifest,
            Err(e) if e.is_not_found() => return Ok(TargetState::Missing),
            Err(e) => return Err(InspectFailure::new("target", target, e)),
        };

        if !self.config.verify_target_digest {
            return Ok(TargetState::Present);
        }

        let expected = self
            .client
            .inspect(source)
            .await
            .map_err(|e| InspectFailure::new("source", source, e))?;
        let (source_digest, target_digest) = (expected.digest(), existing.digest());
        if source_digest == target_digest {
            Ok(TargetState::Present)
        } else {
            Ok(TargetState::Differs {
                source: source_digest,
                target: target_digest,
            })
        }
    }

    /// Copy one item. Returns the status to record, or `None` in dry-run mode.
    async fn copy(
        &self,
        item: &WorkItem,
        source: &ImageRef,
        target: &ImageRef,
        dry_run: bool,
        report: &mut ExecutionReport,
    ) -> Option<MigrationStatus> {
        let options = CopyOptions::for_platforms(&item.platforms);

        if dry_run {
            if item.is_multi_platform() {
                info!(
                    "[dry-run] Would copy {} -> {} ({})",
                    source,
                    target,
                    item.platforms.join(", ")
                );
            } else {
                info!("[dry-run] Would copy {} -> {}", source, target);
            }
            report.would_copy += 1;
            return None;
        }

        info!("Copying {} -> {}", source, target);
        report.attempted += 1;
        match self.client.copy(source, target, options).await {
            Ok(()) => {
                report.copied += 1;
                Some(MigrationStatus::Complete)
            }
            Err(e) => {
                let err = MigrateError::Copy {
                    repo: item.repo.clone(),
                    tag: item.tag.clone(),
                    source: e,
                };
                error!("{}", err);
                report.failed += 1;
                Some(MigrationStatus::Error)
            }
        }
    }
}
