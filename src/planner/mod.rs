//! Work planning over the migration state. Read-only.

use std::fmt;

use crate::manifest::ManifestKind;
use crate::state::{MigrationState, MigrationStatus};

/// One (repository, tag) that still needs to be migrated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub repo: String,
    pub tag: String,
    /// `os/architecture` pairs; empty for single-platform images
    pub platforms: Vec<String>,
}

impl WorkItem {
    pub fn is_multi_platform(&self) -> bool {
        !self.platforms.is_empty()
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repo, self.tag)?;
        if self.is_multi_platform() {
            write!(f, " [{}]", self.platforms.join(", "))?;
        }
        Ok(())
    }
}

/// Items whose status is not `complete` and whose manifest can be copied,
/// ordered by repository then tag.
pub fn remaining_work(state: &MigrationState) -> Vec<WorkItem> {
    state
        .iter()
        .filter(|(_, _, record)| !record.is_complete())
        .filter_map(|(repo, tag, record)| {
            let manifest = record.manifest()?;
            manifest.kind.is_copyable().then(|| WorkItem {
                repo: repo.to_string(),
                tag: tag.to_string(),
                platforms: manifest.platforms,
            })
        })
        .collect()
}

/// Counts over the whole state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateSummary {
    pub repositories: usize,
    pub tags: usize,
    pub complete: usize,
    /// Failed on a previous run, will be retried
    pub error: usize,
    /// Resolved and never attempted
    pub pending: usize,
    /// Registered but not yet inspected
    pub unresolved: usize,
    pub unrecognized: usize,
}

impl StateSummary {
    /// Items the next copy pass will work on
    pub fn remaining(&self) -> usize {
        self.pending + self.error
    }
}

pub fn summarize(state: &MigrationState) -> StateSummary {
    let mut summary = StateSummary {
        repositories: state.repository_count(),
        ..Default::default()
    };

    for (_, _, record) in state.iter() {
        summary.tags += 1;
        let kind = record.manifest().map(|m| m.kind);
        match (record.status, kind) {
            (Some(MigrationStatus::Complete), _) => summary.complete += 1,
            (_, None) => summary.unresolved += 1,
            (_, Some(ManifestKind::Unrecognized)) => summary.unrecognized += 1,
            (Some(MigrationStatus::Error), Some(_)) => summary.error += 1,
            (None, Some(_)) => summary.pending += 1,
        }
    }

    summary
}

impl fmt::Display for StateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "repositories: {}", self.repositories)?;
        writeln!(f, "tags: {}", self.tags)?;
        writeln!(f, "complete: {}", self.complete)?;
        writeln!(f, "pending: {}", self.pending)?;
        writeln!(f, "error: {}", self.error)?;
        writeln!(f, "unresolved: {}", self.unresolved)?;
        write!(f, "unrecognized: {}", self.unrecognized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::media_type;
    use crate::manifest::Classification;

    fn resolved(state: &mut MigrationState, repo: &str, tag: &str, platforms: &[&str]) {
        let classification = if platforms.is_empty() {
            Classification {
                media_type: media_type::DOCKER_MANIFEST.to_string(),
                kind: ManifestKind::SinglePlatform,
                platforms: vec![],
            }
        } else {
            Classification {
                media_type: media_type::OCI_INDEX.to_string(),
                kind: ManifestKind::MultiPlatform,
                platforms: platforms.iter().map(|p| p.to_string()).collect(),
            }
        };
        state.record_manifest(repo, tag, &classification);
    }

    fn sample_state() -> MigrationState {
        let mut state = MigrationState::new();
        resolved(&mut state, "org/app", "v1", &["linux/amd64", "linux/arm64"]);
        resolved(&mut state, "org/app", "v2", &[]);
        resolved(&mut state, "org/app", "v3", &[]);
        resolved(&mut state, "org/db", "15", &[]);
        state.set_status("org/app", "v1", MigrationStatus::Complete);
        state.set_status("org/app", "v3", MigrationStatus::Error);

        state.register("org/app", "unresolved");
        state.record_manifest(
            "org/app",
            "legacy",
            &Classification {
                media_type: "application/vnd.docker.distribution.manifest.v1+prettyjws"
                    .to_string(),
                kind: ManifestKind::Unrecognized,
                platforms: vec![],
            },
        );
        state
    }

    #[test]
    fn test_remaining_work() {
        let items = remaining_work(&sample_state());
        let names: Vec<String> = items.iter().map(|i| format!("{}:{}", i.repo, i.tag)).collect();
        assert_eq!(names, vec!["org/app:v2", "org/app:v3", "org/db:15"]);
    }

    #[test]
    fn test_error_items_are_retried() {
        let mut state = MigrationState::new();
        resolved(&mut state, "org/app", "v1", &["linux/amd64"]);
        state.set_status("org/app", "v1", MigrationStatus::Error);

        let items = remaining_work(&state);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].platforms, vec!["linux/amd64"]);
        assert!(items[0].is_multi_platform());
    }

    #[test]
    fn test_remaining_work_is_pure_and_deterministic() {
        let state = sample_state();
        let before = state.clone();
        assert_eq!(remaining_work(&state), remaining_work(&state));
        assert_eq!(state, before);
    }

    #[test]
    fn test_summary() {
        let summary = summarize(&sample_state());
        assert_eq!(
            summary,
            StateSummary {
                repositories: 2,
                tags: 6,
                complete: 1,
                error: 1,
                pending: 2,
                unresolved: 1,
                unrecognized: 1,
            }
        );
        assert_eq!(summary.remaining(), 3);
        assert!(summary.to_string().contains("complete: 1"));
    }

    #[test]
    fn test_work_item_display() {
        let item = WorkItem {
            repo: "org/app".to_string(),
            tag: "v1".to_string(),
            platforms: vec!["linux/amd64".to_string(), "linux/arm64".to_string()],
        };
        assert_eq!(item.to_string(), "org/app:v1 [linux/amd64, linux/arm64]");

        let item = WorkItem {
            platforms: vec![],
            ..item
        };
        assert_eq!(item.to_string(), "org/app:v1");
    }
}
