use regex::RegexSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::defaults;
use crate::error::{MigrateError, Result};
use crate::registry::RetryPolicy;

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Registry host images are copied from
    pub source_host: String,

    /// User expected to be logged in to the source registry
    pub source_username: Option<String>,

    #[serde(default = "default_true")]
    pub source_tls_verify: bool,

    /// Registry host images are copied to
    pub target_host: String,

    /// User expected to be logged in to the target registry
    pub target_username: Option<String>,

    #[serde(default = "default_true")]
    pub target_tls_verify: bool,

    /// Where migration progress is persisted
    pub state_file: Option<PathBuf>,

    /// Compare manifest digests before accepting an existing target tag
    #[serde(default)]
    pub verify_target_digest: bool,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Source repository to migration rules
    #[serde(default)]
    pub migration_plan: BTreeMap<String, PlanRules>,
}

/// Rules for one source repository
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanRules {
    /// Repository name on the target; defaults to the source name
    pub target_repo: Option<String>,

    /// Regular expressions; a tag is selected if any of them matches.
    /// Left out, every tag is selected. An empty list is rejected.
    pub tag_patterns: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_true")]
    pub retry_rate_limited: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
            retry_rate_limited: true,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            backoff_multiplier: self.backoff_multiplier,
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            retry_rate_limited: self.retry_rate_limited,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    defaults::RETRY_MAX_ATTEMPTS
}

fn default_initial_backoff_ms() -> u64 {
    defaults::RETRY_INITIAL_BACKOFF_MS
}

fn default_backoff_multiplier() -> u32 {
    defaults::RETRY_BACKOFF_MULTIPLIER
}

fn default_max_backoff_ms() -> u64 {
    defaults::RETRY_MAX_BACKOFF_MS
}

/// One validated migration plan entry
#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub source_repo: String,
    pub target_repo: String,
    pub tag_patterns: Vec<String>,
    filter: RegexSet,
}

impl PlanEntry {
    pub fn new(source_repo: &str, target_repo: Option<&str>, patterns: &[&str]) -> Result<Self> {
        let patterns: Vec<String> = if patterns.is_empty() {
            vec![defaults::TAG_PATTERN.to_string()]
        } else {
            patterns.iter().map(|p| p.to_string()).collect()
        };
        let filter = RegexSet::new(&patterns).map_err(|e| {
            MigrateError::Configuration(format!(
                "invalid tag pattern for {}: {}",
                source_repo, e
            ))
        })?;

        Ok(Self {
            source_repo: source_repo.to_string(),
            target_repo: target_repo.unwrap_or(source_repo).to_string(),
            tag_patterns: patterns,
            filter,
        })
    }

    /// Whether `tag` matches at least one of the entry's patterns
    pub fn matches(&self, tag: &str) -> bool {
        self.filter.is_match(tag)
    }
}

impl Config {
    /// Default config location, `<config dir>/regmigrate/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(defaults::CONFIG_DIR).join(defaults::CONFIG_FILE))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MigrateError::Configuration(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
            .map_err(|e| MigrateError::Configuration(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, String> {
        let config: Config = toml::from_str(content).map_err(|e| e.to_string())?;
        config.validate().map_err(|e| match e {
            MigrateError::Configuration(msg) => msg,
            other => other.to_string(),
        })?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.source_host.trim().is_empty() {
            return Err(MigrateError::Configuration(
                "source_host must not be empty".to_string(),
            ));
        }
        if self.target_host.trim().is_empty() {
            return Err(MigrateError::Configuration(
                "target_host must not be empty".to_string(),
            ));
        }
        if self.migration_plan.is_empty() {
            return Err(MigrateError::Configuration(
                "migration_plan has no repositories".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(MigrateError::Configuration(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        for (repo, rules) in &self.migration_plan {
            validate_repository(repo)?;
            if let Some(target) = &rules.target_repo {
                validate_repository(target)?;
            }
            if rules.tag_patterns.as_ref().is_some_and(Vec::is_empty) {
                return Err(MigrateError::Configuration(format!(
                    "tag_patterns for {} is empty; omit it to select every tag",
                    repo
                )));
            }
        }
        self.plan().map(|_| ())
    }

    /// The migration plan as validated entries, in repository order
    pub fn plan(&self) -> Result<Vec<PlanEntry>> {
        self.migration_plan
            .iter()
            .map(|(repo, rules)| {
                let patterns: Vec<&str> = rules
                    .tag_patterns
                    .iter()
                    .flatten()
                    .map(String::as_str)
                    .collect();
                PlanEntry::new(repo, rules.target_repo.as_deref(), &patterns)
            })
            .collect()
    }

    /// Target repository for `source_repo`, falling back to the same name
    pub fn target_repo<'a>(&'a self, source_repo: &'a str) -> &'a str {
        self.migration_plan
            .get(source_repo)
            .and_then(|rules| rules.target_repo.as_deref())
            .unwrap_or(source_repo)
    }

    /// State file location: `state_file` if set, else next to the config file
    pub fn state_path(&self, config_path: &Path) -> PathBuf {
        match &self.state_file {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => config_path
                .parent()
                .map(|dir| dir.join(path))
                .unwrap_or_else(|| path.clone()),
            None => config_path.with_extension(defaults::STATE_EXTENSION),
        }
    }

    /// `(host, username)` pairs that must be logged in before a run
    pub fn required_logins(&self) -> Vec<(&str, &str)> {
        [
            (self.source_host.as_str(), self.source_username.as_deref()),
            (self.target_host.as_str(), self.target_username.as_deref()),
        ]
        .into_iter()
        .filter_map(|(host, user)| user.map(|u| (host, u)))
        .collect()
    }
}

fn validate_repository(name: &str) -> Result<()> {
    if name.is_empty() || name.contains([':', '@']) || name.chars().any(char::is_whitespace) {
        return Err(MigrateError::Configuration(format!(
            "invalid repository name {:?}",
            name
        )));
    }
    Ok(())
}
