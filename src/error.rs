//! Error taxonomy for a migration run.
//!
//! Per-item errors ([`MigrateError::Discovery`], [`MigrateError::Copy`]) are
//! logged and recorded by the caller; the rest abort the run.

use std::path::PathBuf;
use thiserror::Error;

use crate::registry::RegistryError;

pub type Result<T> = std::result::Result<T, MigrateError>;

#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Discovery failed for {repo}{}: {source}", tag_suffix(.tag))]
    Discovery {
        repo: String,
        tag: Option<String>,
        #[source]
        source: RegistryError,
    },

    #[error("Unrecognized manifest media type {media_type:?} for {repo}:{tag}")]
    UnrecognizedManifest {
        repo: String,
        tag: String,
        media_type: String,
    },

    #[error("Copy failed for {repo}:{tag}: {source}")]
    Copy {
        repo: String,
        tag: String,
        #[source]
        source: RegistryError,
    },

    #[error("State file {} is corrupt: {reason}", .path.display())]
    StateCorruption { path: PathBuf, reason: String },

    #[error("State file {} could not be accessed: {source}", .path.display())]
    State {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MigrateError {
    /// Whether this error must stop the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MigrateError::Configuration(_)
                | MigrateError::StateCorruption { .. }
                | MigrateError::State { .. }
        )
    }
}

fn tag_suffix(tag: &Option<String>) -> String {
    tag.as_ref().map(|t| format!(":{}", t)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(MigrateError::Configuration("x".to_string()).is_fatal());
        assert!(MigrateError::StateCorruption {
            path: PathBuf::from("s.json"),
            reason: "bad".to_string(),
        }
        .is_fatal());

        let copy = MigrateError::Copy {
            repo: "org/app".to_string(),
            tag: "v1".to_string(),
            source: RegistryError::Unavailable("boom".to_string()),
        };
        assert!(!copy.is_fatal());
    }

    #[test]
    fn test_discovery_message_includes_tag() {
        let err = MigrateError::Discovery {
            repo: "org/app".to_string(),
            tag: Some("v1".to_string()),
            source: RegistryError::RateLimited("slow down".to_string()),
        };
        assert!(err.to_string().contains("org/app:v1"));

        let err = MigrateError::Discovery {
            repo: "org/app".to_string(),
            tag: None,
            source: RegistryError::NotFound("gone".to_string()),
        };
        assert!(err.to_string().starts_with("Discovery failed for org/app: "));
    }
}
