//! Preflight credential check
//!
//! The tool never logs in itself. When the config names a user for a
//! registry, that user must already be logged in before any registry work.

use tracing::{debug, info};

use crate::config::Config;
use crate::error::{MigrateError, Result};
use crate::registry::RegistryClient;

pub struct LoginCheck;

impl LoginCheck {
    pub async fn verify<C: RegistryClient>(config: &Config, client: &C) -> Result<()> {
        for (host, expected) in config.required_logins() {
            debug!("Checking login for {}", host);
            let current = client.login_user(host).await.map_err(|e| {
                MigrateError::Configuration(format!("could not check login for {}: {}", host, e))
            })?;

            match current {
                Some(user) if user == expected => info!("Logged in to {} as {}", host, user),
                Some(user) => {
                    return Err(MigrateError::Configuration(format!(
                        "logged in to {} as {}, but the config expects {}",
                        host, user, expected
                    )))
                }
                None => {
                    return Err(MigrateError::Configuration(format!(
                        "not logged in to {}; run `skopeo login --username {} {}` first",
                        host, expected, host
                    )))
                }
            }
        }
        Ok(())
    }
}
