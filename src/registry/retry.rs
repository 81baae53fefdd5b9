//! Retry with exponential backoff around a [`RegistryClient`]

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::{CopyOptions, ImageRef, RawManifest, RegistryClient, RegistryError};
use crate::constants::defaults;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: u32,
    pub max_backoff: Duration,
    /// Whether throttling responses are retried or surfaced immediately
    pub retry_rate_limited: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::RETRY_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(defaults::RETRY_INITIAL_BACKOFF_MS),
            backoff_multiplier: defaults::RETRY_BACKOFF_MULTIPLIER,
            max_backoff: Duration::from_millis(defaults::RETRY_MAX_BACKOFF_MS),
            retry_rate_limited: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that retries up to `max_attempts` times without sleeping
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn should_retry(&self, error: &RegistryError) -> bool {
        match error {
            RegistryError::Unavailable(_) => true,
            RegistryError::RateLimited(_) => self.retry_rate_limited,
            RegistryError::NotFound(_) | RegistryError::ToolMissing => false,
        }
    }

    /// Delay before the retry that follows failed attempt number `attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_multiplier
            .saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T, RegistryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RegistryError>>,
    {
        let mut attempt = 1;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && self.should_retry(&e) => {
                    let delay = self.backoff(attempt);
                    warn!(
                        "{} failed (attempt {} of {}): {}. Retrying in {:?}",
                        operation, attempt, self.max_attempts, e, delay
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Applies a [`RetryPolicy`] to every call of the wrapped client
pub struct Retrying<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C> Retrying<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<C: RegistryClient> RegistryClient for Retrying<C> {
    async fn list_tags(&self, host: &str, repository: &str) -> Result<Vec<String>, RegistryError> {
        let operation = format!("list-tags {}/{}", host, repository);
        self.policy
            .run(&operation, || self.inner.list_tags(host, repository))
            .await
    }

    async fn inspect(&self, image: &ImageRef) -> Result<RawManifest, RegistryError> {
        let operation = format!("inspect {}", image);
        self.policy
            .run(&operation, || self.inner.inspect(image))
            .await
    }

    async fn copy(
        &self,
        source: &ImageRef,
        target: &ImageRef,
        options: CopyOptions,
    ) -> Result<(), RegistryError> {
        let operation = format!("copy {} -> {}", source, target);
        self.policy
            .run(&operation, || self.inner.copy(source, target, options))
            .await
    }

    async fn login_user(&self, host: &str) -> Result<Option<String>, RegistryError> {
        let operation = format!("login check {}", host);
        self.policy
            .run(&operation, || self.inner.login_user(host))
            .await
    }
}
