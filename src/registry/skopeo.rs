use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, warn};

use super::{CopyOptions, ImageRef, MultiArch, RawManifest, RegistryClient, RegistryError};

/// Registry client that drives the `skopeo` CLI
pub struct SkopeoClient {
    binary: PathBuf,
    /// Hosts with TLS verification turned off
    insecure_hosts: HashMap<String, bool>,
}

#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(rename = "Tags", default)]
    tags: Option<Vec<String>>,
}

impl SkopeoClient {
    pub fn new() -> Result<Self, RegistryError> {
        let binary = which::which("skopeo").map_err(|_| RegistryError::ToolMissing)?;
        debug!("Using skopeo at {}", binary.display());
        Ok(Self::with_binary(binary))
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            insecure_hosts: HashMap::new(),
        }
    }

    /// Turn TLS verification on or off for `host`. When a host is configured
    /// more than once, disabling verification for any of them wins.
    pub fn with_tls_verify(mut self, host: &str, verify: bool) -> Self {
        let insecure = self.insecure_hosts.entry(host.to_string()).or_insert(!verify);
        if *insecure != !verify {
            warn!(
                "Conflicting TLS verification settings for {}, disabling verification",
                host
            );
            *insecure = true;
        }
        self
    }

    pub(super) fn is_insecure(&self, host: &str) -> bool {
        self.insecure_hosts.get(host).copied().unwrap_or(false)
    }

    async fn output(&self, args: &[String]) -> Result<Output, RegistryError> {
        debug!("Running command: {} {}", self.binary.display(), args.join(" "));
        Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RegistryError::Unavailable(format!("failed to run skopeo: {}", e)))
    }

    async fn run(&self, args: &[String]) -> Result<String, RegistryError> {
        let output = self.output(args).await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("skopeo stderr:\n{}", stderr);
            Err(classify_failure(&stderr))
        }
    }
}

fn transport(reference: &str) -> String {
    format!("docker://{}", reference)
}

#[async_trait]
impl RegistryClient for SkopeoClient {
    async fn list_tags(&self, host: &str, repository: &str) -> Result<Vec<String>, RegistryError> {
        let mut args = vec!["list-tags".to_string()];
        if self.is_insecure(host) {
            args.push("--tls-verify=false".to_string());
        }
        args.push(transport(&super::repository_path(host, repository)));

        let stdout = self.run(&args).await?;
        parse_tag_list(&stdout)
    }

    async fn inspect(&self, image: &ImageRef) -> Result<RawManifest, RegistryError> {
        let mut args = vec!["inspect".to_string(), "--raw".to_string()];
        if self.is_insecure(&image.host) {
            args.push("--tls-verify=false".to_string());
        }
        args.push(transport(&image.to_string()));

        let document = self.run(&args).await?;
        Ok(RawManifest::new(None, document))
    }

    async fn copy(
        &self,
        source: &ImageRef,
        target: &ImageRef,
        options: CopyOptions,
    ) -> Result<(), RegistryError> {
        let args = copy_args(
            source,
            target,
            options,
            self.is_insecure(&source.host),
            self.is_insecure(&target.host),
        );
        self.run(&args).await.map(|_| ())
    }

    async fn login_user(&self, host: &str) -> Result<Option<String>, RegistryError> {
        let mut args = vec!["login".to_string(), "--get-login".to_string()];
        if self.is_insecure(host) {
            args.push("--tls-verify=false".to_string());
        }
        args.push(host.to_string());

        let output = self.output(&args).await?;
        if output.status.success() {
            let user = String::from_utf8_lossy(&output.stdout).trim().to_string();
            return Ok((!user.is_empty()).then_some(user));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.to_lowercase().contains("not logged in") {
            Ok(None)
        } else {
            Err(classify_failure(&stderr))
        }
    }
}

pub(super) fn copy_args(
    source: &ImageRef,
    target: &ImageRef,
    options: CopyOptions,
    insecure_source: bool,
    insecure_target: bool,
) -> Vec<String> {
    let mut args = vec!["copy".to_string()];
    if options.preserve_digests {
        args.push("--preserve-digests".to_string());
    }
    if options.multi_arch == MultiArch::All {
        args.push("--multi-arch".to_string());
        args.push("all".to_string());
    }
    if insecure_source {
        args.push("--src-tls-verify=false".to_string());
    }
    if insecure_target {
        args.push("--dest-tls-verify=false".to_string());
    }
    args.push(transport(&source.to_string()));
    args.push(transport(&target.to_string()));
    args
}

pub(super) fn parse_tag_list(stdout: &str) -> Result<Vec<String>, RegistryError> {
    let list: TagList = serde_json::from_str(stdout)
        .map_err(|e| RegistryError::Unavailable(format!("unparseable tag list: {}", e)))?;
    Ok(list.tags.unwrap_or_default())
}

/// Throttling phrases. A bare `429` is not enough: tags, repositories and
/// ports in the same message can contain it.
const RATE_LIMIT_MARKERS: &[&str] = &[
    "toomanyrequests",
    "too many requests",
    "rate limit",
    "status: 429",
    "status 429",
    "status code 429",
];

/// Map skopeo's stderr onto the registry error kinds
pub(super) fn classify_failure(stderr: &str) -> RegistryError {
    let message = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("skopeo failed without output")
        .to_string();
    let lower = stderr.to_lowercase();

    if RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m)) {
        RegistryError::RateLimited(message)
    } else if lower.contains("manifest unknown")
        || lower.contains("name unknown")
        || lower.contains("not found")
        || lower.contains("does not exist")
    {
        RegistryError::NotFound(message)
    } else {
        RegistryError::Unavailable(message)
    }
}
