/// Manifest media types understood by the classifier
pub mod media_type {
    /// OCI image index
    pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";

    /// OCI image manifest
    pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";

    /// Docker manifest list
    pub const DOCKER_MANIFEST_LIST: &str =
        "application/vnd.docker.distribution.manifest.list.v2+json";

    /// Docker schema 2 image manifest
    pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
}

/// Annotations found on index entries
pub mod annotation {
    /// Marks an index entry that references non-runnable metadata
    pub const REFERENCE_TYPE: &str = "vnd.docker.reference.type";

    /// Value of [`REFERENCE_TYPE`] for attestation manifests
    pub const ATTESTATION_MANIFEST: &str = "attestation-manifest";
}

/// Defaults applied when the config leaves a field out
pub mod defaults {
    /// Pattern that selects every tag
    pub const TAG_PATTERN: &str = ".*";

    /// Config file name under the user config directory
    pub const CONFIG_FILE: &str = "config.toml";

    /// Directory name under the user config directory
    pub const CONFIG_DIR: &str = "regmigrate";

    /// Extension used when deriving the state file from the config path
    pub const STATE_EXTENSION: &str = "state.json";

    pub const RETRY_MAX_ATTEMPTS: u32 = 3;
    pub const RETRY_INITIAL_BACKOFF_MS: u64 = 1_000;
    pub const RETRY_BACKOFF_MULTIPLIER: u32 = 2;
    pub const RETRY_MAX_BACKOFF_MS: u64 = 30_000;
}
