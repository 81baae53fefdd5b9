#[cfg(test)]
mod tests {
    use super::super::*;

    const SAMPLE: &str = r#"
source_host = "registry-1.docker.io"
source_username = "mirror-bot"
target_host = "ghcr.io"

[retry]
max_attempts = 5

[migration_plan."library/nginx"]
target_repo = "mirror/nginx"
tag_patterns = ["^1\\.25", "^stable$"]

[migration_plan."library/alpine"]
"#;

    #[test]
    fn test_parse_sample_config() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.source_host, "registry-1.docker.io");
        assert_eq!(config.source_username.as_deref(), Some("mirror-bot"));
        assert!(config.target_username.is_none());
        assert!(config.source_tls_verify);
        assert!(!config.verify_target_digest);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_backoff_ms, 1_000);
        assert!(config.retry.retry_rate_limited);
    }

    #[test]
    fn test_plan_entries_and_defaults() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let plan = config.plan().unwrap();
        assert_eq!(plan.len(), 2);

        // BTreeMap order: alpine before nginx
        assert_eq!(plan[0].source_repo, "library/alpine");
        assert_eq!(plan[0].target_repo, "library/alpine");
        assert_eq!(plan[0].tag_patterns, vec![".*"]);
        assert!(plan[0].matches("anything"));

        assert_eq!(plan[1].target_repo, "mirror/nginx");
        assert!(plan[1].matches("1.25.3"));
        assert!(plan[1].matches("stable"));
        assert!(!plan[1].matches("stable-alpine"));
        assert!(!plan[1].matches("1.24"));
    }

    #[test]
    fn test_target_repo_resolution() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.target_repo("library/nginx"), "mirror/nginx");
        assert_eq!(config.target_repo("library/alpine"), "library/alpine");
        assert_eq!(config.target_repo("gone/repo"), "gone/repo");
    }

    #[test]
    fn test_required_logins() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(
            config.required_logins(),
            vec![("registry-1.docker.io", "mirror-bot")]
        );
    }

    #[test]
    fn test_state_path() {
        let mut config = Config::from_toml(SAMPLE).unwrap();
        let config_path = PathBuf::from("/etc/regmigrate/prod.toml");
        assert_eq!(
            config.state_path(&config_path),
            PathBuf::from("/etc/regmigrate/prod.state.json")
        );

        config.state_file = Some(PathBuf::from("progress.json"));
        assert_eq!(
            config.state_path(&config_path),
            PathBuf::from("/etc/regmigrate/progress.json")
        );

        config.state_file = Some(PathBuf::from("/var/lib/regmigrate/state.json"));
        assert_eq!(
            config.state_path(&config_path),
            PathBuf::from("/var/lib/regmigrate/state.json")
        );
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let policy = config.retry.policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_backoff, Duration::from_secs(1));
        assert_eq!(policy.max_backoff, Duration::from_secs(30));
    }

    #[test]
    fn test_rejects_missing_host() {
        let err = Config::from_toml(
            r#"
source_host = ""
target_host = "ghcr.io"
[migration_plan."a/b"]
"#,
        )
        .unwrap_err();
        assert!(err.contains("source_host"));

        assert!(Config::from_toml("target_host = \"ghcr.io\"").is_err());
    }

    #[test]
    fn test_rejects_empty_plan() {
        let err = Config::from_toml(
            r#"
source_host = "a.io"
target_host = "b.io"
"#,
        )
        .unwrap_err();
        assert!(err.contains("migration_plan"));
    }

    #[test]
    fn test_rejects_explicitly_empty_patterns() {
        let err = Config::from_toml(
            r#"
source_host = "a.io"
target_host = "b.io"
[migration_plan."org/app"]
tag_patterns = []
"#,
        )
        .unwrap_err();
        assert!(err.contains("tag_patterns for org/app is empty"));
    }

    #[test]
    fn test_rejects_bad_pattern() {
        let err = Config::from_toml(
            r#"
source_host = "a.io"
target_host = "b.io"
[migration_plan."org/app"]
tag_patterns = ["v1.(", "ok"]
"#,
        )
        .unwrap_err();
        assert!(err.contains("invalid tag pattern for org/app"));
    }

    #[test]
    fn test_rejects_bad_repository_names() {
        for name in ["org/app:v1", "org/app@sha256", "org app"] {
            let toml = format!(
                "source_host = \"a.io\"\ntarget_host = \"b.io\"\n[migration_plan.\"{}\"]\n",
                name
            );
            assert!(Config::from_toml(&toml).is_err(), "{} should be rejected", name);
        }
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let err = Config::from_toml(
            r#"
source_host = "a.io"
target_host = "b.io"
[retry]
max_attempts = 0
[migration_plan."org/app"]
"#,
        )
        .unwrap_err();
        assert!(err.contains("max_attempts"));
    }

    #[test]
    fn test_load_missing_file_is_configuration_error() {
        let err = Config::load(Path::new("/nonexistent/regmigrate.toml")).unwrap_err();
        assert!(matches!(err, MigrateError::Configuration(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("migrate.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.migration_plan.len(), 2);
    }
}
