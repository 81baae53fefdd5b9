#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::registry::memory::{docker_image, oci_index, schema1_manifest, Operation};
    use crate::registry::{MemoryRegistry, RawManifest, RegistryError};
    use crate::state::StateStore;

    const SOURCE: &str = "source.example.com";

    fn store() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path().join("state.json")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_fetch_then_hit() {
        let (_dir, mut store) = store();
        let registry = MemoryRegistry::new().with_image(
            ImageRef::new(SOURCE, "org/app", "v1"),
            oci_index(&["linux/amd64", "linux/arm64"]),
        );
        let cache = ManifestCache::new(&registry, SOURCE);

        let record = cache.get_or_fetch(&mut store, "org/app", "v1").await.unwrap();
        assert_eq!(record.kind, ManifestKind::MultiPlatform);
        assert_eq!(record.platforms, vec!["linux/amd64", "linux/arm64"]);
        assert_eq!(registry.inspect_count(), 1);

        let again = cache.get_or_fetch(&mut store, "org/app", "v1").await.unwrap();
        assert_eq!(again, record);
        assert_eq!(registry.inspect_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_persists_before_returning() {
        let (_dir, mut store) = store();
        let registry = MemoryRegistry::new()
            .with_image(ImageRef::new(SOURCE, "org/app", "v1"), docker_image("sha256:c"));
        let cache = ManifestCache::new(&registry, SOURCE);

        cache.get_or_fetch(&mut store, "org/app", "v1").await.unwrap();

        let reopened = StateStore::open(store.path()).unwrap();
        let manifest = reopened.state().get("org/app", "v1").unwrap().manifest().unwrap();
        assert_eq!(manifest.kind, ManifestKind::SinglePlatform);
        assert!(manifest.platforms.is_empty());
    }

    #[tokio::test]
    async fn test_unrecognized_is_cached_and_reported() {
        let (_dir, mut store) = store();
        let registry = MemoryRegistry::new()
            .with_image(ImageRef::new(SOURCE, "org/app", "old"), schema1_manifest());
        let cache = ManifestCache::new(&registry, SOURCE);

        for _ in 0..2 {
            let err = cache
                .get_or_fetch(&mut store, "org/app", "old")
                .await
                .unwrap_err();
            assert!(matches!(err, MigrateError::UnrecognizedManifest { .. }));
            assert!(!err.is_fatal());
        }
        assert_eq!(registry.inspect_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_document_is_unrecognized() {
        let (_dir, mut store) = store();
        let registry = MemoryRegistry::new().with_image(
            ImageRef::new(SOURCE, "org/app", "weird"),
            RawManifest::new(None, "<html>".to_string()),
        );
        let cache = ManifestCache::new(&registry, SOURCE);

        let err = cache
            .get_or_fetch(&mut store, "org/app", "weird")
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::UnrecognizedManifest { .. }));
        assert!(store.state().get("org/app", "weird").unwrap().media_type.is_some());
    }

    #[tokio::test]
    async fn test_invalid_document_with_known_declared_type_is_never_planned() {
        let (_dir, mut store) = store();
        let registry = MemoryRegistry::new().with_image(
            ImageRef::new(SOURCE, "org/app", "weird"),
            RawManifest::new(
                Some(crate::constants::media_type::OCI_INDEX.to_string()),
                "<html>".to_string(),
            ),
        );
        let cache = ManifestCache::new(&registry, SOURCE);

        let err = cache
            .get_or_fetch(&mut store, "org/app", "weird")
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::UnrecognizedManifest { .. }));

        let manifest = store.state().get("org/app", "weird").unwrap().manifest().unwrap();
        assert_eq!(manifest.kind, ManifestKind::Unrecognized);
        assert!(crate::planner::remaining_work(store.state()).is_empty());

        let reopened = StateStore::open(store.path()).unwrap();
        assert!(crate::planner::remaining_work(reopened.state()).is_empty());
        assert_eq!(crate::planner::summarize(reopened.state()).unrecognized, 1);
    }

    #[tokio::test]
    async fn test_inspect_failure_is_discovery_error_and_not_cached() {
        let (_dir, mut store) = store();
        let image = ImageRef::new(SOURCE, "org/app", "v1");
        let registry = MemoryRegistry::new().with_image(image.clone(), docker_image("sha256:c"));
        registry.fail(
            Operation::Inspect,
            image.to_string(),
            1,
            RegistryError::Unavailable("503".to_string()),
        );
        let cache = ManifestCache::new(&registry, SOURCE);

        let err = cache.get_or_fetch(&mut store, "org/app", "v1").await.unwrap_err();
        assert!(matches!(err, MigrateError::Discovery { .. }));
        assert!(store.state().get("org/app", "v1").is_none());

        // The next call goes back to the registry
        cache.get_or_fetch(&mut store, "org/app", "v1").await.unwrap();
        assert_eq!(registry.inspect_count(), 2);
    }
}
