//! Storage backends and the factory that constructs them by kind.

mod backend;
mod config;
mod local;
mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use crate::{Error, Result};

pub use backend::{
    Archiver, ListOptions, ListResult, Metadata, ObjectInfo, ObjectStorage, DEFAULT_MAX_RESULTS,
};
pub use config::BackendConfig;
pub use local::LocalBackend;
pub use memory::MemoryBackend;

/// Backend kinds that only make sense as archive destinations. The factory
/// refuses to build them as primary storage.
pub const ARCHIVE_ONLY_KINDS: &[&str] = &["glacier", "azurearchive"];

/// Constructs and configures a storage backend by kind name.
///
/// Known kinds are `"memory"` and `"local"`. Archive-only kinds are rejected
/// with [`Error::ArchiveOnlyBackend`]; anything else with
/// [`Error::UnknownBackend`].
pub fn new_storage(
    kind: &str,
    settings: &HashMap<String, String>,
) -> Result<Arc<dyn ObjectStorage>> {
    if ARCHIVE_ONLY_KINDS.contains(&kind) {
        return Err(Error::ArchiveOnlyBackend(kind.to_string()));
    }

    let storage: Arc<dyn ObjectStorage> = match kind {
        "memory" => Arc::new(MemoryBackend::new()),
        "local" => Arc::new(LocalBackend::new()),
        other => return Err(Error::UnknownBackend(other.to_string())),
    };
    storage.configure(settings)?;
    Ok(storage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_factory_builds_memory() {
        let storage = new_storage("memory", &HashMap::new()).unwrap();
        storage
            .put("key", bytes::Bytes::from("value"))
            .await
            .unwrap();
        assert_eq!(storage.get("key").await.unwrap(), "value");
    }

    #[tokio::test]
    async fn test_factory_builds_configured_local() {
        let dir = TempDir::new().unwrap();
        let mut settings = HashMap::new();
        settings.insert(
            "path".to_string(),
            dir.path().to_string_lossy().into_owned(),
        );

        let storage = new_storage("local", &settings).unwrap();
        storage
            .put("key", bytes::Bytes::from("value"))
            .await
            .unwrap();
        assert!(dir.path().join("key").is_file());
    }

    #[test]
    fn test_factory_rejects_archive_only_kinds() {
        for kind in ARCHIVE_ONLY_KINDS {
            let err = new_storage(kind, &HashMap::new()).unwrap_err();
            assert!(matches!(err, Error::ArchiveOnlyBackend(_)), "{kind}");
        }
    }

    #[test]
    fn test_factory_rejects_unknown_kind() {
        let err = new_storage("s4", &HashMap::new()).unwrap_err();
        assert!(matches!(err, Error::UnknownBackend(_)));
    }

    #[test]
    fn test_factory_propagates_configure_errors() {
        // local requires a path setting
        let err = new_storage("local", &HashMap::new()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
