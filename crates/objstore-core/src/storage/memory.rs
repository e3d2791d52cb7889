//! In-memory storage backend.
//!
//! The reference implementation of the storage contract and the baseline
//! other backends are tested against. All state lives in a single map behind
//! a read-write lock; payloads are [`Bytes`], so values handed out by `get`
//! share the stored buffer without ever being able to mutate it.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::lifecycle::{LifecycleEngine, LifecycleManager, LifecyclePolicy, PassSummary};
use crate::validation::{sanitize_for_log, validate_key, validate_metadata, validate_prefix};
use crate::{Error, Result};

use super::backend::{
    check_cancelled, paginate, Archiver, ListOptions, ListResult, Metadata, ObjectInfo,
    ObjectStorage,
};

#[derive(Debug)]
struct StoredObject {
    data: Bytes,
    metadata: Metadata,
}

/// Thread-safe in-memory backend with a volatile lifecycle engine.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: RwLock<HashMap<String, StoredObject>>,
    lifecycle: LifecycleEngine,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Removes all objects. Lifecycle policies are kept.
    pub fn clear(&self) {
        self.objects.write().clear();
    }

    /// Runs one lifecycle pass over this backend's objects.
    pub async fn process_lifecycle(&self) -> Result<PassSummary> {
        self.lifecycle.process(self).await
    }
}

#[async_trait]
impl ObjectStorage for MemoryBackend {
    /// No required settings; any provided settings are ignored.
    fn configure(&self, _settings: &HashMap<String, String>) -> Result<()> {
        Ok(())
    }

    async fn put_with_metadata(
        &self,
        cancel: &CancellationToken,
        key: &str,
        data: Bytes,
        metadata: Option<Metadata>,
    ) -> Result<()> {
        check_cancelled(cancel)?;
        validate_key(key)?;

        let mut metadata = metadata.unwrap_or_default();
        validate_metadata(&metadata.custom)?;
        metadata.stamp(data.len() as u64);

        debug!(key = %sanitize_for_log(key), size = data.len(), "memory put");
        self.objects
            .write()
            .insert(key.to_string(), StoredObject { data, metadata });
        Ok(())
    }

    async fn get_with_cancel(&self, cancel: &CancellationToken, key: &str) -> Result<Bytes> {
        check_cancelled(cancel)?;
        validate_key(key)?;

        self.objects
            .read()
            .get(key)
            .map(|object| object.data.clone())
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    async fn get_metadata(&self, cancel: &CancellationToken, key: &str) -> Result<Metadata> {
        check_cancelled(cancel)?;
        validate_key(key)?;

        self.objects
            .read()
            .get(key)
            .map(|object| object.metadata.clone())
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    async fn update_metadata(
        &self,
        cancel: &CancellationToken,
        key: &str,
        metadata: Option<Metadata>,
    ) -> Result<()> {
        check_cancelled(cancel)?;
        validate_key(key)?;

        let mut metadata = metadata.unwrap_or_default();
        validate_metadata(&metadata.custom)?;

        let mut objects = self.objects.write();
        let object = objects
            .get_mut(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        metadata.stamp(object.data.len() as u64);
        object.metadata = metadata;
        Ok(())
    }

    async fn delete_with_cancel(&self, cancel: &CancellationToken, key: &str) -> Result<()> {
        check_cancelled(cancel)?;
        validate_key(key)?;

        match self.objects.write().remove(key) {
            Some(_) => {
                debug!(key = %sanitize_for_log(key), "memory delete");
                Ok(())
            }
            None => Err(Error::NotFound(key.to_string())),
        }
    }

    async fn exists(&self, cancel: &CancellationToken, key: &str) -> Result<bool> {
        check_cancelled(cancel)?;
        validate_key(key)?;
        Ok(self.objects.read().contains_key(key))
    }

    async fn list_with_cancel(
        &self,
        cancel: &CancellationToken,
        prefix: &str,
    ) -> Result<Vec<String>> {
        check_cancelled(cancel)?;
        validate_prefix(prefix)?;

        let mut keys: Vec<String> = self
            .objects
            .read()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn list_with_options(
        &self,
        cancel: &CancellationToken,
        opts: &ListOptions,
    ) -> Result<ListResult> {
        check_cancelled(cancel)?;
        validate_prefix(&opts.prefix)?;

        let mut all: Vec<ObjectInfo> = self
            .objects
            .read()
            .iter()
            .filter(|(key, _)| key.starts_with(&opts.prefix))
            .map(|(key, object)| ObjectInfo {
                key: key.clone(),
                metadata: object.metadata.clone(),
            })
            .collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(paginate(all, opts))
    }

    fn add_policy(&self, policy: LifecyclePolicy) -> Result<()> {
        self.lifecycle.add_policy(policy)
    }

    fn remove_policy(&self, id: &str) -> Result<()> {
        self.lifecycle.remove_policy(id)
    }

    fn get_policies(&self) -> Result<Vec<LifecyclePolicy>> {
        self.lifecycle.get_policies()
    }
}

#[async_trait]
impl Archiver for MemoryBackend {
    async fn store(&self, key: &str, data: Bytes) -> Result<()> {
        self.put(key, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let storage = MemoryBackend::new();
        storage
            .put("logs/app.log", Bytes::from("hello world"))
            .await
            .unwrap();

        assert_eq!(storage.get("logs/app.log").await.unwrap(), "hello world");
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let storage = MemoryBackend::new();
        let err = storage.get("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_data_and_metadata() {
        let storage = MemoryBackend::new();
        let cancel = CancellationToken::new();

        storage.put("key", Bytes::from("first")).await.unwrap();
        let before = storage.get_metadata(&cancel, "key").await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        storage.put("key", Bytes::from("second!")).await.unwrap();
        let after = storage.get_metadata(&cancel, "key").await.unwrap();

        assert_eq!(storage.get("key").await.unwrap(), "second!");
        assert_eq!(after.size, 7);
        assert!(after.last_modified > before.last_modified);
        assert_ne!(after.etag, before.etag);
    }

    #[tokio::test]
    async fn test_invalid_key_rejected_without_mutation() {
        let storage = MemoryBackend::new();
        let err = storage
            .put("../escape", Bytes::from("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_token_fails_fast() {
        let storage = MemoryBackend::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = storage
            .put_with_cancel(&cancel, "key", Bytes::from("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_delete_and_exists() {
        let storage = MemoryBackend::new();
        let cancel = CancellationToken::new();

        storage.put("key", Bytes::from("x")).await.unwrap();
        assert!(storage.exists(&cancel, "key").await.unwrap());

        storage.delete("key").await.unwrap();
        assert!(!storage.exists(&cancel, "key").await.unwrap());

        let err = storage.delete("key").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_filters_and_sorts() {
        let storage = MemoryBackend::new();
        for key in ["b/2", "a/1", "b/1", "c"] {
            storage.put(key, Bytes::from("x")).await.unwrap();
        }

        assert_eq!(storage.list("").await.unwrap(), ["a/1", "b/1", "b/2", "c"]);
        assert_eq!(storage.list("b/").await.unwrap(), ["b/1", "b/2"]);
        assert!(storage.list("zzz").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_with_options_paginates() {
        let storage = MemoryBackend::new();
        let cancel = CancellationToken::new();
        for key in ["a", "b", "c", "d", "e"] {
            storage.put(key, Bytes::from("x")).await.unwrap();
        }

        let opts = ListOptions {
            max_results: 2,
            ..Default::default()
        };
        let page1 = storage.list_with_options(&cancel, &opts).await.unwrap();
        assert_eq!(page1.objects.len(), 2);
        assert!(page1.truncated);

        let opts = ListOptions {
            max_results: 2,
            continue_from: page1.next_token,
            ..Default::default()
        };
        let page2 = storage.list_with_options(&cancel, &opts).await.unwrap();
        let keys: Vec<&str> = page2.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["c", "d"]);
    }

    #[tokio::test]
    async fn test_custom_metadata_round_trip() {
        let storage = MemoryBackend::new();
        let cancel = CancellationToken::new();

        let mut metadata = Metadata {
            content_type: Some("application/json".to_string()),
            ..Default::default()
        };
        metadata.custom.insert("owner".to_string(), "team-a".to_string());

        storage
            .put_with_metadata(&cancel, "doc.json", Bytes::from("{}"), Some(metadata))
            .await
            .unwrap();

        let stored = storage.get_metadata(&cancel, "doc.json").await.unwrap();
        assert_eq!(stored.content_type.as_deref(), Some("application/json"));
        assert_eq!(stored.custom.get("owner").map(String::as_str), Some("team-a"));
        assert_eq!(stored.size, 2);
        assert!(!stored.etag.is_empty());
    }

    #[tokio::test]
    async fn test_update_metadata_preserves_payload() {
        let storage = MemoryBackend::new();
        let cancel = CancellationToken::new();

        storage.put("key", Bytes::from("payload")).await.unwrap();
        let before = storage.get_metadata(&cancel, "key").await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        let update = Metadata {
            content_type: Some("text/plain".to_string()),
            ..Default::default()
        };
        storage
            .update_metadata(&cancel, "key", Some(update))
            .await
            .unwrap();

        let after = storage.get_metadata(&cancel, "key").await.unwrap();
        assert_eq!(storage.get("key").await.unwrap(), "payload");
        assert_eq!(after.size, before.size);
        assert_eq!(after.content_type.as_deref(), Some("text/plain"));
        assert!(after.last_modified > before.last_modified);
    }

    #[tokio::test]
    async fn test_update_metadata_missing_key() {
        let storage = MemoryBackend::new();
        let cancel = CancellationToken::new();
        let err = storage
            .update_metadata(&cancel, "missing", None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_metadata_limits_enforced() {
        let storage = MemoryBackend::new();
        let cancel = CancellationToken::new();

        let mut metadata = Metadata::default();
        metadata
            .custom
            .insert("k".to_string(), "v".repeat(3000));

        let err = storage
            .put_with_metadata(&cancel, "key", Bytes::from("x"), Some(metadata))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_clear_keeps_policies() {
        let storage = MemoryBackend::new();
        storage.put("key", Bytes::from("x")).await.unwrap();
        storage
            .add_policy(LifecyclePolicy::delete(
                "p",
                "",
                Duration::from_secs(60),
            ))
            .unwrap();

        storage.clear();
        assert!(storage.is_empty());
        assert_eq!(storage.get_policies().unwrap().len(), 1);
    }
}
