//! Local filesystem storage backend.
//!
//! Objects are plain files under a root directory; the key's `/` segments
//! become subdirectories. Rich metadata lives in a JSON sidecar file next to
//! the object (`<key>.metadata.json`). Writes are atomic: the payload goes to
//! a temp file in the destination directory first and is renamed into place,
//! so readers never observe a partially written object.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::lifecycle::{
    LifecycleEngine, LifecycleManager, LifecyclePolicy, PassSummary, PersistentLifecycleEngine,
    DEFAULT_POLICY_FILE,
};
use crate::validation::{sanitize_for_log, validate_key, validate_metadata, validate_prefix};
use crate::{Error, Result};

use super::backend::{
    check_cancelled, paginate, Archiver, ListOptions, ListResult, Metadata, ObjectInfo,
    ObjectStorage,
};

/// Suffix of the metadata sidecar file stored next to each object.
const METADATA_SUFFIX: &str = ".metadata.json";

/// Suffix of in-flight temp files, hidden from listings.
const TEMP_SUFFIX: &str = ".tmp";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Filesystem-backed storage rooted at a configured directory.
///
/// Construct with [`new`](LocalBackend::new) and call
/// [`configure`](ObjectStorage::configure) with at least a `path` setting
/// before use. Optional settings select the lifecycle engine:
///
/// * `lifecycle`: `"volatile"` (default) or `"durable"`
/// * `lifecycle_policy_file`: policy file path for the durable engine
///   (defaults to `.lifecycle-policies.json` under the root)
#[derive(Debug)]
pub struct LocalBackend {
    root: RwLock<Option<PathBuf>>,
    lifecycle: RwLock<Arc<dyn LifecycleManager>>,
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self {
            root: RwLock::new(None),
            lifecycle: RwLock::new(Arc::new(LifecycleEngine::new())),
        }
    }
}

impl LocalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one lifecycle pass over this backend's objects.
    pub async fn process_lifecycle(&self) -> Result<PassSummary> {
        let lifecycle = self.lifecycle.read().clone();
        lifecycle.process(self).await
    }

    fn root(&self) -> Result<PathBuf> {
        self.root
            .read()
            .clone()
            .ok_or(Error::NotConfigured("path"))
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        // Keys are validated before this point, so joining cannot escape
        // the root.
        Ok(self.root()?.join(key))
    }

    fn sidecar_path(path: &Path) -> PathBuf {
        let mut os = path.to_path_buf().into_os_string();
        os.push(METADATA_SUFFIX);
        PathBuf::from(os)
    }

    async fn write_sidecar(path: &Path, metadata: &Metadata) -> Result<()> {
        let json = serde_json::to_vec_pretty(metadata)?;
        tokio::fs::write(Self::sidecar_path(path), json).await?;
        Ok(())
    }

    /// Reads the sidecar, falling back to filesystem attributes for objects
    /// written without one (e.g. files dropped into the root externally).
    async fn read_metadata(path: &Path, key: &str) -> Result<Metadata> {
        match tokio::fs::read(Self::sidecar_path(path)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let attrs = tokio::fs::metadata(path)
                    .await
                    .map_err(|err| io_to_storage(err, key))?;
                let size = attrs.len();
                let last_modified: DateTime<Utc> = attrs
                    .modified()
                    .map(DateTime::from)
                    .unwrap_or_else(|_| Utc::now());
                Ok(Metadata {
                    size,
                    last_modified,
                    etag: format!("{}-{}", last_modified.timestamp_millis(), size),
                    ..Default::default()
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Collects all object keys under the root, relative with `/` separators,
    /// skipping sidecars and in-flight temp files. Unsorted.
    async fn walk_keys(&self, root: &Path) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                // The root may not exist yet when nothing has been stored
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }

                let Ok(rel) = path.strip_prefix(root) else {
                    continue;
                };
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.ends_with(METADATA_SUFFIX) || key.ends_with(TEMP_SUFFIX) {
                    continue;
                }
                keys.push(key);
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl ObjectStorage for LocalBackend {
    fn configure(&self, settings: &HashMap<String, String>) -> Result<()> {
        let path = settings
            .get("path")
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::Config("path setting is required".to_string()))?;

        let root = PathBuf::from(path);
        std::fs::create_dir_all(&root)?;

        let lifecycle: Arc<dyn LifecycleManager> =
            match settings.get("lifecycle").map(String::as_str) {
                None | Some("volatile") => Arc::new(LifecycleEngine::new()),
                Some("durable") => {
                    let policy_file = settings
                        .get("lifecycle_policy_file")
                        .map(PathBuf::from)
                        .unwrap_or_else(|| root.join(DEFAULT_POLICY_FILE));
                    Arc::new(PersistentLifecycleEngine::new(policy_file)?)
                }
                Some(other) => {
                    return Err(Error::Config(format!(
                        "unknown lifecycle setting {other:?} (expected \"volatile\" or \"durable\")"
                    )))
                }
            };

        debug!(root = %root.display(), "local backend configured");
        *self.root.write() = Some(root);
        *self.lifecycle.write() = lifecycle;
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

        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Temp file lives in the destination directory so the rename never
        // crosses filesystems.
        let temp = path.with_file_name(format!(
            "{}.{}.{}{TEMP_SUFFIX}",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed),
        ));

        tokio::fs::write(&temp, &data).await?;
        if let Err(err) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(err.into());
        }

        Self::write_sidecar(&path, &metadata).await?;
        debug!(key = %sanitize_for_log(key), size = data.len(), "local put");
        Ok(())
    }

    async fn get_with_cancel(&self, cancel: &CancellationToken, key: &str) -> Result<Bytes> {
        check_cancelled(cancel)?;
        validate_key(key)?;

        let path = self.object_path(key)?;
        let data = tokio::fs::read(&path)
            .await
            .map_err(|err| io_to_storage(err, key))?;
        Ok(Bytes::from(data))
    }

    async fn get_metadata(&self, cancel: &CancellationToken, key: &str) -> Result<Metadata> {
        check_cancelled(cancel)?;
        validate_key(key)?;

        let path = self.object_path(key)?;
        if !tokio::fs::try_exists(&path).await? {
            return Err(Error::NotFound(key.to_string()));
        }
        Self::read_metadata(&path, key).await
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

        let path = self.object_path(key)?;
        let attrs = tokio::fs::metadata(&path)
            .await
            .map_err(|err| io_to_storage(err, key))?;
        metadata.stamp(attrs.len());
        Self::write_sidecar(&path, &metadata).await
    }

    async fn delete_with_cancel(&self, cancel: &CancellationToken, key: &str) -> Result<()> {
        check_cancelled(cancel)?;
        validate_key(key)?;

        let path = self.object_path(key)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|err| io_to_storage(err, key))?;

        // The sidecar is optional; ignore its absence
        match tokio::fs::remove_file(Self::sidecar_path(&path)).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        debug!(key = %sanitize_for_log(key), "local delete");
        Ok(())
    }

    async fn exists(&self, cancel: &CancellationToken, key: &str) -> Result<bool> {
        check_cancelled(cancel)?;
        validate_key(key)?;

        let path = self.object_path(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(attrs) => Ok(attrs.is_file()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn list_with_cancel(
        &self,
        cancel: &CancellationToken,
        prefix: &str,
    ) -> Result<Vec<String>> {
        check_cancelled(cancel)?;
        validate_prefix(prefix)?;

        let root = self.root()?;
        let mut keys: Vec<String> = self
            .walk_keys(&root)
            .await?
            .into_iter()
            .filter(|key| key.starts_with(prefix))
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

        let root = self.root()?;
        let mut keys: Vec<String> = self
            .walk_keys(&root)
            .await?
            .into_iter()
            .filter(|key| key.starts_with(&opts.prefix))
            .collect();
        keys.sort();

        let mut all = Vec::with_capacity(keys.len());
        for key in keys {
            let path = root.join(&key);
            let metadata = match Self::read_metadata(&path, &key).await {
                Ok(metadata) => metadata,
                // Deleted while we were listing
                Err(Error::NotFound(_)) => continue,
                Err(err) => return Err(err),
            };
            all.push(ObjectInfo { key, metadata });
        }

        Ok(paginate(all, opts))
    }

    fn add_policy(&self, policy: LifecyclePolicy) -> Result<()> {
        self.lifecycle.read().add_policy(policy)
    }

    fn remove_policy(&self, id: &str) -> Result<()> {
        self.lifecycle.read().remove_policy(id)
    }

    fn get_policies(&self) -> Result<Vec<LifecyclePolicy>> {
        self.lifecycle.read().get_policies()
    }
}

#[async_trait]
impl Archiver for LocalBackend {
    async fn store(&self, key: &str, data: Bytes) -> Result<()> {
        self.put(key, data).await
    }
}

fn io_to_storage(err: std::io::Error, key: &str) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::NotFound(key.to_string())
    } else {
        Error::Io(err)
    }
}
