//! Storage contract: the trait every backend implements, plus the shared
//! metadata and listing types.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::lifecycle::LifecyclePolicy;
use crate::{Error, Result};

/// Default page size for `list_with_options` when the caller does not set one.
pub const DEFAULT_MAX_RESULTS: usize = 1000;

/// Metadata associated with a stored object.
///
/// `size`, `last_modified`, and `etag` are derived by the backend on every
/// put and metadata update; caller-supplied values for them are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// MIME type of the object (e.g. "application/json")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Encoding applied to the object (e.g. "gzip")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,

    /// Size of the payload in bytes, recomputed on every put
    #[serde(default)]
    pub size: u64,

    /// Timestamp of the last put or metadata update
    #[serde(default)]
    pub last_modified: DateTime<Utc>,

    /// Entity tag, derived from `last_modified` and `size` (not a content hash)
    #[serde(default)]
    pub etag: String,

    /// Caller-supplied custom key-value pairs
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub custom: HashMap<String, String>,
}

impl Metadata {
    /// Stamps the derived fields for a payload of `size` bytes modified now.
    pub(crate) fn stamp(&mut self, size: u64) {
        self.size = size;
        self.last_modified = Utc::now();
        self.etag = format!("{}-{}", self.last_modified.timestamp_millis(), size);
    }
}

/// A stored object's key together with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub key: String,
    pub metadata: Metadata,
}

/// Options for `list_with_options`.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Only keys starting with this prefix are returned. Empty matches all.
    pub prefix: String,

    /// When set, keys are grouped into common prefixes up to the first
    /// occurrence of the delimiter after the prefix.
    pub delimiter: Option<String>,

    /// Maximum results per page. Zero means the backend default (1000).
    pub max_results: usize,

    /// Continuation token from a previous `ListResult`; the last key of the
    /// previous page.
    pub continue_from: Option<String>,
}

impl ListOptions {
    pub(crate) fn effective_max_results(&self) -> usize {
        if self.max_results == 0 {
            DEFAULT_MAX_RESULTS
        } else {
            self.max_results
        }
    }
}

/// Result of a paginated list operation.
#[derive(Debug, Clone, Default)]
pub struct ListResult {
    /// Objects on this page, lexicographically ordered by key
    pub objects: Vec<ObjectInfo>,

    /// Directory-like groupings produced by delimiter listing
    pub common_prefixes: Vec<String>,

    /// Token to pass as `continue_from` for the next page
    pub next_token: Option<String>,

    /// Whether more results exist beyond this page
    pub truncated: bool,
}

/// The common contract for all storage backends.
///
/// Every operation has a cancellable variant taking a [`CancellationToken`]
/// and, for the frequent operations, a convenience variant that uses a fresh
/// token. Cancellation is cooperative: each operation checks the token once
/// at entry and fails fast with [`Error::Cancelled`] if it has already fired.
///
/// Payloads are [`Bytes`]: immutable and cheaply clonable, so a value
/// returned by `get` can never be used to mutate the stored copy or affect
/// other concurrent readers.
#[async_trait]
pub trait ObjectStorage: Send + Sync + std::fmt::Debug {
    /// One-time setup from a string-keyed settings map. Fails on missing
    /// required settings; which settings are required is backend-specific.
    fn configure(&self, settings: &HashMap<String, String>) -> Result<()>;

    /// Stores an object, replacing any existing object at the key.
    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        self.put_with_cancel(&CancellationToken::new(), key, data)
            .await
    }

    /// Cancellable variant of [`put`](ObjectStorage::put).
    async fn put_with_cancel(
        &self,
        cancel: &CancellationToken,
        key: &str,
        data: Bytes,
    ) -> Result<()> {
        self.put_with_metadata(cancel, key, data, None).await
    }

    /// Stores an object with caller-supplied metadata. The backend derives
    /// `size`, `last_modified`, and `etag` regardless of what the caller set.
    async fn put_with_metadata(
        &self,
        cancel: &CancellationToken,
        key: &str,
        data: Bytes,
        metadata: Option<Metadata>,
    ) -> Result<()>;

    /// Retrieves an object's payload.
    async fn get(&self, key: &str) -> Result<Bytes> {
        self.get_with_cancel(&CancellationToken::new(), key).await
    }

    /// Cancellable variant of [`get`](ObjectStorage::get).
    async fn get_with_cancel(&self, cancel: &CancellationToken, key: &str) -> Result<Bytes>;

    /// Retrieves only the metadata for an object.
    async fn get_metadata(&self, cancel: &CancellationToken, key: &str) -> Result<Metadata>;

    /// Replaces the metadata for an existing object, preserving the payload
    /// and `size` but refreshing `last_modified` and `etag`. Fails with
    /// not-found when the key does not exist.
    async fn update_metadata(
        &self,
        cancel: &CancellationToken,
        key: &str,
        metadata: Option<Metadata>,
    ) -> Result<()>;

    /// Removes an object. Fails with not-found when the key does not exist.
    async fn delete(&self, key: &str) -> Result<()> {
        self.delete_with_cancel(&CancellationToken::new(), key).await
    }

    /// Cancellable variant of [`delete`](ObjectStorage::delete).
    async fn delete_with_cancel(&self, cancel: &CancellationToken, key: &str) -> Result<()>;

    /// Checks whether an object exists. Only fails on cancellation or an
    /// invalid key.
    async fn exists(&self, cancel: &CancellationToken, key: &str) -> Result<bool>;

    /// Returns all keys starting with the prefix, lexicographically sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.list_with_cancel(&CancellationToken::new(), prefix).await
    }

    /// Cancellable variant of [`list`](ObjectStorage::list).
    async fn list_with_cancel(
        &self,
        cancel: &CancellationToken,
        prefix: &str,
    ) -> Result<Vec<String>>;

    /// Paginated listing with optional delimiter grouping. See [`ListOptions`].
    async fn list_with_options(
        &self,
        cancel: &CancellationToken,
        opts: &ListOptions,
    ) -> Result<ListResult>;

    /// Copies an object (same key) to an archive destination. The source
    /// object is not deleted. Fails with not-found when the source key does
    /// not exist.
    async fn archive(&self, key: &str, destination: &dyn Archiver) -> Result<()> {
        let data = self.get(key).await?;
        destination.store(key, data).await
    }

    /// Adds a lifecycle policy to this backend's engine, replacing any
    /// existing policy with the same id.
    fn add_policy(&self, policy: LifecyclePolicy) -> Result<()>;

    /// Removes a lifecycle policy. No-op when the id is absent.
    fn remove_policy(&self, id: &str) -> Result<()>;

    /// Returns a snapshot of this backend's lifecycle policies.
    fn get_policies(&self) -> Result<Vec<LifecyclePolicy>>;
}

/// The restricted, put-only contract used as the destination of an archive
/// action. Archive-only backend types implement this without implementing
/// [`ObjectStorage`].
#[async_trait]
pub trait Archiver: Send + Sync {
    /// Writes an archived object under the given key.
    async fn store(&self, key: &str, data: Bytes) -> Result<()>;
}

/// Fails fast when the caller's cancellation signal has already fired.
pub(crate) fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

/// Returns the common prefix a key collapses into under delimiter grouping,
/// or `None` when the key has no delimiter after the listing prefix.
pub(crate) fn common_prefix_for(key: &str, prefix: &str, delimiter: &str) -> Option<String> {
    let remainder = key.strip_prefix(prefix)?;
    let idx = remainder.find(delimiter)?;
    Some(format!("{prefix}{}", &remainder[..idx + delimiter.len()]))
}

/// Applies delimiter grouping and pagination over a lexicographically sorted
/// object set. Shared by the reference backends so the semantics cannot
/// drift between them.
pub(crate) fn paginate(all_objects: Vec<ObjectInfo>, opts: &ListOptions) -> ListResult {
    let mut objects = Vec::new();
    let mut common_prefixes: Vec<String> = Vec::new();

    if let Some(delimiter) = opts.delimiter.as_deref().filter(|d| !d.is_empty()) {
        for info in all_objects {
            match common_prefix_for(&info.key, &opts.prefix, delimiter) {
                Some(common) => {
                    if common_prefixes.last() != Some(&common) {
                        common_prefixes.push(common);
                    }
                }
                None => objects.push(info),
            }
        }
    } else {
        objects = all_objects;
    }

    let start = match opts.continue_from.as_deref() {
        Some(token) => objects
            .iter()
            .position(|o| o.key == token)
            .map(|i| i + 1)
            .unwrap_or(0),
        None => 0,
    };
    let end = (start + opts.effective_max_results()).min(objects.len());

    let truncated = end < objects.len();
    let page: Vec<ObjectInfo> = objects.drain(..end).skip(start).collect();
    let next_token = if truncated {
        page.last().map(|o| o.key.clone())
    } else {
        None
    };

    ListResult {
        objects: page,
        common_prefixes,
        next_token,
        truncated,
    }
}
