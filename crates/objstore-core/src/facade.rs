//! Multi-backend facade.
//!
//! The facade owns a registry of named backends and routes every operation
//! by key reference: `"backend:key"` targets the named backend, a bare key
//! targets the default backend. It also enforces replication policies,
//! fanning successful puts out to destination backends either synchronously
//! or on background tasks.
//!
//! The registry is an explicit value, not process-global state; independent
//! facades with different backend sets can coexist in one process.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::lifecycle::LifecyclePolicy;
use crate::replication::{ReplicationMode, ReplicationPolicy};
use crate::storage::{
    new_storage, Archiver, ListOptions, ListResult, Metadata, ObjectStorage,
};
use crate::validation::{
    parse_key_reference, sanitize_for_log, validate_backend_name, validate_key_reference,
    validate_prefix,
};
use crate::{Error, Result};

/// How a named backend enters the facade's registry.
pub enum BackendDefinition {
    /// An already-constructed backend, used as-is.
    Instance(Arc<dyn ObjectStorage>),
    /// Built and configured through the factory at facade construction.
    Settings {
        kind: String,
        settings: HashMap<String, String>,
    },
}

/// Everything needed to construct a [`Facade`].
#[derive(Default)]
pub struct FacadeConfig {
    pub backends: HashMap<String, BackendDefinition>,
    /// Explicit default backend name. May be omitted when exactly one
    /// backend is registered.
    pub default_backend: Option<String>,
    pub replication: Vec<ReplicationPolicy>,
}

impl FacadeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an already-constructed backend.
    pub fn with_backend(
        mut self,
        name: impl Into<String>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        self.backends
            .insert(name.into(), BackendDefinition::Instance(storage));
        self
    }

    /// Registers a backend to be built through the factory.
    pub fn with_backend_settings(
        mut self,
        name: impl Into<String>,
        kind: impl Into<String>,
        settings: HashMap<String, String>,
    ) -> Self {
        self.backends.insert(
            name.into(),
            BackendDefinition::Settings {
                kind: kind.into(),
                settings,
            },
        );
        self
    }

    pub fn with_default_backend(mut self, name: impl Into<String>) -> Self {
        self.default_backend = Some(name.into());
        self
    }

    pub fn with_replication(mut self, policy: ReplicationPolicy) -> Self {
        self.replication.push(policy);
        self
    }
}

/// Routes operations across a fixed set of named backends.
#[derive(Debug)]
pub struct Facade {
    backends: HashMap<String, Arc<dyn ObjectStorage>>,
    default_backend: String,
    replication: HashMap<String, ReplicationPolicy>,
}

impl Facade {
    /// Builds the facade, constructing factory-defined backends and
    /// validating the default-backend and replication configuration.
    pub fn new(config: FacadeConfig) -> Result<Self> {
        if config.backends.is_empty() {
            return Err(Error::Config(
                "facade requires at least one backend".to_string(),
            ));
        }

        let mut backends = HashMap::with_capacity(config.backends.len());
        for (name, definition) in config.backends {
            validate_backend_name(&name)?;
            let storage = match definition {
                BackendDefinition::Instance(storage) => storage,
                BackendDefinition::Settings { kind, settings } => new_storage(&kind, &settings)?,
            };
            backends.insert(name, storage);
        }

        let default_backend = match config.default_backend {
            Some(name) => {
                if !backends.contains_key(&name) {
                    return Err(Error::Config(format!(
                        "default backend {name:?} is not registered"
                    )));
                }
                name
            }
            None if backends.len() == 1 => {
                // Sole backend is the implicit default
                backends.keys().next().cloned().unwrap_or_default()
            }
            None => {
                return Err(Error::Config(
                    "multiple backends registered but no default_backend set".to_string(),
                ))
            }
        };

        let mut replication = HashMap::with_capacity(config.replication.len());
        for policy in config.replication {
            policy.validate()?;
            if !backends.contains_key(&policy.source) {
                return Err(Error::Config(format!(
                    "replication source {:?} is not registered",
                    policy.source
                )));
            }
            for destination in &policy.destinations {
                if !backends.contains_key(destination) {
                    return Err(Error::Config(format!(
                        "replication destination {destination:?} is not registered"
                    )));
                }
            }
            if replication.insert(policy.source.clone(), policy).is_some() {
                return Err(Error::Config(
                    "duplicate replication policy source".to_string(),
                ));
            }
        }

        debug!(
            backends = backends.len(),
            default = %default_backend,
            "facade constructed"
        );
        Ok(Self {
            backends,
            default_backend,
            replication,
        })
    }

    /// Name of the backend bare keys resolve to.
    pub fn default_backend(&self) -> &str {
        &self.default_backend
    }

    /// Registered backend names, sorted.
    pub fn backend_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.backends.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Looks up a registered backend by name.
    pub fn backend(&self, name: &str) -> Result<Arc<dyn ObjectStorage>> {
        validate_backend_name(name)?;
        self.backend_ref(name).cloned()
    }

    fn backend_ref(&self, name: &str) -> Result<&Arc<dyn ObjectStorage>> {
        self.backends
            .get(name)
            .ok_or_else(|| Error::UnknownBackend(name.to_string()))
    }

    /// Validates a key reference and resolves it to (backend name, backend,
    /// bare key).
    fn resolve<'a>(&'a self, key_ref: &'a str) -> Result<(&'a str, &'a Arc<dyn ObjectStorage>, &'a str)> {
        validate_key_reference(key_ref)?;
        let (backend_name, key) = parse_key_reference(key_ref);
        let name = backend_name.unwrap_or(&self.default_backend);
        Ok((name, self.backend_ref(name)?, key))
    }

    /// Resolves a prefix reference. Unlike keys, the prefix part may be
    /// empty: `"mirror:"` lists everything on `mirror`.
    fn resolve_prefix<'a>(&'a self, prefix_ref: &'a str) -> Result<(&'a Arc<dyn ObjectStorage>, &'a str)> {
        let (backend_name, prefix) = parse_key_reference(prefix_ref);
        let name = match backend_name {
            Some(name) => {
                validate_backend_name(name)?;
                name
            }
            None => &self.default_backend,
        };
        validate_prefix(prefix)?;
        Ok((self.backend_ref(name)?, prefix))
    }

    pub async fn put(&self, key_ref: &str, data: Bytes) -> Result<()> {
        self.put_with_metadata(&CancellationToken::new(), key_ref, data, None)
            .await
    }

    pub async fn put_with_cancel(
        &self,
        cancel: &CancellationToken,
        key_ref: &str,
        data: Bytes,
    ) -> Result<()> {
        self.put_with_metadata(cancel, key_ref, data, None).await
    }

    /// Stores an object and, when a replication policy covers the resolved
    /// backend, fans the write out to the policy's destinations.
    pub async fn put_with_metadata(
        &self,
        cancel: &CancellationToken,
        key_ref: &str,
        data: Bytes,
        metadata: Option<Metadata>,
    ) -> Result<()> {
        let (name, backend, key) = self.resolve(key_ref)?;
        backend
            .put_with_metadata(cancel, key, data.clone(), metadata.clone())
            .await?;
        self.replicate(name, key, data, metadata).await
    }

    pub async fn get(&self, key_ref: &str) -> Result<Bytes> {
        let (_, backend, key) = self.resolve(key_ref)?;
        backend.get(key).await
    }

    pub async fn get_with_cancel(&self, cancel: &CancellationToken, key_ref: &str) -> Result<Bytes> {
        let (_, backend, key) = self.resolve(key_ref)?;
        backend.get_with_cancel(cancel, key).await
    }

    pub async fn get_metadata(&self, cancel: &CancellationToken, key_ref: &str) -> Result<Metadata> {
        let (_, backend, key) = self.resolve(key_ref)?;
        backend.get_metadata(cancel, key).await
    }

    pub async fn update_metadata(
        &self,
        cancel: &CancellationToken,
        key_ref: &str,
        metadata: Option<Metadata>,
    ) -> Result<()> {
        let (_, backend, key) = self.resolve(key_ref)?;
        backend.update_metadata(cancel, key, metadata).await
    }

    pub async fn delete(&self, key_ref: &str) -> Result<()> {
        let (_, backend, key) = self.resolve(key_ref)?;
        backend.delete(key).await
    }

    pub async fn delete_with_cancel(&self, cancel: &CancellationToken, key_ref: &str) -> Result<()> {
        let (_, backend, key) = self.resolve(key_ref)?;
        backend.delete_with_cancel(cancel, key).await
    }

    pub async fn exists(&self, cancel: &CancellationToken, key_ref: &str) -> Result<bool> {
        let (_, backend, key) = self.resolve(key_ref)?;
        backend.exists(cancel, key).await
    }

    /// Lists keys on the resolved backend. Returned keys are bare, without
    /// the backend prefix.
    pub async fn list(&self, prefix_ref: &str) -> Result<Vec<String>> {
        let (backend, prefix) = self.resolve_prefix(prefix_ref)?;
        backend.list(prefix).await
    }

    pub async fn list_with_options(
        &self,
        cancel: &CancellationToken,
        prefix_ref: &str,
        mut opts: ListOptions,
    ) -> Result<ListResult> {
        let (backend, prefix) = self.resolve_prefix(prefix_ref)?;
        opts.prefix = prefix.to_string();
        backend.list_with_options(cancel, &opts).await
    }

    /// Copies an object from its resolved backend to another registered
    /// backend under the same key. The source is not deleted.
    pub async fn archive(&self, key_ref: &str, destination: &str) -> Result<()> {
        let (_, backend, key) = self.resolve(key_ref)?;
        validate_backend_name(destination)?;
        let archiver = StorageArchiver(self.backend_ref(destination)?.clone());
        backend.archive(key, &archiver).await
    }

    pub fn add_policy(&self, backend: Option<&str>, policy: LifecyclePolicy) -> Result<()> {
        self.named_or_default(backend)?.add_policy(policy)
    }

    pub fn remove_policy(&self, backend: Option<&str>, id: &str) -> Result<()> {
        self.named_or_default(backend)?.remove_policy(id)
    }

    pub fn get_policies(&self, backend: Option<&str>) -> Result<Vec<LifecyclePolicy>> {
        self.named_or_default(backend)?.get_policies()
    }

    fn named_or_default(&self, backend: Option<&str>) -> Result<&Arc<dyn ObjectStorage>> {
        match backend {
            Some(name) => {
                validate_backend_name(name)?;
                self.backend_ref(name)
            }
            None => self.backend_ref(&self.default_backend),
        }
    }

    async fn replicate(
        &self,
        source: &str,
        key: &str,
        data: Bytes,
        metadata: Option<Metadata>,
    ) -> Result<()> {
        let Some(policy) = self.replication.get(source) else {
            return Ok(());
        };

        match policy.mode {
            ReplicationMode::Sync => {
                for destination in &policy.destinations {
                    let backend = self.backend_ref(destination)?;
                    backend
                        .put_with_metadata(
                            &CancellationToken::new(),
                            key,
                            data.clone(),
                            metadata.clone(),
                        )
                        .await
                        .map_err(|err| {
                            Error::Replication(format!(
                                "replica write to {destination:?} failed: {err}"
                            ))
                        })?;
                }
            }
            ReplicationMode::Background => {
                for destination in &policy.destinations {
                    let backend = self.backend_ref(destination)?.clone();
                    let destination = destination.clone();
                    let key = key.to_string();
                    let data = data.clone();
                    let metadata = metadata.clone();
                    tokio::spawn(async move {
                        let cancel = CancellationToken::new();
                        if let Err(err) =
                            backend.put_with_metadata(&cancel, &key, data, metadata).await
                        {
                            warn!(
                                destination = %destination,
                                key = %sanitize_for_log(&key),
                                error = %err,
                                "background replication failed"
                            );
                        }
                    });
                }
            }
        }
        Ok(())
    }
}

/// Adapts a registered backend into the put-only archive contract.
struct StorageArchiver(Arc<dyn ObjectStorage>);

#[async_trait]
impl Archiver for StorageArchiver {
    async fn store(&self, key: &str, data: Bytes) -> Result<()> {
        self.0.put(key, data).await
    }
}
