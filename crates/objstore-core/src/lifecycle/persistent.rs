//! Durable lifecycle engine backed by a JSON side file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::storage::Archiver;
use crate::{Error, Result};

use super::engine::LifecycleManager;
use super::policy::LifecyclePolicy;

/// Default policy file name, placed inside the backend's root directory.
pub const DEFAULT_POLICY_FILE: &str = ".lifecycle-policies.json";

/// Lifecycle engine whose policy set survives restarts.
///
/// The JSON file is the source of truth: it is rewritten wholesale on every
/// mutation and loaded once at construction. The in-memory map is a cache of
/// the file's contents. Archive destination handles are runtime state and are
/// not persisted; re-attach them after a reload with
/// [`attach_destination`](PersistentLifecycleEngine::attach_destination).
#[derive(Debug)]
pub struct PersistentLifecycleEngine {
    policies: RwLock<HashMap<String, LifecyclePolicy>>,
    path: PathBuf,
}

impl PersistentLifecycleEngine {
    /// Opens the engine, loading any policies already persisted at `path`.
    ///
    /// A missing file means an empty policy set. A file that exists but does
    /// not parse is an error: silently discarding persisted policies would
    /// let expired data accumulate unnoticed.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let policies = match std::fs::read(&path) {
            Ok(bytes) => {
                let loaded: Vec<LifecyclePolicy> = serde_json::from_slice(&bytes)?;
                debug!(
                    path = %path.display(),
                    count = loaded.len(),
                    "loaded persisted lifecycle policies"
                );
                loaded.into_iter().map(|p| (p.id.clone(), p)).collect()
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            policies: RwLock::new(policies),
            path,
        })
    }

    /// Path of the backing policy file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-attaches a runtime archive destination to a loaded policy.
    pub fn attach_destination(&self, id: &str, destination: Arc<dyn Archiver>) -> Result<()> {
        let mut policies = self.policies.write();
        let policy = policies
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        policy.destination = Some(destination);
        Ok(())
    }

    fn save(&self, policies: &HashMap<String, LifecyclePolicy>) -> Result<()> {
        let mut records: Vec<&LifecyclePolicy> = policies.values().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        let json = serde_json::to_vec_pretty(&records)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

#[async_trait]
impl LifecycleManager for PersistentLifecycleEngine {
    fn add_policy(&self, policy: LifecyclePolicy) -> Result<()> {
        policy.validate()?;
        let mut policies = self.policies.write();
        policies.insert(policy.id.clone(), policy);
        self.save(&policies)
    }

    fn remove_policy(&self, id: &str) -> Result<()> {
        let mut policies = self.policies.write();
        if policies.remove(id).is_some() {
            self.save(&policies)?;
        }
        Ok(())
    }

    fn get_policies(&self) -> Result<Vec<LifecyclePolicy>> {
        let mut policies: Vec<LifecyclePolicy> = self.policies.read().values().cloned().collect();
        policies.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(policies)
    }
}
