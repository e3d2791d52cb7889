//! Volatile lifecycle engine and the shared policy-application pass.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::storage::ObjectStorage;
use crate::validation::sanitize_for_log;
use crate::{Error, Result};

use super::policy::{LifecycleAction, LifecyclePolicy};

/// Default interval between lifecycle scan passes.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(3600);

/// Counters from a single lifecycle pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Objects whose age was evaluated against a policy
    pub evaluated: usize,
    /// Objects deleted by delete policies
    pub deleted: usize,
    /// Objects copied out by archive policies
    pub archived: usize,
    /// Expired objects whose action failed
    pub failed: usize,
}

/// The contract shared by the volatile and durable lifecycle engines.
///
/// Policy mutation is synchronous and cheap; the periodic scan work happens
/// in [`process`](LifecycleManager::process), which snapshots the policy set
/// and then runs entirely outside the engine's locks so policy mutation is
/// never blocked behind a scan.
#[async_trait]
pub trait LifecycleManager: Send + Sync + std::fmt::Debug {
    /// Registers a policy, replacing any existing policy with the same id.
    fn add_policy(&self, policy: LifecyclePolicy) -> Result<()>;

    /// Removes a policy. No-op when the id is absent.
    fn remove_policy(&self, id: &str) -> Result<()>;

    /// Returns a snapshot of the registered policies, sorted by id.
    fn get_policies(&self) -> Result<Vec<LifecyclePolicy>>;

    /// Runs one scan-evaluate-apply pass over the given backend.
    async fn process(&self, storage: &dyn ObjectStorage) -> Result<PassSummary> {
        apply_policies(&self.get_policies()?, storage).await
    }
}

/// In-memory lifecycle engine. Policies are lost on drop; pair with the
/// durable [`PersistentLifecycleEngine`](super::PersistentLifecycleEngine)
/// when policies must survive restarts.
#[derive(Debug, Default)]
pub struct LifecycleEngine {
    policies: RwLock<HashMap<String, LifecyclePolicy>>,
}

impl LifecycleEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LifecycleManager for LifecycleEngine {
    fn add_policy(&self, policy: LifecyclePolicy) -> Result<()> {
        policy.validate()?;
        self.policies.write().insert(policy.id.clone(), policy);
        Ok(())
    }

    fn remove_policy(&self, id: &str) -> Result<()> {
        self.policies.write().remove(id);
        Ok(())
    }

    fn get_policies(&self) -> Result<Vec<LifecyclePolicy>> {
        let mut policies: Vec<LifecyclePolicy> = self.policies.read().values().cloned().collect();
        policies.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(policies)
    }
}

/// One scan-evaluate-apply pass: for each policy, list the matching keys,
/// evaluate ages against the retention period, then apply the action to the
/// expired set. Evaluation works on a snapshot; objects deleted concurrently
/// between scan and apply are skipped, not errors.
pub(crate) async fn apply_policies(
    policies: &[LifecyclePolicy],
    storage: &dyn ObjectStorage,
) -> Result<PassSummary> {
    let cancel = CancellationToken::new();
    let mut summary = PassSummary::default();

    for policy in policies {
        let keys = storage.list(&policy.prefix).await?;
        let now = Utc::now();

        let mut expired = Vec::new();
        for key in keys {
            let metadata = match storage.get_metadata(&cancel, &key).await {
                Ok(metadata) => metadata,
                Err(Error::NotFound(_)) => continue,
                Err(err) => return Err(err),
            };
            summary.evaluated += 1;

            let age = now.signed_duration_since(metadata.last_modified);
            // Negative age (clock skew) never expires
            if age.to_std().map(|a| a > policy.retention).unwrap_or(false) {
                expired.push(key);
            }
        }

        for key in expired {
            match policy.action {
                LifecycleAction::Delete => match storage.delete(&key).await {
                    Ok(()) => {
                        summary.deleted += 1;
                        info!(
                            policy = %policy.id,
                            key = %sanitize_for_log(&key),
                            "lifecycle deleted expired object"
                        );
                    }
                    Err(err) if err.is_not_found() => {}
                    Err(err) => {
                        summary.failed += 1;
                        warn!(
                            policy = %policy.id,
                            key = %sanitize_for_log(&key),
                            error = %err,
                            "lifecycle delete failed"
                        );
                    }
                },
                LifecycleAction::Archive => {
                    let Some(destination) = policy.destination.as_deref() else {
                        warn!(
                            policy = %policy.id,
                            "archive policy has no destination attached, skipping"
                        );
                        break;
                    };
                    match storage.archive(&key, destination).await {
                        Ok(()) => {
                            summary.archived += 1;
                            info!(
                                policy = %policy.id,
                                key = %sanitize_for_log(&key),
                                "lifecycle archived expired object"
                            );
                        }
                        Err(err) if err.is_not_found() => {}
                        Err(err) => {
                            summary.failed += 1;
                            warn!(
                                policy = %policy.id,
                                key = %sanitize_for_log(&key),
                                error = %err,
                                "lifecycle archive failed"
                            );
                        }
                    }
                }
            }
        }
    }

    Ok(summary)
}

/// Drives periodic lifecycle passes until the cancellation token fires.
///
/// Spawn this on the runtime next to the backend it manages:
///
/// ```ignore
/// tokio::spawn(lifecycle::run(engine, storage, interval, cancel.clone()));
/// ```
pub async fn run(
    manager: Arc<dyn LifecycleManager>,
    storage: Arc<dyn ObjectStorage>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so the loop waits a full
    // interval before the first pass.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("lifecycle scan loop stopped");
                return;
            }
            _ = ticker.tick() => {
                match manager.process(storage.as_ref()).await {
                    Ok(summary) => debug!(
                        evaluated = summary.evaluated,
                        deleted = summary.deleted,
                        archived = summary.archived,
                        failed = summary.failed,
                        "lifecycle pass complete"
                    ),
                    Err(err) => warn!(error = %err, "lifecycle pass failed"),
                }
            }
        }
    }
}
