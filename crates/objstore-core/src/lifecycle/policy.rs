//! Lifecycle policy type and its JSON wire form.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::storage::Archiver;
use crate::validation::validate_prefix;
use crate::{Error, Result};

/// The action a lifecycle policy applies to expired objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleAction {
    /// Delete expired objects
    Delete,
    /// Copy expired objects to the archive destination
    Archive,
}

/// A retention rule applied to objects under a key prefix.
///
/// The runtime `destination` handle is never serialized; after reloading a
/// durable engine, archive destinations must be re-attached (the persisted
/// `destination_backend` name records which backend that should be).
#[derive(Clone, Serialize, Deserialize)]
pub struct LifecyclePolicy {
    /// Unique, caller-chosen identifier. Adding a policy with an existing id
    /// replaces it.
    pub id: String,

    /// Keys must start with this prefix to match. Empty matches everything.
    #[serde(default)]
    pub prefix: String,

    /// How long objects are retained after their last modification.
    #[serde(rename = "retention_seconds", with = "retention_seconds")]
    pub retention: Duration,

    /// What happens to objects older than the retention period.
    pub action: LifecycleAction,

    /// Name of the destination backend, recorded for archive policies so the
    /// destination can be re-attached after a reload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_backend: Option<String>,

    /// Runtime handle to the archive destination. Required at apply time
    /// when `action` is `Archive`.
    #[serde(skip)]
    pub destination: Option<Arc<dyn Archiver>>,
}

impl LifecyclePolicy {
    /// Creates a delete policy.
    pub fn delete(id: impl Into<String>, prefix: impl Into<String>, retention: Duration) -> Self {
        Self {
            id: id.into(),
            prefix: prefix.into(),
            retention,
            action: LifecycleAction::Delete,
            destination_backend: None,
            destination: None,
        }
    }

    /// Creates an archive policy with an attached destination.
    pub fn archive(
        id: impl Into<String>,
        prefix: impl Into<String>,
        retention: Duration,
        destination: Arc<dyn Archiver>,
    ) -> Self {
        Self {
            id: id.into(),
            prefix: prefix.into(),
            retention,
            action: LifecycleAction::Archive,
            destination_backend: None,
            destination: Some(destination),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::Validation {
                field: "policy",
                message: "policy id cannot be empty".to_string(),
            });
        }
        validate_prefix(&self.prefix)
    }
}

impl fmt::Debug for LifecyclePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecyclePolicy")
            .field("id", &self.id)
            .field("prefix", &self.prefix)
            .field("retention", &self.retention)
            .field("action", &self.action)
            .field("destination_backend", &self.destination_backend)
            .field("destination", &self.destination.is_some())
            .finish()
    }
}

mod retention_seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(retention: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(retention.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_form_round_trip() {
        let policy = LifecyclePolicy::delete("expire-logs", "logs/", Duration::from_secs(3600));
        let json = serde_json::to_value(&policy).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "id": "expire-logs",
                "prefix": "logs/",
                "retention_seconds": 3600,
                "action": "delete",
            })
        );

        let parsed: LifecyclePolicy = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.id, "expire-logs");
        assert_eq!(parsed.retention, Duration::from_secs(3600));
        assert_eq!(parsed.action, LifecycleAction::Delete);
        assert!(parsed.destination.is_none());
    }

    #[test]
    fn test_destination_backend_persisted_but_not_handle() {
        let json = serde_json::json!({
            "id": "cold",
            "prefix": "archive/",
            "retention_seconds": 86400,
            "action": "archive",
            "destination_backend": "glacier-1",
        });

        let parsed: LifecyclePolicy = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.destination_backend.as_deref(), Some("glacier-1"));
        // The runtime handle never survives serialization
        assert!(parsed.destination.is_none());
    }

    #[test]
    fn test_validate_rejects_empty_id_and_bad_prefix() {
        let policy = LifecyclePolicy::delete("", "logs/", Duration::from_secs(1));
        assert!(policy.validate().is_err());

        let policy = LifecyclePolicy::delete("p1", "../logs", Duration::from_secs(1));
        assert!(policy.validate().is_err());

        let policy = LifecyclePolicy::delete("p1", "", Duration::from_secs(1));
        assert!(policy.validate().is_ok());
    }
}
