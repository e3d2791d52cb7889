//! Replication policy types and their JSON file form.
//!
//! A replication policy tells the facade to fan a successful put on a source
//! backend out to one or more destination backends. Enforcement lives in the
//! facade; this module only defines the policy shape and loads policy files.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::validation::validate_backend_name;
use crate::{Error, Result};

/// How replica writes relate to the primary write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationMode {
    /// The put does not succeed until every destination write succeeds.
    Sync,
    /// The put returns once the primary write succeeds; replica writes
    /// happen on background tasks and failures are only logged.
    Background,
}

/// Fan-out rule for one source backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationPolicy {
    /// Backend whose puts trigger replication
    pub source: String,
    /// Backends the object is copied to
    pub destinations: Vec<String>,
    pub mode: ReplicationMode,
}

impl ReplicationPolicy {
    pub(crate) fn validate(&self) -> Result<()> {
        validate_backend_name(&self.source)?;
        if self.destinations.is_empty() {
            return Err(Error::Config(format!(
                "replication policy for {:?} has no destinations",
                self.source
            )));
        }
        for destination in &self.destinations {
            validate_backend_name(destination)?;
            if destination == &self.source {
                return Err(Error::Config(format!(
                    "replication policy for {:?} lists its source as a destination",
                    self.source
                )));
            }
        }
        Ok(())
    }
}

/// Loads replication policies from a JSON file.
///
/// A missing file means no replication. A file that exists but does not
/// parse is an error, the same stance the lifecycle engine takes on its
/// policy file.
pub fn load_replication_policies(path: &Path) -> Result<Vec<ReplicationPolicy>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn policy(source: &str, destinations: &[&str], mode: ReplicationMode) -> ReplicationPolicy {
        ReplicationPolicy {
            source: source.to_string(),
            destinations: destinations.iter().map(|d| d.to_string()).collect(),
            mode,
        }
    }

    #[test]
    fn test_wire_form() {
        let json = r#"
        [
            {"source": "primary", "destinations": ["mirror-a", "mirror-b"], "mode": "sync"},
            {"source": "scratch", "destinations": ["mirror-a"], "mode": "background"}
        ]"#;

        let policies: Vec<ReplicationPolicy> = serde_json::from_str(json).unwrap();
        assert_eq!(policies.len(), 2);
        assert_eq!(policies[0].mode, ReplicationMode::Sync);
        assert_eq!(policies[0].destinations, ["mirror-a", "mirror-b"]);
        assert_eq!(policies[1].mode, ReplicationMode::Background);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let policies = load_replication_policies(&dir.path().join("absent.json")).unwrap();
        assert!(policies.is_empty());
    }

    #[test]
    fn test_load_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("replication.json");
        std::fs::write(&path, "[{").unwrap();

        let err = load_replication_policies(&path).unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_validate() {
        assert!(policy("primary", &["mirror"], ReplicationMode::Sync)
            .validate()
            .is_ok());

        assert!(policy("primary", &[], ReplicationMode::Sync)
            .validate()
            .is_err());
        assert!(policy("primary", &["primary"], ReplicationMode::Sync)
            .validate()
            .is_err());
        assert!(policy("Primary", &["mirror"], ReplicationMode::Sync)
            .validate()
            .is_err());
    }
}
