//! Declarative backend configuration.
//!
//! A [`BackendConfig`] is the serializable form of "which backend, with which
//! settings". Config files (JSON or YAML) deserialize straight into it; the
//! facade and factory consume it via [`kind`](BackendConfig::kind) and
//! [`settings`](BackendConfig::settings).

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::Result;

use super::backend::ObjectStorage;
use super::new_storage;

/// Backend selection plus its backend-specific settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum BackendConfig {
    /// In-memory backend; no settings.
    Memory,

    /// Local filesystem backend rooted at `path`.
    Local {
        path: String,
        /// `"volatile"` (default) or `"durable"`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lifecycle: Option<String>,
        /// Policy file path for the durable lifecycle engine
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lifecycle_policy_file: Option<String>,
    },
}

impl BackendConfig {
    /// The factory kind string for this configuration.
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::Memory => "memory",
            BackendConfig::Local { .. } => "local",
        }
    }

    /// Flattens this configuration into the settings map backends consume.
    pub fn settings(&self) -> HashMap<String, String> {
        let mut settings = HashMap::new();
        match self {
            BackendConfig::Memory => {}
            BackendConfig::Local {
                path,
                lifecycle,
                lifecycle_policy_file,
            } => {
                settings.insert("path".to_string(), path.clone());
                if let Some(lifecycle) = lifecycle {
                    settings.insert("lifecycle".to_string(), lifecycle.clone());
                }
                if let Some(file) = lifecycle_policy_file {
                    settings.insert("lifecycle_policy_file".to_string(), file.clone());
                }
            }
        }
        settings
    }

    /// Builds and configures the backend this configuration describes.
    pub fn build(&self) -> Result<Arc<dyn ObjectStorage>> {
        new_storage(self.kind(), &self.settings())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_from_yaml() {
        let yaml = r#"
backend: local
path: /var/lib/objstore
lifecycle: durable
"#;
        let config: BackendConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config,
            BackendConfig::Local {
                path: "/var/lib/objstore".to_string(),
                lifecycle: Some("durable".to_string()),
                lifecycle_policy_file: None,
            }
        );
        assert_eq!(config.kind(), "local");
        assert_eq!(
            config.settings().get("lifecycle").map(String::as_str),
            Some("durable")
        );
    }

    #[test]
    fn test_deserialize_memory_from_json() {
        let config: BackendConfig = serde_json::from_str(r#"{"backend": "memory"}"#).unwrap();
        assert_eq!(config, BackendConfig::Memory);
        assert!(config.settings().is_empty());
    }

    #[tokio::test]
    async fn test_build_memory_backend() {
        let storage = BackendConfig::Memory.build().unwrap();
        storage
            .put("key", bytes::Bytes::from("value"))
            .await
            .unwrap();
        assert_eq!(storage.get("key").await.unwrap(), "value");
    }
}
