//! Reindexer configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SecIndexError};

/// Default namespace under which the shadow tree is stored.
pub const DEFAULT_NAMESPACE: &str = "secindex";

/// Default index column receiving permission sets.
pub const DEFAULT_INDEX_ID: &str = "allowedRolesAndUsers";

/// Settings for a [`SecurityReindexer`](crate::SecurityReindexer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityIndexConfig {
    /// Registry namespace of the shadow tree.
    pub namespace: String,
    /// Refresh the stored token of every descendant visited during a
    /// propagation pass. When off, only the node that changed gets a new
    /// token and descendants keep the token from their last own update.
    pub refresh_descendant_tokens: bool,
    /// Index columns each update is written to.
    pub index_ids: Vec<String>,
}

impl Default for SecurityIndexConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            refresh_descendant_tokens: true,
            index_ids: vec![DEFAULT_INDEX_ID.to_string()],
        }
    }
}

impl SecurityIndexConfig {
    /// Loads a config from a `.toml` or `.json` file. Missing fields take
    /// their defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: SecurityIndexConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks field values.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(SecIndexError::Config(
                "namespace must not be empty".to_string(),
            ));
        }
        if self.index_ids.is_empty() {
            return Err(SecIndexError::Config(
                "at least one index id is required".to_string(),
            ));
        }
        if self.index_ids.iter().any(|id| id.is_empty()) {
            return Err(SecIndexError::Config(
                "index ids must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
