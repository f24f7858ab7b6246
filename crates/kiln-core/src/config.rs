//! Operator configuration, loaded once at startup

use crate::lint::LintConfig;
use crate::{CoreError, Result};
use kiln_sandbox::{CapabilitySet, SandboxConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    pub sandbox: SandboxConfig,
    /// Grants handed to every backend
    pub capabilities: CapabilitySet,
    /// Template each request's lint configuration is derived from
    pub lint: LintConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sandbox: SandboxConfig::default(),
            capabilities: CapabilitySet::standard(),
            lint: LintConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// `~/.kiln/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".kiln").join("config.json"))
    }

    /// Load from an explicit path, which must exist
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| CoreError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` if given, else the default location if it exists, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::debug!(path = %path.display(), "loading config");
                Self::from_file(&path)
            }
            _ => Ok(Self::default()),
        }
    }
}
