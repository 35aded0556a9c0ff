//! Sandbox configuration, loaded from JSON.

use std::path::Path;

use kiln_types::{Effect, EffectSet};
use serde::Deserialize;
use thiserror::Error;

use crate::eval::DEFAULT_MAX_CALL_DEPTH;

/// Scripts larger than this many bytes are rejected unless configured.
pub const DEFAULT_MAX_SOURCE_SIZE: usize = 1_000_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("max_call_depth must be at least 1")]
    ZeroDepth,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SandboxConfig {
    pub max_call_depth: usize,
    pub max_source_size: usize,
    /// Effects builtins may perform. Empty means pure evaluation only.
    pub allow: Vec<Effect>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_source_size: DEFAULT_MAX_SOURCE_SIZE,
            allow: Vec::new(),
        }
    }
}

impl SandboxConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_call_depth == 0 {
            return Err(ConfigError::ZeroDepth);
        }
        Ok(())
    }

    pub fn allowed(&self) -> EffectSet {
        self.allow.iter().copied().collect()
    }
}
