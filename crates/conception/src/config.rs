//! Engine configuration.
//!
//! Every field has a default, so an empty file (or no file at all) gives
//! the stock `HelloWorld` setup:
//!
//! ```toml
//! unit_name = "HelloWorld"
//! toolchain = "seed"
//!
//! [workspace]
//! prefix = "conception-"
//! # root = "/tmp/conception"
//!
//! [execution]
//! timeout_ms = 10000      # 0 disables the timeout
//! max_call_depth = 1024
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use conception_eval::ExecutionLimits;
use serde::Deserialize;

use crate::workspace::{ScratchWorkspace, DEFAULT_PREFIX};

/// Unit compiled and run when nothing else is configured
pub const DEFAULT_UNIT_NAME: &str = "HelloWorld";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read config file.
    #[error("failed to read config file '{}': {source}", .path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML from a file.
    #[error("failed to parse config file '{}': {source}", .path.display())]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Failed to parse TOML from a string.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is not usable.
    #[error("invalid value for '{field}': {message}")]
    Invalid { field: &'static str, message: String },
}

/// Top-level engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Unit the session compiles; also the source file stem.
    pub unit_name: String,
    /// Name of the compiler backend.
    pub toolchain: String,
    pub workspace: WorkspaceConfig,
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkspaceConfig {
    pub prefix: String,
    /// Parent of scratch directories; the system temp directory if unset.
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Wall-clock limit per run in milliseconds; 0 disables it.
    pub timeout_ms: u64,
    pub max_call_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            unit_name: DEFAULT_UNIT_NAME.to_string(),
            toolchain: conception_compiler::Toolchain::DEFAULT.to_string(),
            workspace: WorkspaceConfig::default(),
            execution: ExecutionConfig::default(),
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            root: None,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        let limits = ExecutionLimits::default();
        Self {
            timeout_ms: limits.timeout.map_or(0, |t| t.as_millis() as u64),
            max_call_depth: limits.max_call_depth,
        }
    }
}

impl EngineConfig {
    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        tracing::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate config text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot: names and limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !conception_compiler::is_unit_name(&self.unit_name) {
            return Err(ConfigError::Invalid {
                field: "unit_name",
                message: format!("`{}` is not a valid unit name", self.unit_name),
            });
        }
        if self.workspace.prefix.contains(['/', '\\']) {
            return Err(ConfigError::Invalid {
                field: "workspace.prefix",
                message: "must not contain path separators".to_string(),
            });
        }
        if self.execution.max_call_depth == 0 {
            return Err(ConfigError::Invalid {
                field: "execution.max_call_depth",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn scratch_workspace(&self) -> ScratchWorkspace {
        let scratch = ScratchWorkspace::new().with_prefix(&self.workspace.prefix);
        match &self.workspace.root {
            Some(root) => scratch.with_root(root),
            None => scratch,
        }
    }
}

impl ExecutionConfig {
    pub fn limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            timeout: (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms)),
            max_call_depth: self.max_call_depth,
        }
    }
}
