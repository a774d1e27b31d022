//! Engine configuration

use crate::core::DEFAULT_STEP_TIMEOUT;
use std::path::PathBuf;
use std::time::Duration;

/// Default directory for history and workspaces
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pushdeploy")
}

/// Configuration for the execution engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Timeout for steps that declare none (and whose pipeline declares none)
    pub default_timeout: Duration,

    /// Directory under which per-run working directories are allocated
    pub workspace_root: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_STEP_TIMEOUT,
            workspace_root: default_data_dir().join("workspaces"),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }
}
