//! Harness settings
//!
//! Settings live in an optional `vybes.toml` at the repository root. Every field
//! has a default, so a missing file is the common case.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// Settings file name under the repository root
pub const SETTINGS_FILE: &str = "vybes.toml";

/// Configuration run by `--quick` when no configuration is selected
pub const DEFAULT_QUICK_CONFIGURATION: &str = "llxprt-synthetic-glm4.6-temp1";

/// Directory layout and selection defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VybesSettings {
    /// Directory holding the JSON tables, relative to the root
    pub config_dir: PathBuf,

    /// Directory holding `problems/` and `shared/` prompt fragments
    pub prompts_dir: PathBuf,

    /// Directory receiving run archives and result files
    pub outputs_dir: PathBuf,

    /// Configuration id used by `--quick`
    pub quick_configuration: String,
}

impl Default for VybesSettings {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("evals/config"),
            prompts_dir: PathBuf::from("prompts"),
            outputs_dir: PathBuf::from("outputs"),
            quick_configuration: DEFAULT_QUICK_CONFIGURATION.to_string(),
        }
    }
}

impl VybesSettings {
    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let settings: VybesSettings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load `<root>/vybes.toml`, falling back to defaults when absent or invalid
    pub fn load_or_default(root: &Path) -> Self {
        let path = root.join(SETTINGS_FILE);
        if !path.exists() {
            return Self::default();
        }

        match Self::load(&path) {
            Ok(settings) => {
                debug!(path = %path.display(), "Loaded settings");
                settings
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load settings, using defaults");
                Self::default()
            }
        }
    }

    pub fn config_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.config_dir)
    }

    pub fn prompts_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.prompts_dir)
    }

    pub fn outputs_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.outputs_dir)
    }
}
