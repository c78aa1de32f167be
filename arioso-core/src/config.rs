use crate::error::{CoreError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub prefetch: PrefetchConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the self-hosted catalog gateway
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_base_url() -> String {
    "http://127.0.0.1:3000".into()
}

const fn default_timeout() -> u64 {
    10
}

const fn default_max_retries() -> u32 {
    3
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefetchConfig {
    /// Tracks resolved behind the current queue position
    #[serde(default = "default_behind")]
    pub behind: usize,
    /// Tracks resolved ahead of the current queue position.
    /// Forward skips dominate backward skips, so ahead > behind.
    #[serde(default = "default_ahead")]
    pub ahead: usize,
    /// How long a resolved audio locator stays usable
    #[serde(default = "default_locator_ttl")]
    pub locator_ttl_secs: u64,
    /// Deferral between chain steps so prefetch never competes with
    /// interactive work
    #[serde(default = "default_step_delay")]
    pub step_delay_ms: u64,
}

const fn default_behind() -> usize {
    1
}

const fn default_ahead() -> usize {
    2
}

const fn default_locator_ttl() -> u64 {
    1200
}

const fn default_step_delay() -> u64 {
    250
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            behind: default_behind(),
            ahead: default_ahead(),
            locator_ttl_secs: default_locator_ttl(),
            step_delay_ms: default_step_delay(),
        }
    }
}

impl PrefetchConfig {
    #[must_use]
    pub const fn locator_ttl(&self) -> Duration {
        Duration::from_secs(self.locator_ttl_secs)
    }

    #[must_use]
    pub const fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Overrides the default store location under the config directory
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl StorageConfig {
    /// The store database path, honoring the override when set.
    #[must_use]
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(paths::store_db_path)
    }
}

impl Config {
    /// Load the configuration from the default location.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigNotFound`] after writing a template if the
    /// file does not exist yet, or a parse error for invalid TOML.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Load the configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigNotFound`] after writing a template if the
    /// file does not exist yet, or a parse error for invalid TOML.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, build_config_template())?;
            return Err(CoreError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}

/// Build the commented template written on first run.
#[must_use]
pub fn build_config_template() -> String {
    format!(
        r#"# arioso configuration

[provider]
# Base URL of your catalog gateway
base_url = "{base_url}"
timeout_secs = {timeout}
max_retries = {retries}

[prefetch]
# Queue neighbors resolved around the playing track
behind = {behind}
ahead = {ahead}
# Resolved stream URLs expire server-side; keep this below the gateway's limit
locator_ttl_secs = {ttl}
# Pause between prefetch steps (milliseconds)
step_delay_ms = {delay}

[storage]
# Uncomment to relocate the persistent store
# db_path = "/path/to/store.db"
"#,
        base_url = default_base_url(),
        timeout = default_timeout(),
        retries = default_max_retries(),
        behind = default_behind(),
        ahead = default_ahead(),
        ttl = default_locator_ttl(),
        delay = default_step_delay(),
    )
}
