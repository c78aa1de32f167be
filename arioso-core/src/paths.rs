//! Path constants for configuration and store files.

use std::path::PathBuf;

/// The name of the configuration directory under ~/.config/
pub const CONFIG_DIR_NAME: &str = "arioso";

/// The name of the main configuration file
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// The name of the persistent store database file
pub const STORE_DB_FILE_NAME: &str = "store.db";

/// Get the configuration directory path (~/.config/arioso/)
#[must_use]
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join(CONFIG_DIR_NAME)
}

/// Get the config file path (~/.config/arioso/config.toml)
#[must_use]
pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Get the persistent store database path (`~/.config/arioso/store.db`)
#[must_use]
pub fn store_db_path() -> PathBuf {
    config_dir().join(STORE_DB_FILE_NAME)
}
