//! Centralized path utilities
//!
//! All application paths in one place for consistency

use std::path::PathBuf;

use crate::constants::ui;

/// Get the murmur config directory (~/.murmur)
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(ui::CONFIG_DIR_NAME)
}

/// Get the config file path (~/.murmur/config.toml)
pub fn config_file() -> PathBuf {
    config_dir().join(ui::CONFIG_FILE_NAME)
}

/// Get the logs directory (~/.murmur/logs)
pub fn logs_dir() -> PathBuf {
    config_dir().join("logs")
}

/// Get the log file path (~/.murmur/logs/murmur.log)
pub fn log_file() -> PathBuf {
    logs_dir().join(ui::LOG_FILE_NAME)
}
