pub mod config_cmd;
pub mod doctor;
pub mod migrate;
pub mod serve;
pub mod token;

use std::path::{Path, PathBuf};

use faceagent_config::{AppConfig, ConfigError};

/// The config file in effect: `--config` if given, else the default location.
pub fn config_path(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

/// Load the config file in effect with environment overrides applied.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    AppConfig::load_with_env(&config_path(path))
}
