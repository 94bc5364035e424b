use anyhow::{Context, Result};
use directories::BaseDirs;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const CONFIG_FILE_NAME: &str = "plumbob_config.json";
pub const LOG_FILE_NAME: &str = "plumbob.log";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data_path: Option<PathBuf>,
    /// Keys written by other versions; carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AppConfig {
    /// Missing or unreadable config falls back to defaults; only a failed
    /// save is an error.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        let parsed = fs::read_to_string(path)
            .context("read config")
            .and_then(|raw| serde_json::from_str(&raw).context("parse config"));
        match parsed {
            Ok(config) => config,
            Err(err) => {
                warn!("Error reading config {}: {err:#}", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context("create config dir")?;
        }
        let raw = serde_json::to_string_pretty(self).context("serialize config")?;
        fs::write(path, raw).context("write config")?;
        Ok(())
    }
}

/// Directory holding the config, mapping and log files: beside the
/// executable when it can be resolved.
pub fn base_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        return Ok(dir);
    }
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.data_local_dir().join("plumbob"))
}

pub fn config_path(base: &Path) -> PathBuf {
    base.join(CONFIG_FILE_NAME)
}

pub fn log_path(base: &Path) -> PathBuf {
    base.join(LOG_FILE_NAME)
}
