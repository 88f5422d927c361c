mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

const APP_DIR: &str = "mainlert";

/// Returns the config directory: <config_dir>/mainlert/
pub fn config_dir() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join(APP_DIR);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Returns the config file path: <config_dir>/mainlert/config.toml
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Returns the default store file: <data_dir>/mainlert/store.json
pub fn default_store_path() -> Result<PathBuf> {
    let dir = dirs::data_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?
        .join(APP_DIR);
    std::fs::create_dir_all(&dir)?;
    Ok(dir.join("store.json"))
}

/// Load config from the default location, or return defaults if not found.
pub fn load_config() -> Result<AppConfig> {
    load_config_from(&config_path()?)
}

/// Load config from `path`, or return defaults if it does not exist.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: AppConfig =
            toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
        info!(?path, "Loaded config");
        Ok(config)
    } else {
        info!("No config found, using defaults");
        Ok(AppConfig::default())
    }
}

/// Save config to the default location.
pub fn save_config(config: &AppConfig) -> Result<()> {
    let path = config_path()?;
    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    info!(?path, "Saved config");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let path = std::env::temp_dir().join(format!(
            "mainlert-config-missing-{}.toml",
            std::process::id()
        ));
        let config = load_config_from(&path).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn reads_file_from_disk() {
        let path = std::env::temp_dir().join(format!(
            "mainlert-config-read-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[notifications]\ncooldown_minutes = 5\n").unwrap();

        let config = load_config_from(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.notifications.cooldown_minutes, 5);
        assert_eq!(config.motion, MotionConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let path = std::env::temp_dir().join(format!(
            "mainlert-config-bad-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[motion\n").unwrap();

        let result = load_config_from(&path);
        std::fs::remove_file(&path).ok();

        assert!(result.is_err());
    }
}
