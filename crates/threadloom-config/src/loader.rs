use std::path::{Path, PathBuf};

use threadloom_common::{Error, Result};
use tracing::info;

use crate::model::AppConfig;

/// File names looked up in the config directory, in order of precedence.
const CONFIG_FILES: &[&str] = &["config.yml", "config.toml"];

/// Reads `AppConfig` from `config.yml` or `config.toml` in one directory.
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .map(|dir| dir.join("threadloom"))
            .ok_or_else(|| {
                Error::Config("no platform config directory; pass --config-dir".into())
            })?;
        Ok(Self { config_dir })
    }

    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// The file `load` will read, or `None` when defaults apply.
    pub fn config_file(&self) -> Option<PathBuf> {
        CONFIG_FILES
            .iter()
            .map(|name| self.config_dir.join(name))
            .find(|path| path.is_file())
    }

    pub fn load(&self) -> Result<AppConfig> {
        let Some(path) = self.config_file() else {
            info!(
                "no config file in {}, using defaults",
                self.config_dir.display()
            );
            return Ok(AppConfig::default());
        };

        info!("loading config from {}", path.display());
        let contents = std::fs::read_to_string(&path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("failed to parse TOML config: {e}"))),
            _ => serde_yaml::from_str(&contents)
                .map_err(|e| Error::Config(format!("failed to parse YAML config: {e}"))),
        }
    }
}
