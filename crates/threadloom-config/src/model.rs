use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use threadloom_common::ForeignKeyMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub import: ImportConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub log_level: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            import: ImportConfig::default(),
            database: DatabaseConfig::default(),
            log_level: Some("info".to_string()),
        }
    }
}

/// Where archives are read from and how each file is applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Directory scanned for archive files. Defaults to `data`.
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,

    /// File extension (without the dot) that marks an archive. Defaults to `json`.
    #[serde(default = "default_extension")]
    pub extension: String,

    #[serde(default)]
    pub recursive: bool,

    #[serde(default)]
    pub foreign_keys: ForeignKeyMode,

    /// Roll back every file's transaction instead of committing it.
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            extension: default_extension(),
            recursive: false,
            foreign_keys: ForeignKeyMode::default(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file the archives are loaded into. Defaults to `from_json_files.db`.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_extension() -> String {
    "json".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("from_json_files.db")
}
