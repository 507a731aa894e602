//! Server configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "QUEST_SERVER_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub quests: QuestConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Address the HTTP API listens on
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite connection string
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestConfig {
    /// Quest files are read from `<data_dir>/quests`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Area-locked quests ignore the height axis
    #[serde(default)]
    pub ignore_height: bool,
}

impl Default for QuestConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            ignore_height: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default tracing filter, overridden by RUST_LOG
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

fn default_bind() -> String { "0.0.0.0:2567".to_string() }
fn default_database_url() -> String { "sqlite:quests.db?mode=rwc".to_string() }
fn default_data_dir() -> PathBuf { PathBuf::from("data") }
fn default_filter() -> String { "quest_server=info".to_string() }

impl ServerConfig {
    /// Load from the file named by `QUEST_SERVER_CONFIG`, or `config.toml`.
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self, String> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::from_file(Path::new(&path))
    }

    pub fn from_file(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
        Self::parse(&content).map_err(|e| format!("Failed to parse {:?}: {}", path, e))
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
