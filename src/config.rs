//! Connection settings persisted next to the catalog database.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

/// Folder name used beneath the user's home directory for application data.
const DATA_DIR_NAME: &str = ".book-catalog";
/// Settings file stored inside the application data directory.
const CONFIG_FILE_NAME: &str = "config.toml";
/// Extension appended to bare database names.
const DB_EXTENSION: &str = "sqlite";

/// The five connection parameters edited through the settings dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub host: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
    pub port: u16,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            user: "root".to_string(),
            password: String::new(),
            database: "library_db".to_string(),
            port: 3306,
        }
    }
}

impl ConnectionSettings {
    /// Resolve the SQLite file that backs the catalog. Absolute paths are
    /// taken as-is; bare names live in `data_dir` and gain a `.sqlite`
    /// extension when they have none.
    pub fn database_path(&self, data_dir: &Path) -> Result<PathBuf> {
        let name = self.database.trim();
        if name.is_empty() {
            return Err(anyhow!("Database name is required."));
        }
        let path = Path::new(name);
        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }
        let mut resolved = data_dir.join(path);
        if resolved.extension().is_none() {
            resolved.set_extension(DB_EXTENSION);
        }
        Ok(resolved)
    }

    /// Human-readable target used in status messages and logs. The password
    /// never appears here.
    pub fn describe(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

/// On-disk layout: a single `[database]` section.
#[derive(Debug, Serialize, Deserialize)]
struct ConfigFile {
    database: ConnectionSettings,
}

/// Resolve the application data directory inside the user's home.
pub fn data_dir() -> Result<PathBuf> {
    let base_dirs = BaseDirs::new().ok_or_else(|| anyhow!("could not locate home directory"))?;
    Ok(base_dirs.home_dir().join(DATA_DIR_NAME))
}

/// Location of the settings file within `data_dir`.
pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE_NAME)
}

/// Read the settings file, writing one with defaults first if it is missing.
pub fn load_or_create(path: &Path) -> Result<ConnectionSettings> {
    if !path.exists() {
        let settings = ConnectionSettings::default();
        save(path, &settings)?;
        tracing::info!(path = %path.display(), "created default connection settings");
        return Ok(settings);
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings from {}", path.display()))?;
    let file: ConfigFile = toml::from_str(&raw)
        .with_context(|| format!("failed to parse settings in {}", path.display()))?;
    Ok(file.database)
}

/// Persist the settings, replacing whatever the file held before.
pub fn save(path: &Path, settings: &ConnectionSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create data directory")?;
    }
    let file = ConfigFile {
        database: settings.clone(),
    };
    let raw = toml::to_string_pretty(&file).context("failed to serialize settings")?;
    fs::write(path, raw)
        .with_context(|| format!("failed to write settings to {}", path.display()))
}
