use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Simple configuration for stash
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Overrides the platform data directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub images: ImageConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Longest edge of a stored image, in pixels
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,

    /// JPEG quality used for every stored image (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_dimension: default_max_dimension(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_dimension() -> u32 {
    2048
}

fn default_jpeg_quality() -> u8 {
    70
}

fn default_max_connections() -> u32 {
    1
}

/// Locations of everything stash keeps on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub root: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Blob store directory
    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn database(&self) -> PathBuf {
        self.root.join("inventory.db")
    }

    /// Staging directory filled during export
    pub fn export_dir(&self) -> PathBuf {
        self.root.join("export")
    }

    /// Staging directory filled during import
    pub fn import_dir(&self) -> PathBuf {
        self.root.join("import")
    }

    /// Directory receiving finished export archives
    pub fn archives_dir(&self) -> PathBuf {
        self.root.clone()
    }
}

impl Config {
    /// Load config from default location or create default if not found
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path();

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            // Create default config file
            let config = Config::default();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let content = toml::to_string_pretty(&config)?;
            std::fs::write(&path, content)?;
            Ok(config)
        }
    }

    /// Get config file path
    pub fn config_path() -> PathBuf {
        if let Some(dirs) = Self::project_dirs() {
            dirs.config_dir().join("config.toml")
        } else {
            PathBuf::from("~/.stash/config.toml")
        }
    }

    /// Resolve the data directory, honouring `data_dir` if set
    pub fn data_paths(&self) -> DataPaths {
        if let Some(dir) = &self.data_dir {
            return DataPaths::new(dir.clone());
        }
        match Self::project_dirs() {
            Some(dirs) => DataPaths::new(dirs.data_dir()),
            None => DataPaths::new("~/.stash"),
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "stash", "stash")
    }
}
