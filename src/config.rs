use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fuse::MountConfig;
use crate::tree::{CachePolicy, RetryConfig};

static SETTINGS_FILE_NAME: &str = "settings.json";

pub struct ProjectConfig {
    pub settings: Settings,
    pub project_dirs: ProjectDirs,
}

impl ProjectConfig {
    /// Resolve the XDG directories and load settings, from `settings_override`
    /// when given
    pub fn new(settings_override: Option<&Path>) -> Result<Self> {
        let proj_dirs = ProjectDirs::from("com", "onedrive-fuse", "onedrive-fuse")
            .ok_or_else(|| anyhow!("Failed to get project directories"))?;
        for dir in [proj_dirs.config_dir(), proj_dirs.cache_dir(), proj_dirs.data_dir()] {
            if !dir.exists() {
                fs::create_dir_all(dir).context("Failed to create config directory")?;
            }
        }

        let settings_path = settings_override
            .map(Path::to_path_buf)
            .unwrap_or_else(|| proj_dirs.config_dir().join(SETTINGS_FILE_NAME));
        let settings = Settings::new(&settings_path)?;
        Ok(Self {
            settings,
            project_dirs: proj_dirs,
        })
    }

    pub fn config_dir(&self) -> &Path {
        self.project_dirs.config_dir()
    }

    pub fn data_dir(&self) -> &Path {
        self.project_dirs.data_dir()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub log_level: String,
    pub mount: MountSettings,
    pub cache: CacheSettings,
    pub upload: UploadSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            mount: MountSettings::default(),
            cache: CacheSettings::default(),
            upload: UploadSettings::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MountSettings {
    pub fs_name: String,
    pub allow_other: bool,
    pub auto_unmount: bool,
    /// How long the kernel may cache attributes and lookups
    pub attr_ttl_secs: u64,
}

impl Default for MountSettings {
    fn default() -> Self {
        Self {
            fs_name: "onedrive".to_string(),
            allow_other: false,
            auto_unmount: true,
            attr_ttl_secs: 1,
        }
    }
}

impl MountSettings {
    pub fn attr_ttl(&self) -> Duration {
        Duration::from_secs(self.attr_ttl_secs)
    }

    pub fn mount_config(&self) -> MountConfig {
        MountConfig {
            fs_name: self.fs_name.clone(),
            allow_other: self.allow_other,
            auto_unmount: self.auto_unmount,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct CacheSettings {
    /// Refetch directory listings older than this; unset keeps them forever
    pub children_ttl_secs: Option<u64>,
}

impl CacheSettings {
    pub fn policy(&self) -> CachePolicy {
        CachePolicy {
            children_ttl: self.children_ttl_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct UploadSettings {
    pub max_retries: u32,
    /// First retry delay, doubled for every further attempt
    pub retry_delay_ms: u64,
}

impl Default for UploadSettings {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            max_retries: retry.max_retries,
            retry_delay_ms: retry.delay_ms,
        }
    }
}

impl UploadSettings {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            delay_ms: self.retry_delay_ms,
        }
    }
}

impl Settings {
    /// Load settings, writing defaults back when the file is missing or invalid
    pub fn new(config_file_path: &PathBuf) -> Result<Self> {
        match Self::load_settings_from_file(config_file_path) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                warn!("Error loading settings from file - creating default config: {}", e);
                let default = Self::default();
                default.save_to_file(config_file_path)?;
                Ok(default)
            }
        }
    }

    pub fn load_settings_from_file(config_file_path: &PathBuf) -> Result<Self> {
        if !config_file_path.exists() {
            return Err(anyhow!("Config file not found"));
        }
        let data = fs::read_to_string(config_file_path)?;
        let settings: Self = serde_json::from_str(&data)?;
        Ok(settings)
    }

    pub fn save_to_file(&self, config_file_path: &PathBuf) -> Result<()> {
        if let Some(parent_path) = config_file_path.parent() {
            fs::create_dir_all(parent_path).context("Failed to create config directory")?;
        }

        let data = serde_json::to_string_pretty(self)?;
        fs::write(config_file_path, data)?;
        Ok(())
    }
}
