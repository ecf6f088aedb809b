use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const TOKENS_FILE_NAME: &str = "tokens.json";

/// Tokens persisted between mounts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthConfig {
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry as seconds since the Unix epoch
    pub expires_at: u64,
}

impl AuthConfig {
    /// True when the access token expires within `buffer_secs`
    pub fn expires_within(&self, buffer_secs: u64) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        now + buffer_secs >= self.expires_at
    }
}

/// File-backed token storage, readable only by the owner
pub struct TokenStore {
    file_path: PathBuf,
}

impl TokenStore {
    pub fn new(config_dir: &Path) -> Result<Self> {
        fs::create_dir_all(config_dir).context("Failed to create token directory")?;
        Ok(Self {
            file_path: config_dir.join(TOKENS_FILE_NAME),
        })
    }

    pub fn save_tokens(&self, tokens: &AuthConfig) -> Result<()> {
        let serialized = serde_json::to_string_pretty(tokens)?;
        fs::write(&self.file_path, serialized)
            .with_context(|| format!("Failed to write {}", self.file_path.display()))?;
        fs::set_permissions(&self.file_path, fs::Permissions::from_mode(0o600))?;
        Ok(())
    }

    pub fn load_tokens(&self) -> Result<AuthConfig> {
        if !self.file_path.exists() {
            return Err(anyhow!("No tokens found in {}", self.file_path.display()));
        }
        let data = fs::read_to_string(&self.file_path)?;
        let config = serde_json::from_str(&data).context("Failed to parse stored tokens")?;
        Ok(config)
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}
