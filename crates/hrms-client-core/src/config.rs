//! Client configuration management.
//!
//! Configuration is stored at `~/.config/hrms-client/config.json` and can be
//! overridden from the environment (`HRMS_API_BASE_URL`,
//! `HRMS_CREDENTIAL_BACKEND`).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::{
    CredentialBackend, CredentialStore, KeyringBackend, MemoryBackend, SessionFileBackend,
};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "hrms-client";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// API location used when nothing else is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:4000/api";

/// 30s allows for slow API responses while failing fast enough for good UX.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Upper bound on a single refresh call; waiters fail instead of hanging.
const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 15;

/// Keychain account used when none is configured
const DEFAULT_ACCOUNT: &str = "default";

pub const BASE_URL_ENV: &str = "HRMS_API_BASE_URL";
pub const CREDENTIAL_BACKEND_ENV: &str = "HRMS_CREDENTIAL_BACKEND";

/// Where the credential pair is persisted between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackendKind {
    Keyring,
    File,
    Memory,
}

impl Default for CredentialBackendKind {
    /// The OS keychain where it outlives the login session (macOS, Windows),
    /// the session file elsewhere. The Linux kernel keyring is cleared on
    /// logout, so it is opt-in there.
    fn default() -> Self {
        if cfg!(any(target_os = "macos", target_os = "windows")) {
            Self::Keyring
        } else {
            Self::File
        }
    }
}

impl std::str::FromStr for CredentialBackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyring" | "keychain" => Ok(Self::Keyring),
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow::anyhow!("Unknown credential backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub refresh_timeout_secs: u64,
    pub credential_backend: CredentialBackendKind,
    pub account: String,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            refresh_timeout_secs: DEFAULT_REFRESH_TIMEOUT_SECS,
            credential_backend: CredentialBackendKind::default(),
            account: DEFAULT_ACCOUNT.to_string(),
            last_username: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply environment overrides on top of the file values.
    pub fn apply_env(mut self) -> Result<Self> {
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.base_url = url.trim().to_string();
            }
        }
        if let Ok(kind) = std::env::var(CREDENTIAL_BACKEND_ENV) {
            self.credential_backend = kind.parse()?;
        }
        Ok(self)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join(&self.account))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }

    pub fn credential_backend(&self) -> Result<Arc<dyn CredentialBackend>> {
        Ok(match self.credential_backend {
            CredentialBackendKind::Keyring => Arc::new(KeyringBackend::new(&self.account)),
            CredentialBackendKind::File => Arc::new(SessionFileBackend::new(self.cache_dir()?)),
            CredentialBackendKind::Memory => Arc::new(MemoryBackend::default()),
        })
    }

    /// Build the credential store and restore any persisted session.
    pub fn credential_store(&self) -> Result<CredentialStore> {
        CredentialStore::load(self.credential_backend()?)
            .context("Failed to restore saved credentials")
    }
}
