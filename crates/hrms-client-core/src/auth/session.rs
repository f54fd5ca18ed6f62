use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::credentials::{CredentialBackend, Credentials};

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub credentials: Credentials,
    pub created_at: DateTime<Utc>,
}

impl SessionData {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            created_at: Utc::now(),
        }
    }

    /// Minutes since the pair was last written (for display)
    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.created_at).num_minutes().max(0)
    }
}

/// Persists the credential pair to `session.json` in the cache directory.
pub struct SessionFileBackend {
    cache_dir: PathBuf,
}

impl SessionFileBackend {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Read the full session record, including when it was written.
    pub fn load_session(&self) -> Result<Option<SessionData>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let data: SessionData =
            serde_json::from_str(&contents).context("Failed to parse session file")?;
        debug!(age_minutes = data.age_minutes(), "Session file loaded");
        Ok(Some(data))
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}

impl CredentialBackend for SessionFileBackend {
    fn load(&self) -> Result<Option<Credentials>> {
        Ok(self.load_session()?.map(|data| data.credentials))
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        let path = self.session_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&SessionData::new(credentials.clone()))?;
        std::fs::write(path, contents).context("Failed to write session file")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path).context("Failed to remove session file")?;
        }
        Ok(())
    }
}
