use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockWriteGuard};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Access/refresh token pair for an authenticated session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

// Tokens stay out of logs
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Durable storage behind the [`CredentialStore`].
pub trait CredentialBackend: Send + Sync {
    fn load(&self) -> Result<Option<Credentials>>;
    fn save(&self, credentials: &Credentials) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Backend that keeps nothing beyond the process lifetime.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    saved: Mutex<Option<Credentials>>,
}

impl CredentialBackend for MemoryBackend {
    fn load(&self) -> Result<Option<Credentials>> {
        Ok(self
            .saved
            .lock()
            .map_err(|_| anyhow::anyhow!("memory backend lock poisoned"))?
            .clone())
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        *self
            .saved
            .lock()
            .map_err(|_| anyhow::anyhow!("memory backend lock poisoned"))? = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self
            .saved
            .lock()
            .map_err(|_| anyhow::anyhow!("memory backend lock poisoned"))? = None;
        Ok(())
    }
}

/// Holds the current credential pair.
///
/// The pair is replaced as a whole under a single lock, so readers never
/// observe an access token from one pair with the refresh token of another.
/// Every change is then mirrored to the backend outside that lock, so
/// readers never wait on keychain or file I/O.
pub struct CredentialStore {
    current: RwLock<Option<Credentials>>,
    persist: Mutex<()>,
    backend: Arc<dyn CredentialBackend>,
}

impl CredentialStore {
    /// Create an empty store without reading the backend.
    pub fn new(backend: Arc<dyn CredentialBackend>) -> Self {
        Self {
            current: RwLock::new(None),
            persist: Mutex::new(()),
            backend,
        }
    }

    /// Create a store that is never persisted.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::default()))
    }

    /// Create a store hydrated from whatever the backend persisted last.
    pub fn load(backend: Arc<dyn CredentialBackend>) -> Result<Self> {
        let saved = backend.load()?;
        debug!(found = saved.is_some(), "Credential store loaded");
        Ok(Self {
            current: RwLock::new(saved),
            persist: Mutex::new(()),
            backend,
        })
    }

    pub fn get(&self) -> Option<Credentials> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set(&self, credentials: Credentials) {
        let _persist = self.lock_persist();
        *self.write_current() = Some(credentials.clone());
        if let Err(e) = self.backend.save(&credentials) {
            warn!(error = %e, "Failed to persist credentials");
        }
        info!("Credentials stored");
    }

    pub fn clear(&self) {
        let _persist = self.lock_persist();
        *self.write_current() = None;
        if let Err(e) = self.backend.clear() {
            warn!(error = %e, "Failed to clear persisted credentials");
        }
        info!("Credentials cleared");
    }

    fn write_current(&self) -> RwLockWriteGuard<'_, Option<Credentials>> {
        self.current.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serializes backend writes so the persisted pair follows the cached one.
    fn lock_persist(&self) -> MutexGuard<'_, ()> {
        self.persist.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_authenticated(&self) -> bool {
        self.get().is_some()
    }

    pub fn access_token(&self) -> Option<String> {
        self.get().map(|c| c.access_token)
    }
}
