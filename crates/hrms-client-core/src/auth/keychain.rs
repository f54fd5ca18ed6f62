use anyhow::{Context, Result};
use keyring::Entry;

use super::credentials::{CredentialBackend, Credentials};

const SERVICE_NAME: &str = "hrms-client";

/// Stores the credential pair in the OS keychain as a JSON secret.
pub struct KeyringBackend {
    account: String,
}

impl KeyringBackend {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(SERVICE_NAME, &self.account).context("Failed to create keyring entry")
    }
}

impl CredentialBackend for KeyringBackend {
    fn load(&self) -> Result<Option<Credentials>> {
        match self.entry()?.get_password() {
            Ok(secret) => {
                let credentials = serde_json::from_str(&secret)
                    .context("Failed to parse credentials from keychain")?;
                Ok(Some(credentials))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve credentials from keychain"),
        }
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        let secret = serde_json::to_string(credentials)?;
        self.entry()?
            .set_password(&secret)
            .context("Failed to store credentials in keychain")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete credentials from keychain"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saved_pair_is_visible_to_new_backend() {
        let account = format!("test-{}", std::process::id());
        let writer = KeyringBackend::new(account.clone());

        // Sandboxed CI may deny access to the platform store entirely
        if let Err(e) = writer.save(&Credentials::new("a1", "r1")) {
            eprintln!("Skipping: platform keychain unavailable: {:#}", e);
            return;
        }

        let reader = KeyringBackend::new(account.clone());
        assert_eq!(reader.load().unwrap(), Some(Credentials::new("a1", "r1")));

        reader.clear().unwrap();
        assert!(KeyringBackend::new(account).load().unwrap().is_none());
        // Clearing twice is fine
        writer.clear().unwrap();
    }
}
