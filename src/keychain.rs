//! OS secret store for the mnemonic.
//!
//! `cybs3 keys login` parks the phrase in the platform keychain so later
//! commands can unlock the config without prompting. Platforms without a
//! usable secret store simply report the backend as unavailable and the
//! session resolver falls through to the interactive prompt.

use tracing::{info, warn};

const SERVICE_NAME: &str = "cybs3";
const ACCOUNT_NAME: &str = "mnemonic";

#[derive(Debug, thiserror::Error)]
pub enum KeychainError {
    #[error("secret store unavailable: {0}")]
    Unavailable(String),
    #[error("secret store error: {0}")]
    Backend(String),
}

/// Interface to an OS-native secret store. A trait seam so tests (and
/// platforms without a keychain) can substitute an in-memory double.
pub trait SecretStore {
    fn save(&self, phrase: &str) -> Result<(), KeychainError>;
    /// `Ok(None)` when nothing is stored; errors only on backend failure.
    fn load(&self) -> Result<Option<String>, KeychainError>;
    fn delete(&self) -> Result<(), KeychainError>;
    fn exists(&self) -> bool;
}

/// Keyring-backed store, one entry per user.
pub struct OsKeychain;

impl OsKeychain {
    /// Probe the platform backend; `None` when no secret store is usable
    /// (headless Linux without a keyring daemon, locked-down sessions).
    pub fn available() -> Option<Self> {
        let entry = match keyring::Entry::new(SERVICE_NAME, "__probe__") {
            Ok(e) => e,
            Err(e) => {
                warn!("keychain probe failed: {e}");
                return None;
            }
        };
        match entry.get_password() {
            Ok(_) | Err(keyring::Error::NoEntry) => Some(Self),
            Err(keyring::Error::NoStorageAccess(_)) | Err(keyring::Error::PlatformFailure(_)) => {
                None
            }
            Err(_) => Some(Self),
        }
    }

    fn entry() -> Result<keyring::Entry, KeychainError> {
        keyring::Entry::new(SERVICE_NAME, ACCOUNT_NAME)
            .map_err(|e| KeychainError::Unavailable(e.to_string()))
    }
}

impl SecretStore for OsKeychain {
    fn save(&self, phrase: &str) -> Result<(), KeychainError> {
        Self::entry()?
            .set_password(phrase)
            .map_err(|e| KeychainError::Backend(e.to_string()))?;
        info!("mnemonic stored in OS secret store");
        Ok(())
    }

    fn load(&self) -> Result<Option<String>, KeychainError> {
        match Self::entry()?.get_password() {
            Ok(phrase) => Ok(Some(phrase)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(KeychainError::Backend(e.to_string())),
        }
    }

    fn delete(&self) -> Result<(), KeychainError> {
        match Self::entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {
                info!("mnemonic removed from OS secret store");
                Ok(())
            }
            Err(e) => Err(KeychainError::Backend(e.to_string())),
        }
    }

    fn exists(&self) -> bool {
        matches!(self.load(), Ok(Some(_)))
    }
}

/// In-memory store for tests and `--no-keychain` runs.
#[derive(Default)]
pub struct MemoryStore {
    phrase: std::sync::Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn with_phrase(phrase: &str) -> Self {
        Self {
            phrase: std::sync::Mutex::new(Some(phrase.to_string())),
        }
    }
}

impl SecretStore for MemoryStore {
    fn save(&self, phrase: &str) -> Result<(), KeychainError> {
        *self.phrase.lock().unwrap() = Some(phrase.to_string());
        Ok(())
    }

    fn load(&self) -> Result<Option<String>, KeychainError> {
        Ok(self.phrase.lock().unwrap().clone())
    }

    fn delete(&self) -> Result<(), KeychainError> {
        *self.phrase.lock().unwrap() = None;
        Ok(())
    }

    fn exists(&self) -> bool {
        self.phrase.lock().unwrap().is_some()
    }
}
