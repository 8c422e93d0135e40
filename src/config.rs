//! Encrypted configuration store.
//!
//! Everything the tool needs to remember — vault profiles, defaults, and
//! the persistent Data Key — lives in a single record sealed under the
//! Master Key at `~/.cybs3/config.enc`. The directory is 0700 and the file
//! 0600. Writes go through a temp-file-and-rename so a crash mid-save
//! leaves either the old or the new config on disk, never a torn blob.
//!
//! The Data Key is generated once, at first use, and is deliberately never
//! re-wrapped by routine mutations: rotating the mnemonic re-seals the
//! record (which contains the Data Key) under a new Master Key, but the
//! Data Key bytes are copied verbatim so every previously uploaded object
//! stays decryptable.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use crate::crypto::{open, seal, CryptoError, SymmetricKey, KEY_SIZE};
use crate::mnemonic::Mnemonic;

/// Current on-disk config format version.
pub const CONFIG_VERSION: u32 = 2;

const CONFIG_DIR: &str = ".cybs3";
const CONFIG_FILE: &str = "config.enc";
const LEGACY_SETTINGS_FILE: &str = ".cybs3.json";
const LEGACY_VAULTS_FILE: &str = ".cybs3.vaults";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no configuration found")]
    NotFound,
    #[error("config decryption failed (wrong mnemonic or corrupted file)")]
    DecryptionFailed,
    #[error("unsupported config version {0}")]
    UnsupportedVersion(u32),
    #[error("config encoding error: {0}")]
    Serialization(String),
    #[error("home directory could not be determined")]
    NoHomeDir,
    #[error("config file access failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A named bundle of S3 connection settings.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Vault {
    pub name: String,
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"[REDACTED]")
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .finish()
    }
}

/// Optional global defaults, consulted after vault fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_secret_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_bucket: Option<String>,
}

/// The decrypted configuration record.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub version: u32,
    pub data_key: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_vault_name: Option<String>,
    #[serde(default)]
    pub vaults: Vec<Vault>,
    #[serde(default)]
    pub settings: AppSettings,
}

impl Config {
    /// Empty config around a given Data Key.
    pub fn fresh(data_key: &SymmetricKey) -> Self {
        Self {
            version: CONFIG_VERSION,
            data_key: data_key.as_bytes().to_vec(),
            active_vault_name: None,
            vaults: Vec::new(),
            settings: AppSettings::default(),
        }
    }

    pub fn vault(&self, name: &str) -> Option<&Vault> {
        self.vaults.iter().find(|v| v.name == name)
    }

    pub fn vault_mut(&mut self, name: &str) -> Option<&mut Vault> {
        self.vaults.iter_mut().find(|v| v.name == name)
    }

    fn data_key(&self) -> Result<SymmetricKey, ConfigError> {
        SymmetricKey::from_slice(&self.data_key).ok_or_else(|| {
            ConfigError::Serialization(format!(
                "data key must be {KEY_SIZE} bytes, got {}",
                self.data_key.len()
            ))
        })
    }
}

// The Data Key stays out of Debug output.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("version", &self.version)
            .field("data_key", &"[REDACTED]")
            .field("active_vault_name", &self.active_vault_name)
            .field("vaults", &self.vaults.len())
            .finish()
    }
}

/// Shape of the legacy plaintext settings file `~/.cybs3.json`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacySettings {
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    access_key: Option<String>,
    #[serde(default)]
    secret_key: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    bucket: Option<String>,
}

/// Shape of the legacy encrypted vaults file `~/.cybs3.vaults`.
#[derive(Debug, Deserialize)]
struct LegacyVaults {
    #[allow(dead_code)]
    version: u32,
    #[serde(default)]
    vaults: Vec<Vault>,
}

/// Handle on the on-disk store. Holds only the base directory, so tests
/// can point it at a scratch home.
pub struct ConfigStore {
    home: PathBuf,
}

impl ConfigStore {
    /// Store rooted at the user's home directory.
    pub fn new() -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(Self { home })
    }

    /// Store rooted at an explicit directory.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn config_dir(&self) -> PathBuf {
        self.home.join(CONFIG_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir().join(CONFIG_FILE)
    }

    fn legacy_settings_path(&self) -> PathBuf {
        self.home.join(LEGACY_SETTINGS_FILE)
    }

    fn legacy_vaults_path(&self) -> PathBuf {
        self.home.join(LEGACY_VAULTS_FILE)
    }

    pub fn exists(&self) -> bool {
        self.config_path().is_file()
    }

    /// Load the config, creating a fresh one (or migrating a legacy
    /// install) when none exists yet.
    pub fn load(&self, mnemonic: &Mnemonic) -> Result<(Config, SymmetricKey), ConfigError> {
        self.ensure_dir()?;

        let path = self.config_path();
        if !path.is_file() {
            if self.legacy_settings_path().is_file() || self.legacy_vaults_path().is_file() {
                return self.migrate(mnemonic);
            }

            let data_key = SymmetricKey::generate();
            let config = Config::fresh(&data_key);
            self.save(&config, mnemonic)?;
            info!("initialized fresh config at {}", path.display());
            return Ok((config, data_key));
        }

        let blob = fs::read(&path)?;
        let master_key = mnemonic.derive_master_key();
        let json = open(&master_key, &blob).map_err(|e| match e {
            CryptoError::AuthFailure => ConfigError::DecryptionFailed,
            other => ConfigError::Serialization(other.to_string()),
        })?;

        let config: Config = serde_json::from_slice(&json)
            .map_err(|e| ConfigError::Serialization(e.to_string()))?;
        if config.version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(config.version));
        }

        let data_key = config.data_key()?;
        debug!("loaded config ({} vaults)", config.vaults.len());
        Ok((config, data_key))
    }

    /// Seal and write the config under the mnemonic's Master Key.
    pub fn save(&self, config: &Config, mnemonic: &Mnemonic) -> Result<(), ConfigError> {
        self.ensure_dir()?;

        let json = serde_json::to_vec(config)
            .map_err(|e| ConfigError::Serialization(e.to_string()))?;
        let master_key = mnemonic.derive_master_key();
        let blob = seal(&master_key, &json)
            .map_err(|e| ConfigError::Serialization(e.to_string()))?;

        let path = self.config_path();
        write_atomic(&path, &blob)?;
        set_file_mode(&path)?;
        debug!("saved config to {}", path.display());
        Ok(())
    }

    /// Re-seal the config under a new mnemonic. The Data Key inside is
    /// copied bit-for-bit, so stored objects remain decryptable.
    pub fn rotate_master(
        &self,
        old_mnemonic: &Mnemonic,
        new_mnemonic: &Mnemonic,
    ) -> Result<(), ConfigError> {
        let (config, _) = self.load(old_mnemonic)?;
        self.save(&config, new_mnemonic)?;
        info!("master key rotated");
        Ok(())
    }

    /// Lift a pre-2.x install into the current format.
    ///
    /// The migrated Data Key is `derive_master_key(mnemonic)` rather than
    /// a fresh random key: legacy installs encrypted objects directly
    /// under the derived key, and those uploads must stay readable. The
    /// consequence (documented to users) is that for migrated installs a
    /// later mnemonic rotation does not change which key decrypts objects
    /// uploaded before the migration.
    fn migrate(&self, mnemonic: &Mnemonic) -> Result<(Config, SymmetricKey), ConfigError> {
        let master_key = mnemonic.derive_master_key();
        let mut config = Config::fresh(&master_key);

        let settings_path = self.legacy_settings_path();
        if settings_path.is_file() {
            let raw = fs::read(&settings_path)?;
            let legacy: LegacySettings = serde_json::from_slice(&raw)
                .map_err(|e| ConfigError::Serialization(e.to_string()))?;
            config.settings = AppSettings {
                default_endpoint: legacy.endpoint,
                default_access_key: legacy.access_key,
                default_secret_key: legacy.secret_key,
                default_region: legacy.region,
                default_bucket: legacy.bucket,
            };
        }

        let vaults_path = self.legacy_vaults_path();
        if vaults_path.is_file() {
            let blob = fs::read(&vaults_path)?;
            let json = open(&master_key, &blob).map_err(|e| match e {
                CryptoError::AuthFailure => ConfigError::DecryptionFailed,
                other => ConfigError::Serialization(other.to_string()),
            })?;
            let legacy: LegacyVaults = serde_json::from_slice(&json)
                .map_err(|e| ConfigError::Serialization(e.to_string()))?;
            config.vaults = legacy.vaults;
        }

        self.save(&config, mnemonic)?;

        for path in [settings_path, vaults_path] {
            if path.is_file() {
                let backup = backup_path(&path);
                fs::rename(&path, &backup)?;
                info!("legacy file retired to {}", backup.display());
            }
        }

        info!("migrated legacy config ({} vaults)", config.vaults.len());
        let data_key = config.data_key()?;
        Ok((config, data_key))
    }

    fn ensure_dir(&self) -> Result<(), ConfigError> {
        let dir = self.config_dir();
        if !dir.is_dir() {
            fs::create_dir_all(&dir)?;
        }
        set_dir_mode(&dir)?;
        Ok(())
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".bak");
    path.with_file_name(name)
}

/// Write via a sibling temp file, fsync, then rename over the target.
fn write_atomic(target: &Path, contents: &[u8]) -> Result<(), ConfigError> {
    let parent = target.parent().ok_or_else(|| {
        ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "target path has no parent directory",
        ))
    })?;

    let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_path = parent.join(format!(
        ".{}.tmp-{}-{counter}",
        target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(CONFIG_FILE),
        std::process::id()
    ));

    let mut tmp = fs::File::create(&tmp_path)?;
    if let Err(e) = tmp.write_all(contents).and_then(|_| tmp.sync_all()) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    drop(tmp);

    if let Err(e) = fs::rename(&tmp_path, target) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(unix)]
fn set_file_mode(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_file_mode(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_dir_mode(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_dir_mode(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}
