//! Session resolution: everything a command needs before it can touch S3.
//!
//! Resolution happens in a fixed order: find a mnemonic (environment,
//! then OS secret store, then interactive prompt), unlock the config
//! store with it, pick the active vault, then assemble the effective S3
//! settings field by field. A source that is *absent* falls through to
//! the next one; a source that yields an *invalid* mnemonic is fatal, so
//! a typo never silently degrades into a prompt.

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;
use url::Url;

use crate::config::{Config, ConfigError, ConfigStore, Vault};
use crate::crypto::SymmetricKey;
use crate::keychain::{KeychainError, SecretStore};
use crate::mnemonic::{Mnemonic, MnemonicError};
use crate::s3::{S3Client, S3Error, S3Settings};

/// Environment variable holding the mnemonic, words separated by spaces.
pub const MNEMONIC_ENV: &str = "CYBS3_MNEMONIC";

const FALLBACK_REGION: &str = "us-east-1";
const FALLBACK_ENDPOINT: &str = "s3.amazonaws.com";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("vault not found: {0}")]
    VaultNotFound(String),
    #[error("a mnemonic is required; set {MNEMONIC_ENV}, run `keys login`, or answer the prompt")]
    MnemonicRequired,
    #[error("cancelled")]
    UserCancelled,
    #[error("mnemonic prompt failed: {0}")]
    PromptFailed(String),
    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Mnemonic(#[from] MnemonicError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Keychain(#[from] KeychainError),
    #[error(transparent)]
    S3(#[from] S3Error),
}

/// Per-invocation overrides, straight from CLI flags. `None` means the
/// flag was not given; empty strings are treated as unset.
#[derive(Debug, Default, Clone)]
pub struct SessionOptions {
    pub vault: Option<String>,
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: Option<String>,
    pub bucket: Option<String>,
}

/// A resolved session: an S3 client plus the unlocked key material.
pub struct Session {
    pub client: S3Client,
    pub data_key: SymmetricKey,
    pub config: Config,
    pub active_vault: Option<String>,
    pub bucket: Option<String>,
}

/// Source the mnemonic with the standard priority. `prompt` is supplied
/// by the CLI (the library owns no terminal); `None` makes an absent
/// mnemonic fatal, for non-interactive use.
pub fn resolve_mnemonic(
    keychain: Option<&dyn SecretStore>,
    prompt: Option<&dyn Fn() -> std::io::Result<String>>,
) -> Result<Mnemonic, SessionError> {
    if let Ok(raw) = std::env::var(MNEMONIC_ENV) {
        if !raw.trim().is_empty() {
            debug!("mnemonic sourced from {MNEMONIC_ENV}");
            return Ok(Mnemonic::parse(&raw)?);
        }
    }

    if let Some(store) = keychain {
        if let Some(phrase) = store.load()? {
            debug!("mnemonic sourced from OS secret store");
            return Ok(Mnemonic::parse(&phrase)?);
        }
    }

    let prompt = prompt.ok_or(SessionError::MnemonicRequired)?;
    let phrase = prompt().map_err(|e| SessionError::PromptFailed(e.to_string()))?;
    if phrase.trim().is_empty() {
        return Err(SessionError::UserCancelled);
    }
    Ok(Mnemonic::parse(&phrase)?)
}

/// Resolve a full session: mnemonic → config → vault → effective
/// settings → client handle.
pub fn resolve(
    options: &SessionOptions,
    store: &ConfigStore,
    keychain: Option<&dyn SecretStore>,
    prompt: Option<&dyn Fn() -> std::io::Result<String>>,
) -> Result<Session, SessionError> {
    let mnemonic = resolve_mnemonic(keychain, prompt)?;
    let (config, data_key) = store.load(&mnemonic)?;

    let active_vault = select_vault(options.vault.as_deref(), &config)?;
    let vault = active_vault.as_deref().and_then(|name| config.vault(name));

    let env = EnvOverrides::capture();
    let settings = effective_settings(options, &env, vault, &config)?;
    debug!(
        "session resolved: endpoint={} region={} vault={:?}",
        settings.host, settings.region, active_vault
    );

    let bucket = settings.bucket.clone();
    let client = S3Client::new(settings)?;

    Ok(Session {
        client,
        data_key,
        config,
        active_vault,
        bucket,
    })
}

/// Pick the active vault name. An explicit name that does not resolve is
/// fatal; so is a stale `activeVaultName` left in the config.
fn select_vault(explicit: Option<&str>, config: &Config) -> Result<Option<String>, SessionError> {
    let name = match explicit {
        Some(name) => Some(name.to_string()),
        None => config.active_vault_name.clone(),
    };
    if let Some(ref name) = name {
        if config.vault(name).is_none() {
            return Err(SessionError::VaultNotFound(name.clone()));
        }
    }
    Ok(name)
}

/// Values captured from the AWS environment variables.
#[derive(Debug, Default)]
struct EnvOverrides {
    access_key: Option<String>,
    secret_key: Option<String>,
    region: Option<String>,
    bucket: Option<String>,
}

impl EnvOverrides {
    fn capture() -> Self {
        Self {
            access_key: std::env::var("AWS_ACCESS_KEY_ID").ok(),
            secret_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
            region: std::env::var("AWS_REGION").ok(),
            bucket: std::env::var("AWS_BUCKET").ok(),
        }
    }
}

/// First value in priority order that is set and non-empty.
fn pick(candidates: &[Option<&str>]) -> Option<String> {
    candidates
        .iter()
        .flatten()
        .find(|v| !v.trim().is_empty())
        .map(|v| v.trim().to_string())
}

fn effective_settings(
    options: &SessionOptions,
    env: &EnvOverrides,
    vault: Option<&Vault>,
    config: &Config,
) -> Result<S3Settings, SessionError> {
    let defaults = &config.settings;

    let endpoint = pick(&[
        options.endpoint.as_deref(),
        vault.map(|v| v.endpoint.as_str()),
        defaults.default_endpoint.as_deref(),
    ])
    .unwrap_or_else(|| FALLBACK_ENDPOINT.to_string());

    let region = pick(&[
        options.region.as_deref(),
        env.region.as_deref(),
        vault.map(|v| v.region.as_str()),
        defaults.default_region.as_deref(),
    ])
    .unwrap_or_else(|| FALLBACK_REGION.to_string());

    let access_key = pick(&[
        options.access_key.as_deref(),
        env.access_key.as_deref(),
        vault.map(|v| v.access_key.as_str()),
        defaults.default_access_key.as_deref(),
    ])
    .unwrap_or_default();

    let secret_key = pick(&[
        options.secret_key.as_deref(),
        env.secret_key.as_deref(),
        vault.map(|v| v.secret_key.as_str()),
        defaults.default_secret_key.as_deref(),
    ])
    .unwrap_or_default();

    let bucket = pick(&[
        options.bucket.as_deref(),
        env.bucket.as_deref(),
        vault.and_then(|v| v.bucket.as_deref()),
        defaults.default_bucket.as_deref(),
    ]);

    let (host, port, use_ssl) = parse_endpoint(&endpoint)?;

    Ok(S3Settings {
        host,
        port,
        use_ssl,
        region,
        access_key,
        secret_key: SecretString::from(secret_key),
        bucket,
    })
}

/// Split an endpoint into host, port and TLS flag. A bare hostname gets
/// `https://`; port defaults follow the scheme.
fn parse_endpoint(endpoint: &str) -> Result<(String, u16, bool), SessionError> {
    let with_scheme = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("https://{endpoint}")
    };

    let url =
        Url::parse(&with_scheme).map_err(|e| SessionError::InvalidUrl(format!("{endpoint}: {e}")))?;

    let use_ssl = match url.scheme() {
        "https" => true,
        "http" => false,
        other => {
            return Err(SessionError::InvalidUrl(format!(
                "{endpoint}: unsupported scheme '{other}'"
            )))
        }
    };
    let host = url
        .host_str()
        .ok_or_else(|| SessionError::InvalidUrl(format!("{endpoint}: missing host")))?
        .to_string();
    let port = url.port().unwrap_or(if use_ssl { 443 } else { 80 });

    Ok((host, port, use_ssl))
}

/// Expose the resolved secret for callers that print redacted config
/// summaries. Never logged.
pub fn redact_secret(secret: &SecretString) -> String {
    let raw = secret.expose_secret();
    if raw.len() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", &raw[..4])
    }
}
