//! BIP39 mnemonic handling and Master Key derivation.
//!
//! A mnemonic is 12 lowercase English words carrying 128 bits of entropy
//! plus a 4-bit checksum. It is the only credential the user has to keep:
//! the Master Key that wraps the local configuration is a pure function of
//! the phrase. The phrase itself is never persisted in plaintext.

use bip39::Language;
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::crypto::{SymmetricKey, KEY_SIZE};

/// Expected phrase length. 12 words = 128 bits of entropy.
pub const WORD_COUNT: usize = 12;

/// HKDF salt that domain-separates the Master Key from the raw BIP39 seed.
/// Future sibling keys (e.g. a signing key) would use a different salt
/// over the same seed.
const MASTER_KEY_SALT: &[u8] = b"cybs3-vault";

#[derive(Debug, thiserror::Error)]
pub enum MnemonicError {
    #[error("mnemonic must have {WORD_COUNT} words, got {0}")]
    InvalidWordCount(usize),
    #[error("'{0}' is not a BIP39 English word")]
    InvalidWord(String),
    #[error("mnemonic checksum mismatch")]
    InvalidChecksum,
    #[error("invalid mnemonic: {0}")]
    Invalid(String),
}

/// A validated 12-word BIP39 English phrase.
///
/// Construction goes through [`Mnemonic::parse`] or [`Mnemonic::generate`],
/// so holding one is proof the checksum verified.
#[derive(Clone)]
pub struct Mnemonic {
    inner: bip39::Mnemonic,
}

impl Mnemonic {
    /// Parse and validate a phrase. Words are lowercased and joined by
    /// single spaces before validation, so env-var and prompt input with
    /// stray whitespace is accepted.
    pub fn parse(phrase: &str) -> Result<Self, MnemonicError> {
        let words: Vec<String> = phrase
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect();

        if words.len() != WORD_COUNT {
            return Err(MnemonicError::InvalidWordCount(words.len()));
        }

        let normalized = words.join(" ");
        let inner = bip39::Mnemonic::parse_in_normalized(Language::English, &normalized)
            .map_err(|e| match e {
                bip39::Error::BadWordCount(n) => MnemonicError::InvalidWordCount(n),
                bip39::Error::UnknownWord(index) => {
                    MnemonicError::InvalidWord(words[index].clone())
                }
                bip39::Error::InvalidChecksum => MnemonicError::InvalidChecksum,
                other => MnemonicError::Invalid(other.to_string()),
            })?;

        Ok(Self { inner })
    }

    /// Generate a fresh phrase from 128 bits of OS entropy.
    pub fn generate() -> Result<Self, MnemonicError> {
        use rand::RngCore;

        let mut entropy = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut entropy);

        let inner = bip39::Mnemonic::from_entropy_in(Language::English, &entropy)
            .map_err(|e| MnemonicError::Invalid(e.to_string()))?;
        entropy.zeroize();

        Ok(Self { inner })
    }

    /// The phrase as lowercase words joined by single spaces.
    pub fn phrase(&self) -> String {
        self.inner.to_string()
    }

    /// Derive the 32-byte Master Key.
    ///
    /// Step 1 is the standard BIP39 seed (PBKDF2-HMAC-SHA512, 2048
    /// iterations, salt `"mnemonic"`, no passphrase); step 2 narrows the
    /// 64-byte seed to a 32-byte application key with HKDF-SHA256 under
    /// [`MASTER_KEY_SALT`]. Deterministic: same phrase, same key.
    pub fn derive_master_key(&self) -> SymmetricKey {
        let mut seed = self.inner.to_seed("");

        let hk = Hkdf::<Sha256>::new(Some(MASTER_KEY_SALT), &seed);
        let mut key = [0u8; KEY_SIZE];
        hk.expand(&[], &mut key)
            .expect("32 bytes is a valid HKDF-SHA256 output length");
        seed.zeroize();

        SymmetricKey::from_bytes(key)
    }
}

impl std::fmt::Debug for Mnemonic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mnemonic").field("phrase", &"[REDACTED]").finish()
    }
}
