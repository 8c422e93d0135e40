//! cybs3 — encrypted S3 client core
//!
//! Everything the service ever sees is ciphertext: object bodies are
//! encrypted on this machine with a persistent Data Key, and the Data Key
//! itself lives inside an encrypted configuration file wrapped by a Master
//! Key derived from a 12-word BIP39 mnemonic.
//!
//! Layering, bottom to top:
//!
//! ```text
//! mnemonic   BIP39 validation + Master Key derivation
//! crypto     AES-256-GCM seal/open, key newtype
//! codec      chunked streaming AEAD for object bodies
//! config     encrypted config store (vaults, Data Key)
//! keychain   OS secret store for the mnemonic
//! session    mnemonic/vault/settings resolution
//! s3         SigV4 signer + request composer
//! ```
//!
//! The CLI binary is a thin composition over these modules and owns all
//! terminal I/O; nothing in the library prints.

pub mod codec;
pub mod config;
pub mod crypto;
pub mod keychain;
pub mod mnemonic;
pub mod retry;
pub mod s3;
pub mod session;

pub use codec::{ciphertext_length_for, decrypt_stream, encrypt_stream, plaintext_length_for};
pub use config::{AppSettings, Config, ConfigError, ConfigStore, Vault, CONFIG_VERSION};
pub use crypto::{open, seal, CryptoError, SymmetricKey};
pub use mnemonic::{Mnemonic, MnemonicError};
pub use s3::{ObjectEntry, S3Client, S3Error, S3Settings};
pub use session::{Session, SessionError, SessionOptions};
