//! AES-256-GCM primitives shared by the config store and the stream codec.
//!
//! Blobs are self-contained: `nonce(12) ∥ ciphertext ∥ tag(16)`. Every seal
//! draws a fresh random nonce; there is no per-key counter. Random 96-bit
//! nonces stay collision-safe up to roughly 2^32 seals per key, which at
//! one seal per 1 MiB chunk bounds a single Data Key to ~4 PiB of traffic.

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::{aead::Aead, Aes256Gcm, KeyInit};
use zeroize::Zeroize;

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;
/// Bytes a sealed blob adds on top of its plaintext.
pub const SEAL_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("AEAD authentication failed")]
    AuthFailure,
    #[error("ciphertext ends inside a frame")]
    Truncated,
    #[error("AEAD encryption failed")]
    SealFailure,
    #[error("upstream read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A 256-bit symmetric key (Master Key or Data Key).
///
/// Zeroized on drop; `Debug` is redacted so the key can never leak through
/// logging or error formatting.
#[derive(Clone)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Accepts exactly 32 bytes; anything else is `None`.
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; KEY_SIZE] = slice.try_into().ok()?;
        Some(Self { bytes })
    }

    /// Fresh random key from OS entropy.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Encrypt `plaintext`, returning the combined `nonce ∥ ciphertext ∥ tag`.
pub fn seal(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    use rand::RngCore;

    let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = GenericArray::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::SealFailure)?;

    let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Decrypt a combined blob produced by [`seal`].
///
/// Fails with [`CryptoError::AuthFailure`] when the blob is shorter than
/// the seal overhead or the tag does not verify. No plaintext is ever
/// returned from a blob that failed authentication.
pub fn open(key: &SymmetricKey, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if blob.len() < SEAL_OVERHEAD {
        return Err(CryptoError::AuthFailure);
    }

    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_SIZE);
    let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));
    let nonce = GenericArray::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::AuthFailure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_round_trip() {
        let key = SymmetricKey::generate();
        let plaintext = b"the service only ever sees ciphertext";

        let blob = seal(&key, plaintext).unwrap();
        assert_eq!(blob.len(), plaintext.len() + SEAL_OVERHEAD);

        let recovered = open(&key, &blob).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn seal_empty_plaintext() {
        let key = SymmetricKey::generate();
        let blob = seal(&key, b"").unwrap();
        assert_eq!(blob.len(), SEAL_OVERHEAD);
        assert_eq!(open(&key, &blob).unwrap(), b"");
    }

    #[test]
    fn nonces_are_fresh_per_seal() {
        let key = SymmetricKey::generate();
        let a = seal(&key, b"same input").unwrap();
        let b = seal(&key, b"same input").unwrap();
        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
        assert_ne!(a, b);
    }

    #[test]
    fn open_rejects_wrong_key() {
        let blob = seal(&SymmetricKey::generate(), b"secret").unwrap();
        assert!(matches!(
            open(&SymmetricKey::generate(), &blob),
            Err(CryptoError::AuthFailure)
        ));
    }

    #[test]
    fn open_rejects_flipped_tag() {
        let key = SymmetricKey::generate();
        let mut blob = seal(&key, b"secret").unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0xff;
        assert!(matches!(open(&key, &blob), Err(CryptoError::AuthFailure)));
    }

    #[test]
    fn open_rejects_short_blob() {
        let key = SymmetricKey::generate();
        assert!(matches!(
            open(&key, &[0u8; SEAL_OVERHEAD - 1]),
            Err(CryptoError::AuthFailure)
        ));
    }

    #[test]
    fn generated_keys_look_uniform() {
        // Pool 64 keys and check the empirical byte distribution. 2 KiB of
        // uniform bytes gives ~7.9 bits/byte, comfortably above the bound.
        let mut pool = Vec::with_capacity(64 * KEY_SIZE);
        for _ in 0..64 {
            pool.extend_from_slice(SymmetricKey::generate().as_bytes());
        }

        let mut counts = [0u32; 256];
        for &b in &pool {
            counts[b as usize] += 1;
        }
        let n = pool.len() as f64;
        let entropy: f64 = counts
            .iter()
            .filter(|&&c| c > 0)
            .map(|&c| {
                let p = c as f64 / n;
                -p * p.log2()
            })
            .sum();
        assert!(entropy >= 7.5, "entropy {entropy:.2} bits/byte too low");
    }

    #[test]
    fn key_debug_is_redacted() {
        let key = SymmetricKey::from_bytes([0xAB; KEY_SIZE]);
        let rendered = format!("{key:?}");
        assert!(!rendered.contains("171"));
        assert!(rendered.contains("REDACTED"));
    }
}
