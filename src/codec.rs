//! Chunked streaming AEAD codec for object bodies.
//!
//! Encrypted object layout — a bare concatenation of frames, no header,
//! no magic, no version byte:
//!
//! ```text
//! +--------- 12B ---------+----------- N bytes -----------+---- 16B ----+
//! |   random nonce        |   ciphertext (same length     |   GCM tag   |
//! |                       |   as the plaintext chunk)     |             |
//! +-----------------------+-------------------------------+-------------+
//! ```
//!
//! Non-terminal frames carry exactly [`CHUNK_SIZE`] plaintext bytes; the
//! final frame carries whatever remains (1..=CHUNK_SIZE). An empty object
//! has zero frames. Each frame is independently authenticated; there is no
//! cross-frame chaining, so frame reordering by an attacker with write
//! access to the stored object is not detected. The threat model is the
//! storage provider reading data at rest, with TLS covering the transport.
//!
//! Both directions run in bounded memory and tolerate arbitrary rechunking
//! by the transport: the decoder reassembles frames from whatever slice
//! boundaries the HTTP stack delivers.

use bytes::{Bytes, BytesMut};
use futures_util::stream::{Stream, StreamExt};
use std::pin::Pin;

use crate::crypto::{open, seal, CryptoError, SymmetricKey, SEAL_OVERHEAD};

/// Plaintext bytes per non-terminal frame: 1 MiB.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Bytes each frame adds on top of its plaintext chunk.
pub const FRAME_OVERHEAD: usize = SEAL_OVERHEAD;

/// On-wire size of a full (non-terminal) frame.
pub const FRAME_SIZE: usize = CHUNK_SIZE + FRAME_OVERHEAD;

/// A lazy byte sequence: the shape shared by file readers, HTTP response
/// bodies, and both codec directions.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Encrypted object length for a plaintext of `plaintext_len` bytes.
///
/// Pure arithmetic — the signed upload needs `Content-Length` before a
/// single plaintext byte has been read.
pub fn ciphertext_length_for(plaintext_len: u64) -> u64 {
    if plaintext_len == 0 {
        return 0;
    }
    let chunk = CHUNK_SIZE as u64;
    let overhead = FRAME_OVERHEAD as u64;
    let full_frames = plaintext_len / chunk;
    let remainder = plaintext_len % chunk;

    let mut total = full_frames * (chunk + overhead);
    if remainder != 0 {
        total += remainder + overhead;
    }
    total
}

/// Inverse of [`ciphertext_length_for`]: the plaintext length encoded by a
/// stored object of `ciphertext_len` bytes, or `None` if no plaintext
/// length produces that ciphertext length.
pub fn plaintext_length_for(ciphertext_len: u64) -> Option<u64> {
    if ciphertext_len == 0 {
        return Some(0);
    }
    let frame = FRAME_SIZE as u64;
    let overhead = FRAME_OVERHEAD as u64;
    let full_frames = ciphertext_len / frame;
    let remainder = ciphertext_len % frame;

    let plaintext = full_frames * CHUNK_SIZE as u64;
    if remainder == 0 {
        Some(plaintext)
    } else if remainder > overhead {
        Some(plaintext + remainder - overhead)
    } else {
        // A final frame carries at least one plaintext byte.
        None
    }
}

struct EncryptState<S> {
    key: SymmetricKey,
    upstream: S,
    buffer: BytesMut,
    upstream_done: bool,
}

/// Encrypt `upstream` into a sequence of frames.
///
/// Single-pass and non-restartable. Each item of the output stream is one
/// whole frame; downstream may rechunk freely. Memory use is one chunk
/// plus whatever slice the upstream hands over.
pub fn encrypt_stream<S>(
    key: SymmetricKey,
    upstream: S,
) -> impl Stream<Item = Result<Bytes, CryptoError>> + Send
where
    S: Stream<Item = std::io::Result<Bytes>> + Send + Unpin + 'static,
{
    let state = EncryptState {
        key,
        upstream,
        buffer: BytesMut::with_capacity(CHUNK_SIZE),
        upstream_done: false,
    };

    futures_util::stream::try_unfold(state, |mut st| async move {
        loop {
            if st.buffer.len() >= CHUNK_SIZE {
                let chunk = st.buffer.split_to(CHUNK_SIZE);
                let frame = seal(&st.key, &chunk)?;
                return Ok(Some((Bytes::from(frame), st)));
            }

            if st.upstream_done {
                if st.buffer.is_empty() {
                    return Ok(None);
                }
                let chunk = st.buffer.split();
                let frame = seal(&st.key, &chunk)?;
                return Ok(Some((Bytes::from(frame), st)));
            }

            match st.upstream.next().await {
                Some(Ok(bytes)) => st.buffer.extend_from_slice(&bytes),
                Some(Err(e)) => return Err(CryptoError::Io(e)),
                None => st.upstream_done = true,
            }
        }
    })
}

struct DecryptState<S> {
    key: SymmetricKey,
    upstream: S,
    buffer: BytesMut,
    upstream_done: bool,
}

/// Decrypt a frame sequence back into plaintext.
///
/// Transport-tolerant: the upstream may deliver the ciphertext as one
/// slab, byte by byte, or any mix — frames are carved out of an internal
/// buffer once [`FRAME_SIZE`] bytes are available, and the residue at
/// end-of-stream is opened as the final short frame. No plaintext is
/// yielded before its frame's tag has verified; the first failure aborts
/// the stream.
///
/// End-of-stream rules: an empty residue finishes cleanly, fewer than
/// [`FRAME_OVERHEAD`] residual bytes is [`CryptoError::Truncated`], and a
/// residue cut inside the final frame fails authentication.
pub fn decrypt_stream<S>(
    key: SymmetricKey,
    upstream: S,
) -> impl Stream<Item = Result<Bytes, CryptoError>> + Send
where
    S: Stream<Item = std::io::Result<Bytes>> + Send + Unpin + 'static,
{
    let state = DecryptState {
        key,
        upstream,
        buffer: BytesMut::new(),
        upstream_done: false,
    };

    futures_util::stream::try_unfold(state, |mut st| async move {
        loop {
            if st.buffer.len() >= FRAME_SIZE {
                let frame = st.buffer.split_to(FRAME_SIZE);
                let plaintext = open(&st.key, &frame)?;
                return Ok(Some((Bytes::from(plaintext), st)));
            }

            if st.upstream_done {
                if st.buffer.is_empty() {
                    return Ok(None);
                }
                if st.buffer.len() < FRAME_OVERHEAD {
                    return Err(CryptoError::Truncated);
                }
                let frame = st.buffer.split();
                let plaintext = open(&st.key, &frame)?;
                return Ok(Some((Bytes::from(plaintext), st)));
            }

            match st.upstream.next().await {
                Some(Ok(bytes)) => st.buffer.extend_from_slice(&bytes),
                Some(Err(e)) => return Err(CryptoError::Io(e)),
                None => st.upstream_done = true,
            }
        }
    })
}

/// Collect an encrypted or decrypted stream into one buffer. Test and
/// small-object helper; the transfer paths stay streaming.
pub async fn collect_stream<S>(stream: S) -> Result<Vec<u8>, CryptoError>
where
    S: Stream<Item = Result<Bytes, CryptoError>>,
{
    futures_util::pin_mut!(stream);
    let mut out = Vec::new();
    while let Some(item) = stream.next().await {
        out.extend_from_slice(&item?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn test_key() -> SymmetricKey {
        SymmetricKey::from_bytes([7u8; 32])
    }

    fn pseudo_random(len: usize, mut seed: u64) -> Vec<u8> {
        // xorshift64 — deterministic fill, no RNG dependency in tests
        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            out.extend_from_slice(&seed.to_le_bytes());
        }
        out.truncate(len);
        out
    }

    fn as_stream(data: Vec<u8>, slice_len: usize) -> impl Stream<Item = std::io::Result<Bytes>> + Send + Unpin {
        let slices: Vec<std::io::Result<Bytes>> = data
            .chunks(slice_len.max(1))
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        stream::iter(slices)
    }

    async fn encrypt_all(plaintext: Vec<u8>) -> Vec<u8> {
        let enc = encrypt_stream(test_key(), as_stream(plaintext, 64 * 1024));
        collect_stream(enc).await.unwrap()
    }

    async fn decrypt_all(ciphertext: Vec<u8>, slice_len: usize) -> Result<Vec<u8>, CryptoError> {
        let dec = decrypt_stream(test_key(), as_stream(ciphertext, slice_len));
        collect_stream(dec).await
    }

    #[test]
    fn length_law() {
        assert_eq!(ciphertext_length_for(0), 0);
        assert_eq!(ciphertext_length_for(1), 29);
        assert_eq!(ciphertext_length_for(CHUNK_SIZE as u64), FRAME_SIZE as u64);
        assert_eq!(
            ciphertext_length_for(CHUNK_SIZE as u64 + 1),
            FRAME_SIZE as u64 + 29
        );
        assert_eq!(
            ciphertext_length_for(5 * CHUNK_SIZE as u64),
            5 * FRAME_SIZE as u64
        );
    }

    #[test]
    fn length_law_inverse() {
        for p in [0u64, 1, 27, 28, 29, 1 << 19, 1 << 20, (1 << 20) + 1, 5 << 20] {
            assert_eq!(plaintext_length_for(ciphertext_length_for(p)), Some(p));
        }
        // Lengths no plaintext can produce.
        assert_eq!(plaintext_length_for(1), None);
        assert_eq!(plaintext_length_for(FRAME_OVERHEAD as u64), None);
        assert_eq!(plaintext_length_for(FRAME_SIZE as u64 + 5), None);
    }

    #[tokio::test]
    async fn round_trip_boundary_sizes() {
        for size in [
            0usize,
            1,
            1024,
            CHUNK_SIZE - 1,
            CHUNK_SIZE,
            CHUNK_SIZE + 1,
            5 * CHUNK_SIZE,
        ] {
            let plaintext = pseudo_random(size, 0x5eed + size as u64);
            let ciphertext = encrypt_all(plaintext.clone()).await;
            assert_eq!(
                ciphertext.len() as u64,
                ciphertext_length_for(size as u64),
                "ciphertext length law broken at {size}"
            );
            let recovered = decrypt_all(ciphertext, 64 * 1024).await.unwrap();
            assert_eq!(recovered, plaintext, "round trip broken at {size}");
        }
    }

    #[tokio::test]
    async fn empty_input_emits_no_frames() {
        let ciphertext = encrypt_all(Vec::new()).await;
        assert!(ciphertext.is_empty());
        assert!(decrypt_all(Vec::new(), 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn exact_chunk_makes_exactly_one_frame() {
        let ciphertext = encrypt_all(pseudo_random(CHUNK_SIZE, 42)).await;
        assert_eq!(ciphertext.len(), FRAME_SIZE);
    }

    #[tokio::test]
    async fn decoder_tolerates_arbitrary_rechunking() {
        let plaintext = pseudo_random(5 * CHUNK_SIZE + 12345, 0xfeed);
        let ciphertext = encrypt_all(plaintext.clone()).await;

        // One slab.
        let slab = decrypt_all(ciphertext.clone(), ciphertext.len()).await.unwrap();
        assert_eq!(slab, plaintext);

        // Awkward fixed slice sizes straddling every frame boundary.
        for slice_len in [1usize << 10, 8191, FRAME_SIZE - 1, FRAME_SIZE + 1] {
            let out = decrypt_all(ciphertext.clone(), slice_len).await.unwrap();
            assert_eq!(out, plaintext, "rechunk at {slice_len} broke decoding");
        }

        // Seeded random slice sizes.
        let mut seed = 0x1234_5678_u64;
        let mut slices = Vec::new();
        let mut rest = &ciphertext[..];
        while !rest.is_empty() {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let take = (seed as usize % 100_000 + 1).min(rest.len());
            slices.push(Ok(Bytes::copy_from_slice(&rest[..take])));
            rest = &rest[take..];
        }
        let dec = decrypt_stream(test_key(), stream::iter(slices));
        assert_eq!(collect_stream(dec).await.unwrap(), plaintext);
    }

    #[tokio::test]
    async fn single_byte_rechunking() {
        let plaintext = pseudo_random(CHUNK_SIZE + 7, 9);
        let ciphertext = encrypt_all(plaintext.clone()).await;
        let out = decrypt_all(ciphertext, 1).await.unwrap();
        assert_eq!(out, plaintext);
    }

    #[tokio::test]
    async fn flipped_tag_fails_authentication() {
        let mut ciphertext = encrypt_all(pseudo_random(3 * CHUNK_SIZE, 77)).await;
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0x01;
        assert!(matches!(
            decrypt_all(ciphertext, 64 * 1024).await,
            Err(CryptoError::AuthFailure)
        ));
    }

    #[tokio::test]
    async fn corrupt_first_frame_aborts_before_later_frames() {
        let mut ciphertext = encrypt_all(pseudo_random(2 * CHUNK_SIZE, 78)).await;
        ciphertext[20] ^= 0xff;

        let dec = decrypt_stream(test_key(), as_stream(ciphertext, 64 * 1024));
        futures_util::pin_mut!(dec);
        match dec.next().await {
            Some(Err(CryptoError::AuthFailure)) => {}
            other => panic!("expected immediate AuthFailure, got {other:?}"),
        }
        assert!(dec.next().await.is_none());
    }

    #[tokio::test]
    async fn truncation_inside_final_frame_fails_auth() {
        let ciphertext = encrypt_all(pseudo_random(CHUNK_SIZE / 2, 5)).await;
        // Cut inside the final frame but keep at least the overhead.
        let cut = ciphertext[..FRAME_OVERHEAD + 100].to_vec();
        assert!(matches!(
            decrypt_all(cut, 1024).await,
            Err(CryptoError::AuthFailure)
        ));
    }

    #[tokio::test]
    async fn truncation_below_overhead_is_truncated() {
        let ciphertext = encrypt_all(pseudo_random(10, 6)).await;
        let cut = ciphertext[..FRAME_OVERHEAD - 1].to_vec();
        assert!(matches!(
            decrypt_all(cut, 4).await,
            Err(CryptoError::Truncated)
        ));
    }

    #[tokio::test]
    async fn upstream_error_propagates() {
        let items: Vec<std::io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::other("connection reset")),
        ];
        let enc = encrypt_stream(test_key(), stream::iter(items));
        assert!(matches!(
            collect_stream(enc).await,
            Err(CryptoError::Io(_))
        ));
    }
}
