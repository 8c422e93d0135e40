//! S3 request path: SigV4 signing and the request composer.
//!
//! Talks the S3 REST dialect directly over reqwest rather than pulling in
//! the AWS SDK: the surface this tool needs is small, and the hand-rolled
//! signer keeps compatibility with MinIO, Backblaze B2, Cloudflare R2 and
//! the other S3-compatible services.

pub mod client;
pub mod sigv4;
pub mod types;

pub use client::S3Client;
pub use types::{ObjectEntry, S3Error, S3Settings};
