//! Shared types for the S3 request path: resolved connection settings,
//! listing entries, and the typed error taxonomy with its mapping from
//! S3 XML error codes.

use secrecy::SecretString;
use serde::Serialize;

/// Fully resolved connection settings, produced by the session resolver.
#[derive(Clone)]
pub struct S3Settings {
    /// Endpoint host without scheme (e.g. `s3.amazonaws.com`).
    pub host: String,
    pub port: u16,
    pub use_ssl: bool,
    pub region: String,
    pub access_key: String,
    pub secret_key: SecretString,
    /// Effective bucket; bucket-less operations ignore it.
    pub bucket: Option<String>,
}

impl S3Settings {
    /// `host` or `host:port` when the port is not implied by the scheme.
    pub fn authority(&self) -> String {
        let default_port = if self.use_ssl { 443 } else { 80 };
        if self.port == default_port {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn scheme(&self) -> &'static str {
        if self.use_ssl {
            "https"
        } else {
            "http"
        }
    }
}

impl std::fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Settings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &"[REDACTED]")
            .field("bucket", &self.bucket)
            .finish()
    }
}

/// One entry from a listing: an object, or a synthetic directory from a
/// `CommonPrefixes` group.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ObjectEntry {
    pub key: String,
    /// Stored (encrypted) size in bytes; 0 for directories.
    pub size: u64,
    pub last_modified: Option<String>,
    pub is_directory: bool,
    pub etag: Option<String>,
}

impl ObjectEntry {
    pub fn directory(prefix: String) -> Self {
        Self {
            key: prefix,
            size: 0,
            last_modified: None,
            is_directory: true,
            etag: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum S3Error {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("bucket not found: {0}")]
    BucketNotFound(String),
    #[error("object not found: {0}")]
    ObjectNotFound(String),
    #[error("bucket not empty: {0}")]
    BucketNotEmpty(String),
    #[error("request failed ({status}): {}", render_failure(.code, .message))]
    RequestFailed {
        status: u16,
        code: Option<String>,
        message: Option<String>,
    },
    #[error("invalid bucket name: {0}")]
    InvalidBucketName(String),
    #[error("invalid S3 configuration: {0}")]
    InvalidConfig(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("response parse error: {0}")]
    Parse(String),
    #[error("request timed out")]
    Timeout,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn render_failure(code: &Option<String>, message: &Option<String>) -> String {
    match (code, message) {
        (Some(c), Some(m)) => format!("{c}: {m}"),
        (Some(c), None) => c.clone(),
        (None, Some(m)) => m.clone(),
        (None, None) => "no error body".to_string(),
    }
}

impl S3Error {
    /// Whether a caller may reasonably re-issue the operation. The core
    /// never retries on its own; this only informs the CLI's policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            S3Error::RequestFailed { status, .. } => *status >= 500,
            S3Error::Network(_) | S3Error::Timeout => true,
            _ => false,
        }
    }
}

/// Map an S3 XML error body (already reduced to code/message) plus HTTP
/// status to the typed taxonomy. `resource` names what was being touched,
/// for the resource-shaped variants.
pub(crate) fn map_s3_error(
    status: u16,
    code: Option<String>,
    message: Option<String>,
    resource: &str,
) -> S3Error {
    match code.as_deref() {
        Some("AccessDenied") => S3Error::AccessDenied(resource.to_string()),
        Some("NoSuchBucket") => S3Error::BucketNotFound(resource.to_string()),
        Some("NoSuchKey") => S3Error::ObjectNotFound(resource.to_string()),
        Some("BucketNotEmpty") => S3Error::BucketNotEmpty(resource.to_string()),
        Some("InvalidAccessKeyId") | Some("SignatureDoesNotMatch") => {
            S3Error::AuthenticationFailed(
                message.unwrap_or_else(|| "invalid credentials or signature".to_string()),
            )
        }
        _ => S3Error::RequestFailed {
            status,
            code,
            message,
        },
    }
}
