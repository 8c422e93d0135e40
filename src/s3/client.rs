//! S3 request composer: builds, signs, executes and streams requests.
//!
//! One `S3Client` owns the connection pool and is the only thing that
//! touches the wire. Object bodies stream in both directions — uploads
//! send a caller-supplied stream with a precomputed `Content-Length`, and
//! downloads hand back the response body as a lazy byte sequence — so
//! transfers run in bounded memory no matter the object size.
//!
//! Addressing is virtual-hosted style: `<bucket>.<endpoint-host>` for
//! object and in-bucket operations, the bare endpoint host for account
//! operations (list-buckets).

use bytes::Bytes;
use chrono::Utc;
use futures_util::StreamExt;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

use super::sigv4::{self, RequestSigner, EMPTY_PAYLOAD_SHA256, UNSIGNED_PAYLOAD};
use super::types::{map_s3_error, ObjectEntry, S3Error, S3Settings};
use crate::codec::ByteStream;

/// Request timeout for list/head/delete-class operations.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a download may take to produce response headers. The body
/// itself streams without an overall deadline.
const FIRST_BYTE_TIMEOUT: Duration = Duration::from_secs(30);

/// Upload timeout: 2 s per MiB with a 5 minute floor.
fn upload_timeout(length: u64) -> Duration {
    let mib = length.div_ceil(1024 * 1024);
    Duration::from_secs((2 * mib).max(300))
}

fn request_path(key: &str) -> String {
    format!("/{}", key.trim_start_matches('/'))
}

pub struct S3Client {
    settings: S3Settings,
    http: reqwest::Client,
}

impl S3Client {
    pub fn new(settings: S3Settings) -> Result<Self, S3Error> {
        // No pool-wide total timeout: streaming bodies outlive any fixed
        // deadline. Each operation sets its own request timeout instead.
        let http = reqwest::Client::builder()
            .connect_timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| S3Error::Network(format!("HTTP client init failed: {e}")))?;

        Ok(Self { settings, http })
    }

    /// Drop the HTTP connection pool. Call on every exit path of a
    /// command once no more requests will be issued.
    pub fn shutdown(self) {
        debug!("S3 client shut down");
    }

    pub fn settings(&self) -> &S3Settings {
        &self.settings
    }

    fn signer(&self) -> RequestSigner<'_> {
        RequestSigner {
            access_key: &self.settings.access_key,
            secret_key: self.settings.secret_key.expose_secret(),
            region: &self.settings.region,
        }
    }

    /// `<bucket>.<endpoint-authority>` for the effective bucket.
    fn bucket_host(&self) -> Result<String, S3Error> {
        let bucket = self.settings.bucket.as_deref().ok_or_else(|| {
            S3Error::InvalidConfig(
                "no bucket resolved; pass --bucket, set AWS_BUCKET, or configure a vault".into(),
            )
        })?;
        Ok(format!("{bucket}.{}", self.settings.authority()))
    }

    fn named_bucket_host(&self, bucket: &str) -> String {
        format!("{bucket}.{}", self.settings.authority())
    }

    /// Sign and dispatch one request with an in-memory (or absent) body.
    #[allow(clippy::too_many_arguments)]
    async fn send(
        &self,
        method: Method,
        host: &str,
        path: &str,
        query: &[(&str, &str)],
        user_headers: &[(&str, &str)],
        body: Option<Vec<u8>>,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, S3Error> {
        let body_hash = match &body {
            Some(bytes) => sigv4::sha256_hex(bytes),
            None => EMPTY_PAYLOAD_SHA256.to_string(),
        };
        let signed = self.signer().sign(
            method.as_str(),
            host,
            path,
            query,
            user_headers,
            &body_hash,
            Utc::now(),
        );

        let url = format!("{}://{host}{}", self.settings.scheme(), signed.uri);
        debug!("S3 request: {method} {url}");

        let mut request = self.http.request(method, &url);
        for (name, value) in &signed.headers {
            // reqwest derives Host from the URL.
            if name != "host" {
                request = request.header(name.as_str(), value.as_str());
            }
        }
        request = request.header("Authorization", &signed.authorization);
        if let Some(bytes) = body {
            request = request.header(CONTENT_LENGTH, bytes.len()).body(bytes);
        }
        if let Some(t) = timeout {
            request = request.timeout(t);
        }

        let response = request.send().await.map_err(map_transport_error)?;
        if !response.status().is_success() {
            warn!("S3 response {} for {url}", response.status());
        }
        Ok(response)
    }

    /// Consume a failed response into the typed error taxonomy.
    async fn fail(&self, response: reqwest::Response, resource: &str) -> S3Error {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let code = extract_xml_tag(&body, "Code");
        let message = extract_xml_tag(&body, "Message");
        map_s3_error(status, code, message, resource)
    }

    /// All buckets owned by the credentials.
    pub async fn list_buckets(&self) -> Result<Vec<String>, S3Error> {
        let host = self.settings.authority();
        let response = self
            .send(Method::GET, &host, "/", &[], &[], None, Some(REQUEST_TIMEOUT))
            .await?;

        if response.status() != StatusCode::OK {
            return Err(self.fail(response, "account").await);
        }
        let xml = response
            .text()
            .await
            .map_err(|e| S3Error::Parse(e.to_string()))?;
        parse_bucket_names(&xml)
    }

    /// ListObjectsV2 over the effective bucket, paginating until the
    /// listing is no longer truncated. `CommonPrefixes` groups come back
    /// as directory entries, deduplicated across pages.
    pub async fn list_objects(
        &self,
        prefix: Option<&str>,
        delimiter: Option<&str>,
    ) -> Result<Vec<ObjectEntry>, S3Error> {
        let host = self.bucket_host()?;
        let mut entries = Vec::new();
        let mut seen_prefixes: HashSet<String> = HashSet::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut query: Vec<(&str, &str)> =
                vec![("list-type", "2"), ("max-keys", "1000")];
            if let Some(p) = prefix.filter(|p| !p.is_empty()) {
                query.push(("prefix", p));
            }
            if let Some(d) = delimiter.filter(|d| !d.is_empty()) {
                query.push(("delimiter", d));
            }
            if let Some(ref token) = continuation {
                query.push(("continuation-token", token.as_str()));
            }

            let response = self
                .send(Method::GET, &host, "/", &query, &[], None, Some(REQUEST_TIMEOUT))
                .await?;
            if response.status() != StatusCode::OK {
                let resource = prefix.unwrap_or("").to_string();
                return Err(self.fail(response, &resource).await);
            }

            let xml = response
                .text()
                .await
                .map_err(|e| S3Error::Parse(e.to_string()))?;
            let page = parse_list_objects(&xml)?;

            for p in page.common_prefixes {
                if seen_prefixes.insert(p.clone()) {
                    entries.push(ObjectEntry::directory(p));
                }
            }
            entries.extend(page.objects);

            match page.next_token {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        debug!("listed {} entries", entries.len());
        Ok(entries)
    }

    /// Stored size of an object, `None` when it does not exist.
    pub async fn head_object_size(&self, key: &str) -> Result<Option<u64>, S3Error> {
        let host = self.bucket_host()?;
        let response = self
            .send(
                Method::HEAD,
                &host,
                &request_path(key),
                &[],
                &[],
                None,
                Some(REQUEST_TIMEOUT),
            )
            .await?;

        match response.status() {
            StatusCode::OK => {
                let size = response
                    .headers()
                    .get(CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0);
                Ok(Some(size))
            }
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::FORBIDDEN => Err(S3Error::AccessDenied(key.to_string())),
            status => Err(S3Error::RequestFailed {
                status: status.as_u16(),
                code: None,
                message: None,
            }),
        }
    }

    /// Stream an object's stored bytes. The response headers must arrive
    /// within [`FIRST_BYTE_TIMEOUT`]; the body then streams with no
    /// overall deadline, cancellable at every poll.
    pub async fn get_object_stream(&self, key: &str) -> Result<ByteStream, S3Error> {
        let host = self.bucket_host()?;
        let path = request_path(key);
        let send = self.send(
            Method::GET,
            &host,
            &path,
            &[],
            &[],
            None,
            None,
        );
        let response = tokio::time::timeout(FIRST_BYTE_TIMEOUT, send)
            .await
            .map_err(|_| S3Error::Timeout)??;

        match response.status() {
            StatusCode::OK => Ok(Box::pin(
                response
                    .bytes_stream()
                    .map(|chunk| chunk.map_err(std::io::Error::other)),
            )),
            StatusCode::NOT_FOUND => Err(S3Error::ObjectNotFound(key.to_string())),
            _ => Err(self.fail(response, key).await),
        }
    }

    /// Streaming PUT with a known body length. The body is signed as
    /// `UNSIGNED-PAYLOAD` (the digest of a stream is not known up front;
    /// TLS covers transport integrity) and is never buffered whole.
    pub async fn put_object_stream<S>(
        &self,
        key: &str,
        body: S,
        length: u64,
    ) -> Result<(), S3Error>
    where
        S: futures_util::TryStream + Send + 'static,
        S::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
        Bytes: From<S::Ok>,
    {
        let host = self.bucket_host()?;
        let path = request_path(key);
        let signed = self.signer().sign(
            "PUT",
            &host,
            &path,
            &[],
            &[("content-type", "application/octet-stream")],
            UNSIGNED_PAYLOAD,
            Utc::now(),
        );

        let url = format!("{}://{host}{}", self.settings.scheme(), signed.uri);
        debug!("S3 request: PUT {url} ({length} bytes)");

        let mut request = self.http.put(&url);
        for (name, value) in &signed.headers {
            if name != "host" {
                request = request.header(name.as_str(), value.as_str());
            }
        }
        let response = request
            .header("Authorization", &signed.authorization)
            .header(CONTENT_LENGTH, length)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(reqwest::Body::wrap_stream(body))
            .timeout(upload_timeout(length))
            .send()
            .await
            .map_err(map_transport_error)?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT => Ok(()),
            _ => Err(self.fail(response, key).await),
        }
    }

    pub async fn delete_object(&self, key: &str) -> Result<(), S3Error> {
        let host = self.bucket_host()?;
        let response = self
            .send(
                Method::DELETE,
                &host,
                &request_path(key),
                &[],
                &[],
                None,
                Some(REQUEST_TIMEOUT),
            )
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => Ok(()),
            _ => Err(self.fail(response, key).await),
        }
    }

    /// Create a bucket in the configured region. Regions other than
    /// us-east-1 need an explicit `LocationConstraint` body.
    pub async fn create_bucket(&self, name: &str) -> Result<(), S3Error> {
        validate_bucket_name(name)?;
        let host = self.named_bucket_host(name);
        let body = if self.settings.region == "us-east-1" {
            None
        } else {
            Some(
                format!(
                    "<CreateBucketConfiguration xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
                     <LocationConstraint>{}</LocationConstraint>\
                     </CreateBucketConfiguration>",
                    self.settings.region
                )
                .into_bytes(),
            )
        };

        let response = self
            .send(Method::PUT, &host, "/", &[], &[], body, Some(REQUEST_TIMEOUT))
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            _ => Err(self.fail(response, name).await),
        }
    }

    pub async fn delete_bucket(&self, name: &str) -> Result<(), S3Error> {
        let host = self.named_bucket_host(name);
        let response = self
            .send(Method::DELETE, &host, "/", &[], &[], None, Some(REQUEST_TIMEOUT))
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => Ok(()),
            _ => Err(self.fail(response, name).await),
        }
    }

    /// Server-side copy within the effective bucket (or from
    /// `source_bucket` when given).
    pub async fn copy_object(
        &self,
        source_key: &str,
        dest_key: &str,
        source_bucket: Option<&str>,
    ) -> Result<(), S3Error> {
        let host = self.bucket_host()?;
        let effective_bucket = self.settings.bucket.as_deref().unwrap_or_default();
        let src_bucket = source_bucket.unwrap_or(effective_bucket);
        let copy_source = sigv4::encode_path(&format!(
            "/{src_bucket}/{}",
            source_key.trim_start_matches('/')
        ));

        let response = self
            .send(
                Method::PUT,
                &host,
                &request_path(dest_key),
                &[],
                &[("x-amz-copy-source", copy_source.as_str())],
                None,
                Some(REQUEST_TIMEOUT),
            )
            .await?;

        if response.status() != StatusCode::OK {
            return Err(self.fail(response, source_key).await);
        }

        // S3 can return 200 with an error document in the body while the
        // copy is streaming server-side.
        let body = response.text().await.unwrap_or_default();
        if body.contains("<Error>") {
            let code = extract_xml_tag(&body, "Code");
            let message = extract_xml_tag(&body, "Message");
            return Err(map_s3_error(200, code, message, source_key));
        }
        Ok(())
    }
}

/// S3 bucket naming rules: 3–63 characters, lowercase letters, digits,
/// dots and hyphens, starting and ending alphanumeric.
fn validate_bucket_name(name: &str) -> Result<(), S3Error> {
    let valid_len = (3..=63).contains(&name.len());
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
    let valid_ends = name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
        && name.chars().last().is_some_and(|c| c.is_ascii_alphanumeric());

    if valid_len && valid_chars && valid_ends {
        Ok(())
    } else {
        Err(S3Error::InvalidBucketName(name.to_string()))
    }
}

fn map_transport_error(e: reqwest::Error) -> S3Error {
    if e.is_timeout() {
        S3Error::Timeout
    } else {
        S3Error::Network(e.to_string())
    }
}

/// First text content of `tag` anywhere in the document.
fn extract_xml_tag(xml: &str, tag: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut inside = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                if e.name().as_ref() == tag.as_bytes() {
                    inside = true;
                }
            }
            Ok(Event::Text(ref e)) => {
                if inside {
                    let text = String::from_utf8_lossy(e.as_ref()).trim().to_string();
                    if !text.is_empty() {
                        return Some(text);
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                if e.name().as_ref() == tag.as_bytes() {
                    inside = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    None
}

/// `ListAllMyBucketsResult/Buckets/Bucket/Name` values.
fn parse_bucket_names(xml: &str) -> Result<Vec<String>, S3Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut names = Vec::new();
    let mut in_bucket = false;
    let mut in_name = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"Bucket" => in_bucket = true,
                b"Name" if in_bucket => in_name = true,
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                if in_name {
                    let text = String::from_utf8_lossy(e.as_ref()).trim().to_string();
                    if !text.is_empty() {
                        names.push(text);
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"Bucket" => in_bucket = false,
                b"Name" => in_name = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(S3Error::Parse(format!("XML parse error: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    Ok(names)
}

struct ListPage {
    objects: Vec<ObjectEntry>,
    common_prefixes: Vec<String>,
    next_token: Option<String>,
}

/// One page of a ListObjectsV2 response.
fn parse_list_objects(xml: &str) -> Result<ListPage, S3Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    enum Context {
        Top,
        Contents,
        CommonPrefixes,
    }

    let mut context = Context::Top;
    let mut current_tag = String::new();

    let mut objects = Vec::new();
    let mut common_prefixes = Vec::new();
    let mut next_token: Option<String> = None;

    let mut key: Option<String> = None;
    let mut size: Option<u64> = None;
    let mut modified: Option<String> = None;
    let mut etag: Option<String> = None;
    let mut prefix: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match tag.as_str() {
                    "Contents" => {
                        context = Context::Contents;
                        key = None;
                        size = None;
                        modified = None;
                        etag = None;
                    }
                    "CommonPrefixes" => {
                        context = Context::CommonPrefixes;
                        prefix = None;
                    }
                    _ => current_tag = tag,
                }
            }
            Ok(Event::Text(ref e)) => {
                let text = String::from_utf8_lossy(e.as_ref()).trim().to_string();
                if text.is_empty() {
                    buf.clear();
                    continue;
                }
                match context {
                    Context::Contents => match current_tag.as_str() {
                        "Key" => key = Some(text),
                        "Size" => size = text.parse().ok(),
                        "LastModified" => modified = Some(text),
                        "ETag" => etag = Some(text.trim_matches('"').to_string()),
                        _ => {}
                    },
                    Context::CommonPrefixes => {
                        if current_tag == "Prefix" {
                            prefix = Some(text);
                        }
                    }
                    Context::Top => {
                        if current_tag == "NextContinuationToken" {
                            next_token = Some(text);
                        }
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                let name = e.name();
                let tag = String::from_utf8_lossy(name.as_ref());
                match tag.as_ref() {
                    "Contents" => {
                        if let Some(key) = key.take() {
                            objects.push(ObjectEntry {
                                key,
                                size: size.unwrap_or(0),
                                last_modified: modified.take(),
                                is_directory: false,
                                etag: etag.take(),
                            });
                        }
                        context = Context::Top;
                    }
                    "CommonPrefixes" => {
                        if let Some(p) = prefix.take() {
                            common_prefixes.push(p);
                        }
                        context = Context::Top;
                    }
                    _ => {}
                }
                current_tag.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(S3Error::Parse(format!("XML parse error: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    Ok(ListPage {
        objects,
        common_prefixes,
        next_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn settings(bucket: Option<&str>) -> S3Settings {
        S3Settings {
            host: "s3.eu-west-1.amazonaws.com".into(),
            port: 443,
            use_ssl: true,
            region: "eu-west-1".into(),
            access_key: "AK".into(),
            secret_key: SecretString::from("SK".to_string()),
            bucket: bucket.map(String::from),
        }
    }

    #[test]
    fn virtual_hosted_addressing() {
        let client = S3Client::new(settings(Some("photos"))).unwrap();
        assert_eq!(
            client.bucket_host().unwrap(),
            "photos.s3.eu-west-1.amazonaws.com"
        );
        assert_eq!(
            client.named_bucket_host("other"),
            "other.s3.eu-west-1.amazonaws.com"
        );
    }

    #[test]
    fn missing_bucket_is_config_error() {
        let client = S3Client::new(settings(None)).unwrap();
        assert!(matches!(
            client.bucket_host(),
            Err(S3Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn upload_timeout_scales_with_length() {
        assert_eq!(upload_timeout(0), Duration::from_secs(300));
        assert_eq!(upload_timeout(1024 * 1024), Duration::from_secs(300));
        // 1 GiB → 2048 s.
        assert_eq!(
            upload_timeout(1024 * 1024 * 1024),
            Duration::from_secs(2048)
        );
    }

    #[test]
    fn bucket_name_rules() {
        assert!(validate_bucket_name("my-bucket.backups1").is_ok());
        assert!(validate_bucket_name("abc").is_ok());
        assert!(validate_bucket_name("ab").is_err());
        assert!(validate_bucket_name("MyBucket").is_err());
        assert!(validate_bucket_name("-leading").is_err());
        assert!(validate_bucket_name("trailing-").is_err());
        assert!(validate_bucket_name("under_score").is_err());
        assert!(validate_bucket_name(&"x".repeat(64)).is_err());
    }

    #[test]
    fn request_path_normalizes_leading_slash() {
        assert_eq!(request_path("a/b.txt"), "/a/b.txt");
        assert_eq!(request_path("/a/b.txt"), "/a/b.txt");
    }

    #[test]
    fn parses_bucket_listing() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <ListAllMyBucketsResult>
              <Owner><ID>abc</ID><DisplayName>me</DisplayName></Owner>
              <Buckets>
                <Bucket><Name>alpha</Name><CreationDate>2024-01-01T00:00:00.000Z</CreationDate></Bucket>
                <Bucket><Name>beta</Name><CreationDate>2024-02-01T00:00:00.000Z</CreationDate></Bucket>
              </Buckets>
            </ListAllMyBucketsResult>"#;
        assert_eq!(parse_bucket_names(xml).unwrap(), vec!["alpha", "beta"]);
    }

    #[test]
    fn parses_list_objects_page() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <ListBucketResult>
              <Name>photos</Name>
              <Prefix>2024/</Prefix>
              <IsTruncated>true</IsTruncated>
              <NextContinuationToken>token123</NextContinuationToken>
              <Contents>
                <Key>2024/january.bin</Key>
                <LastModified>2024-01-31T10:00:00.000Z</LastModified>
                <ETag>"9b2cf535f27731c974343645a3985328"</ETag>
                <Size>1048604</Size>
                <StorageClass>STANDARD</StorageClass>
              </Contents>
              <Contents>
                <Key>2024/february.bin</Key>
                <Size>29</Size>
              </Contents>
              <CommonPrefixes><Prefix>2024/raw/</Prefix></CommonPrefixes>
              <CommonPrefixes><Prefix>2024/thumbs/</Prefix></CommonPrefixes>
            </ListBucketResult>"#;

        let page = parse_list_objects(xml).unwrap();
        assert_eq!(page.next_token.as_deref(), Some("token123"));
        assert_eq!(page.common_prefixes, vec!["2024/raw/", "2024/thumbs/"]);
        assert_eq!(page.objects.len(), 2);

        let first = &page.objects[0];
        assert_eq!(first.key, "2024/january.bin");
        assert_eq!(first.size, 1_048_604);
        assert_eq!(
            first.etag.as_deref(),
            Some("9b2cf535f27731c974343645a3985328")
        );
        assert!(!first.is_directory);

        let second = &page.objects[1];
        assert_eq!(second.key, "2024/february.bin");
        assert_eq!(second.size, 29);
        assert!(second.last_modified.is_none());
    }

    #[test]
    fn final_page_has_no_token() {
        let xml = r#"<ListBucketResult>
              <IsTruncated>false</IsTruncated>
              <Contents><Key>solo.bin</Key><Size>57</Size></Contents>
            </ListBucketResult>"#;
        let page = parse_list_objects(xml).unwrap();
        assert!(page.next_token.is_none());
        assert_eq!(page.objects.len(), 1);
    }

    #[test]
    fn extracts_error_code_and_message() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <Error>
              <Code>NoSuchKey</Code>
              <Message>The specified key does not exist.</Message>
              <Key>missing.bin</Key>
            </Error>"#;
        assert_eq!(extract_xml_tag(xml, "Code").as_deref(), Some("NoSuchKey"));
        assert_eq!(
            extract_xml_tag(xml, "Message").as_deref(),
            Some("The specified key does not exist.")
        );
        assert_eq!(extract_xml_tag(xml, "Region"), None);
    }
}
