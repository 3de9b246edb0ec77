//! S3-compatible wire client
//!
//! Works with AWS S3, MinIO, Wasabi, DigitalOcean Spaces, Backblaze B2,
//! Cloudflare R2, and any other S3-compatible object storage. Requests
//! are signed with AWS Signature Version 4, or sent unsigned when no
//! credentials are configured.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, Method, Response, StatusCode};
use std::collections::BTreeMap;

use kfs_core::{Credentials, KfsError, KfsResult, S3Config};

use crate::attrs::ObjectAttributes;
use crate::store::{ListPage, ListedObject, ObjectStore};

const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

pub struct S3Client {
    http: Client,
    scheme: String,
    authority: String,
    region: String,
    credentials: Option<Credentials>,
    path_style: bool,
}

impl S3Client {
    pub fn new(config: &S3Config) -> KfsResult<Self> {
        let region = config.region().unwrap_or_else(|| "us-east-1".to_string());
        let endpoint = config.endpoint();
        let (scheme, authority) = if endpoint.is_empty() {
            ("https".to_string(), format!("s3.{region}.amazonaws.com"))
        } else {
            (config.endpoint_protocol()?, endpoint)
        };
        Ok(Self {
            http: Client::new(),
            scheme,
            authority,
            region,
            credentials: config.credentials(),
            path_style: config.force_path_style(),
        })
    }

    /// Percent-encode a key, keeping `/` as the segment separator.
    fn encode_key(key: &str) -> String {
        key.split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn bucket_url(&self, bucket: &str) -> String {
        if self.path_style {
            format!("{}://{}/{}", self.scheme, self.authority, bucket)
        } else {
            format!("{}://{}.{}", self.scheme, bucket, self.authority)
        }
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}", self.bucket_url(bucket), Self::encode_key(key))
    }

    /// Sign with AWS Signature Version 4. Returns the authorization
    /// header, or nothing when running without credentials.
    fn sign_request(
        &self,
        method: &Method,
        url: &str,
        headers: &mut BTreeMap<String, String>,
        payload_hash: &str,
    ) -> KfsResult<Option<String>> {
        let Some(credentials) = &self.credentials else {
            return Ok(None);
        };

        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        headers.insert("x-amz-date".to_string(), amz_date.clone());
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.to_string());

        let parsed = url::Url::parse(url)
            .map_err(|e| KfsError::InvalidArgument(format!("cannot parse url '{url}': {e}")))?;
        let host = match parsed.port() {
            Some(port) => format!("{}:{port}", parsed.host_str().unwrap_or("")),
            None => parsed.host_str().unwrap_or("").to_string(),
        };
        let path = parsed.path();
        let query = parsed.query().unwrap_or("");

        headers.insert("host".to_string(), host);

        // BTreeMap keeps the signed header list sorted, as the canonical
        // request requires.
        let signed_headers: Vec<&str> = headers.keys().map(|s| s.as_str()).collect();
        let signed_headers_str = signed_headers.join(";");

        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k.to_lowercase(), v.trim()))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method.as_str(),
            path,
            query,
            canonical_headers,
            signed_headers_str,
            payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            sha256_hex(canonical_request.as_bytes())
        );

        let k_date = hmac_sha256(
            format!("AWS4{}", credentials.secret_key).as_bytes(),
            date_stamp.as_bytes(),
        );
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, b"s3");
        let k_signing = hmac_sha256(&k_service, b"aws4_request");
        let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes()));

        Ok(Some(format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            credentials.access_key, credential_scope, signed_headers_str, signature
        )))
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        mut headers: BTreeMap<String, String>,
        body: Option<Bytes>,
    ) -> KfsResult<Response> {
        let payload_hash = match &body {
            Some(data) => sha256_hex(data),
            None => EMPTY_SHA256.to_string(),
        };
        let auth = self.sign_request(&method, url, &mut headers, &payload_hash)?;

        let mut request = self.http.request(method, url);
        for (k, v) in &headers {
            request = request.header(k, v);
        }
        if let Some(auth) = auth {
            request = request.header(header::AUTHORIZATION, auth);
        }
        if let Some(data) = body {
            request = request.body(data);
        }

        request
            .send()
            .await
            .map_err(|e| KfsError::transport(format!("request to '{url}' failed"), e))
    }
}

async fn fail(op: &str, target: &str, response: Response) -> KfsError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    KfsError::transport_message(format!("{op} '{target}': {status}: {body}"))
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn head(&self, bucket: &str, key: &str) -> KfsResult<Option<ObjectAttributes>> {
        tracing::debug!(bucket, key, "head");
        let url = self.object_url(bucket, key);
        let response = self
            .send(Method::HEAD, &url, BTreeMap::new(), None)
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(fail("head", key, response).await);
        }

        let headers = response.headers();
        let size = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let last_modified = headers
            .get(header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
            .map(|dt| dt.with_timezone(&Utc));
        let etag = headers
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string());
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Ok(Some(ObjectAttributes {
            size,
            last_modified,
            etag,
            content_type,
            directory: key.ends_with('/'),
        }))
    }

    async fn get_range(
        &self,
        bucket: &str,
        key: &str,
        offset: u64,
        length: u64,
    ) -> KfsResult<Bytes> {
        if length == 0 {
            return Ok(Bytes::new());
        }
        tracing::debug!(bucket, key, offset, length, "get range");
        let url = self.object_url(bucket, key);
        let mut headers = BTreeMap::new();
        headers.insert(
            "range".to_string(),
            format!("bytes={}-{}", offset, offset + length - 1),
        );
        let response = self.send(Method::GET, &url, headers, None).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(KfsError::NotFound(key.to_string())),
            StatusCode::RANGE_NOT_SATISFIABLE => Ok(Bytes::new()),
            status if status.is_success() => response
                .bytes()
                .await
                .map_err(|e| KfsError::transport(format!("reading body of '{key}'"), e)),
            _ => Err(fail("get", key, response).await),
        }
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> KfsResult<()> {
        tracing::debug!(bucket, key, size = data.len(), "put");
        let url = self.object_url(bucket, key);
        let mut headers = BTreeMap::new();
        if let Some(content_type) = content_type {
            headers.insert("content-type".to_string(), content_type.to_string());
        }
        let response = self.send(Method::PUT, &url, headers, Some(data)).await?;
        if !response.status().is_success() {
            return Err(fail("put", key, response).await);
        }
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> KfsResult<()> {
        tracing::debug!(bucket, key, "delete");
        let url = self.object_url(bucket, key);
        let response = self.send(Method::DELETE, &url, BTreeMap::new(), None).await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(fail("delete", key, response).await)
    }

    async fn copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> KfsResult<()> {
        tracing::debug!(src_bucket, src_key, dst_bucket, dst_key, "server-side copy");
        let url = self.object_url(dst_bucket, dst_key);
        let mut headers = BTreeMap::new();
        headers.insert(
            "x-amz-copy-source".to_string(),
            format!("{}/{}", src_bucket, Self::encode_key(src_key)),
        );
        let response = self.send(Method::PUT, &url, headers, None).await?;
        if !response.status().is_success() {
            return Err(fail("copy", dst_key, response).await);
        }
        Ok(())
    }

    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        continuation_token: Option<&str>,
    ) -> KfsResult<ListPage> {
        tracing::debug!(bucket, prefix, "list page");

        // Parameters stay sorted by name so the canonical query used for
        // signing matches the query actually sent.
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(token) = continuation_token {
            params.push(("continuation-token", urlencoding::encode(token).into_owned()));
        }
        if let Some(delimiter) = delimiter {
            params.push(("delimiter", urlencoding::encode(delimiter).into_owned()));
        }
        params.push(("list-type", "2".to_string()));
        if !prefix.is_empty() {
            params.push(("prefix", urlencoding::encode(prefix).into_owned()));
        }
        params.sort_by(|a, b| a.0.cmp(b.0));
        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let url = format!("{}?{}", self.bucket_url(bucket), query);
        let response = self.send(Method::GET, &url, BTreeMap::new(), None).await?;

        // A vanished bucket or prefix lists empty; check_access is the
        // operation that reports absence.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(ListPage::default());
        }
        if !response.status().is_success() {
            return Err(fail("list", prefix, response).await);
        }

        let text = response
            .text()
            .await
            .map_err(|e| KfsError::transport("reading listing body", e))?;
        Ok(parse_list_page(&text))
    }

    async fn bucket_exists(&self, bucket: &str) -> KfsResult<bool> {
        tracing::debug!(bucket, "head bucket");
        let url = self.bucket_url(bucket);
        let response = self.send(Method::HEAD, &url, BTreeMap::new(), None).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            // Redirected or forbidden buckets exist, just not here or
            // not for us.
            StatusCode::MOVED_PERMANENTLY | StatusCode::FORBIDDEN => Ok(true),
            status if status.is_success() => Ok(true),
            _ => Err(fail("head bucket", bucket, response).await),
        }
    }

    async fn create_bucket(
        &self,
        bucket: &str,
        location_constraint: Option<&str>,
    ) -> KfsResult<()> {
        tracing::debug!(bucket, ?location_constraint, "create bucket");
        let url = self.bucket_url(bucket);
        let body = location_constraint.map(|constraint| {
            Bytes::from(format!(
                "<CreateBucketConfiguration><LocationConstraint>{constraint}\
                 </LocationConstraint></CreateBucketConfiguration>"
            ))
        });
        let response = self.send(Method::PUT, &url, BTreeMap::new(), body).await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::CONFLICT {
            return Ok(());
        }
        Err(fail("create bucket", bucket, response).await)
    }
}

/// Parse a ListObjectsV2 response.
fn parse_list_page(xml: &str) -> ListPage {
    let mut page = ListPage::default();

    for block in xml_blocks(xml, "Contents") {
        let Some(key) = xml_value(block, "Key") else {
            continue;
        };
        page.objects.push(ListedObject {
            key,
            size: xml_value(block, "Size")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            last_modified: xml_value(block, "LastModified")
                .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            etag: xml_value(block, "ETag").map(|v| v.trim_matches('"').to_string()),
        });
    }

    for block in xml_blocks(xml, "CommonPrefixes") {
        if let Some(prefix) = xml_value(block, "Prefix") {
            page.common_prefixes.push(prefix);
        }
    }

    page.next_token = xml_value(xml, "NextContinuationToken");

    page
}

/// All text runs between `<tag>` and `</tag>`.
fn xml_blocks<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut blocks = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let body = &rest[start + open.len()..];
        let Some(end) = body.find(&close) else {
            break;
        };
        blocks.push(&body[..end]);
        rest = &body[end + close.len()..];
    }
    blocks
}

/// First `<tag>` value inside `xml`, with entities decoded.
fn xml_value(xml: &str, tag: &str) -> Option<String> {
    xml_blocks(xml, tag).first().map(|v| xml_unescape(v))
}

fn xml_unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
