// MinIO Rust Library for Amazon S3 Compatible Cloud Storage
// Copyright 2022 MinIO, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! S3 client performing signed multipart requests

use crate::s3::creds::Provider;
use crate::s3::error::{Error, MultipartError, ServiceError, ValidationErr};
use crate::s3::header_constants::*;
use crate::s3::http::BaseUrl;
use crate::s3::multimap_ext::{Multimap, MultimapExt};
use crate::s3::multipart::planner::MAX_MULTIPART_COUNT;
use crate::s3::multipart::{CompletedPart, MultipartApi, MultipartUpload};
use crate::s3::object_content::ObjectContent;
use crate::s3::segmented_bytes::SegmentedBytes;
use crate::s3::signer::RequestSigner;
use crate::s3::transport::{
    ConnectionPoolConfig, HttpRequest, HttpResponse, ReqwestTransport, Transport,
};
use crate::s3::utils::{
    EMPTY_SHA256, check_bucket_name, check_object_name, get_default_text, get_option_text,
    md5sum_hash, sha256_hash_sb, utc_now,
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::Method;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use xmltree::Element;

pub const DEFAULT_REGION: &str = "us-east-1";

/// Client Builder manufactures an [`S3Client`] using given parameters.
#[derive(Debug)]
pub struct S3ClientBuilder {
    base_url: BaseUrl,
    /// Credential provider. Requests are sent anonymously without one.
    provider: Option<Arc<dyn Provider>>,
    /// Transport to use instead of a reqwest transport built from the
    /// settings below.
    transport: Option<Arc<dyn Transport>>,
    region: Option<String>,
    ssl_cert_file: Option<PathBuf>,
    ignore_cert_check: Option<bool>,
    app_info: Option<(String, String)>,
    connection_pool_config: ConnectionPoolConfig,
}

impl S3ClientBuilder {
    /// Creates a builder given a base URL for the S3 compatible service.
    pub fn new(base_url: BaseUrl) -> Self {
        Self {
            base_url,
            provider: None,
            transport: None,
            region: None,
            ssl_cert_file: None,
            ignore_cert_check: None,
            app_info: None,
            connection_pool_config: ConnectionPoolConfig::default(),
        }
    }

    /// Set the credential provider. If not set, anonymous access is used.
    pub fn provider<P: Provider + 'static>(mut self, provider: Option<P>) -> Self {
        self.provider = provider.map(|p| Arc::new(p) as Arc<dyn Provider>);
        self
    }

    /// Send requests through `transport`. The TLS and pool settings of this
    /// builder are then unused.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Region used for signing. Defaults to the region of the base URL.
    pub fn region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    /// Set the app info as an Option of (app_name, app_version) pair. This will
    /// show up in the client's user-agent.
    pub fn app_info(mut self, app_info: Option<(String, String)>) -> Self {
        self.app_info = app_info;
        self
    }

    /// Set file for loading CAs certs to trust. This is in addition to the system
    /// trust store. The file must contain PEM encoded certificates.
    pub fn ssl_cert_file(mut self, ssl_cert_file: Option<&Path>) -> Self {
        self.ssl_cert_file = ssl_cert_file.map(PathBuf::from);
        self
    }

    /// Set flag to ignore certificate check. This is insecure and should only
    /// be used for testing.
    pub fn ignore_cert_check(mut self, ignore_cert_check: Option<bool>) -> Self {
        self.ignore_cert_check = ignore_cert_check;
        self
    }

    /// Configure the HTTP connection pool settings.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use s3_transfer::s3::client::S3ClientBuilder;
    /// use s3_transfer::s3::creds::StaticProvider;
    /// use s3_transfer::s3::http::BaseUrl;
    /// use s3_transfer::s3::transport::ConnectionPoolConfig;
    /// use std::time::Duration;
    ///
    /// let base_url: BaseUrl = "http://localhost:9000".parse().unwrap();
    ///
    /// // High-throughput configuration for parallel uploads
    /// let client = S3ClientBuilder::new(base_url)
    ///     .provider(Some(StaticProvider::new("minioadmin", "minioadmin", None)))
    ///     .connection_pool_config(
    ///         ConnectionPoolConfig::default()
    ///             .max_idle_per_host(64)
    ///             .idle_timeout(Duration::from_secs(120))
    ///     )
    ///     .build()
    ///     .unwrap();
    /// ```
    pub fn connection_pool_config(mut self, config: ConnectionPoolConfig) -> Self {
        self.connection_pool_config = config;
        self
    }

    /// Build the Client.
    pub fn build(self) -> Result<S3Client, Error> {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(
                ReqwestTransport::builder()
                    .connection_pool_config(self.connection_pool_config)
                    .app_info(self.app_info)
                    .ssl_cert_file(self.ssl_cert_file.as_deref())
                    .ignore_cert_check(self.ignore_cert_check)
                    .build()?,
            ),
        };

        let region = self
            .region
            .unwrap_or_else(|| self.base_url.region.clone());
        let signer = self.provider.map(|p| RequestSigner::s3(p, &region));

        Ok(S3Client {
            shared: Arc::new(SharedClientItems {
                base_url: self.base_url,
                signer,
                transport,
            }),
        })
    }
}

#[derive(Debug)]
struct SharedClientItems {
    base_url: BaseUrl,
    signer: Option<RequestSigner>,
    transport: Arc<dyn Transport>,
}

/// Simple Storage Service (aka S3) client for multipart uploads and
/// presigned URLs.
///
/// If credential provider is passed, all requests are signed using AWS
/// Signature Version 4; else they are performed anonymously. Cloning is
/// cheap and clones share the connection pool.
#[derive(Clone, Debug)]
pub struct S3Client {
    shared: Arc<SharedClientItems>,
}

impl S3Client {
    /// Returns a S3 client with given base URL and credential provider.
    ///
    /// # Examples
    ///
    /// ```
    /// use s3_transfer::s3::client::S3Client;
    /// use s3_transfer::s3::creds::StaticProvider;
    /// use s3_transfer::s3::http::BaseUrl;
    ///
    /// let base_url: BaseUrl = "play.min.io".parse().unwrap();
    /// let static_provider = StaticProvider::new(
    ///     "Q3AM3UQ867SPQQA43P2F",
    ///     "zuf+tfteSlswRu7BJ86wekitnifILbZam1KYY3TG",
    ///     None,
    /// );
    ///
    /// let client = S3Client::new(base_url, Some(static_provider)).unwrap();
    /// ```
    pub fn new<P: Provider + 'static>(
        base_url: BaseUrl,
        provider: Option<P>,
    ) -> Result<Self, Error> {
        S3ClientBuilder::new(base_url).provider(provider).build()
    }

    pub fn base_url(&self) -> &BaseUrl {
        &self.shared.base_url
    }

    /// Returns whether this client uses an HTTPS connection.
    pub fn is_secure(&self) -> bool {
        self.shared.base_url.https
    }

    /// Starts building a multipart upload of `content` to `bucket`/`key`.
    pub fn multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content: impl Into<ObjectContent>,
    ) -> MultipartUpload {
        MultipartUpload::new(Arc::new(self.clone()), bucket, key, content)
    }

    /// Returns a presigned URL granting `method` on `bucket`/`key` for
    /// `expires` seconds. Without credentials the plain URL is returned.
    pub fn presigned_url(
        &self,
        method: Method,
        bucket: &str,
        key: &str,
        expires: u64,
    ) -> Result<String, Error> {
        check_bucket_name(bucket, true)?;
        check_object_name(key)?;

        let url = self
            .shared
            .base_url
            .build_url(&Multimap::new(), bucket, Some(key));

        match &self.shared.signer {
            Some(signer) => Ok(signer.presign(&method, &url, expires, utc_now())?),
            None => Ok(url.to_string()),
        }
    }

    /// Signs and sends a request. Non-2xx responses become
    /// [`Error::Service`].
    pub async fn execute(
        &self,
        method: Method,
        headers: &mut Multimap,
        query_params: &Multimap,
        bucket: &str,
        object: Option<&str>,
        body: Option<SegmentedBytes>,
    ) -> Result<HttpResponse, Error> {
        check_bucket_name(bucket, true)?;
        if let Some(o) = object {
            check_object_name(o)?;
        }

        let url = self.shared.base_url.build_url(query_params, bucket, object);

        let sha256: String = match method {
            Method::PUT | Method::POST => {
                if !headers.contains_key_ignore_case(CONTENT_TYPE) {
                    headers.add(CONTENT_TYPE, "application/octet-stream");
                }
                headers.remove_ignore_case(CONTENT_LENGTH);
                headers.add(
                    CONTENT_LENGTH,
                    body.as_ref().map_or(0, SegmentedBytes::len).to_string(),
                );
                match &body {
                    None => EMPTY_SHA256.into(),
                    Some(v) => {
                        let data = v.clone();
                        tokio::task::spawn_blocking(move || sha256_hash_sb(&data))
                            .await
                            .map_err(std::io::Error::other)?
                    }
                }
            }
            _ => EMPTY_SHA256.into(),
        };

        match &self.shared.signer {
            Some(signer) => signer.sign(&method, &url, headers, &sha256, utc_now())?,
            None => {
                if !headers.contains_key_ignore_case(HOST) {
                    headers.add(HOST, url.host_header_value());
                }
            }
        }

        log::debug!("{method} {url}");

        let resp = self
            .shared
            .transport
            .execute(HttpRequest {
                method: method.clone(),
                url,
                headers: headers.clone(),
                body,
            })
            .await?;

        if resp.is_success() {
            return Ok(resp);
        }

        let err = parse_error_response(&resp);
        log::debug!(
            "{method} {bucket}{} failed (request id {}): {err}",
            object.map(|o| format!("/{o}")).unwrap_or_default(),
            resp.header(X_AMZ_REQUEST_ID).unwrap_or("-")
        );
        Err(err.into())
    }
}

/// Maps an error response onto a [`ServiceError`] using its status, the
/// `Code` and `Message` of the S3 XML error body and any `Retry-After`.
pub(crate) fn parse_error_response(resp: &HttpResponse) -> ServiceError {
    let retry_after = resp
        .header(RETRY_AFTER)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);

    let (code, mut message) = match Element::parse(resp.body.as_ref()) {
        Ok(root) => (
            get_default_text(&root, "Code"),
            get_default_text(&root, "Message"),
        ),
        Err(_) => (String::new(), String::new()),
    };

    if message.is_empty() {
        message = http::StatusCode::from_u16(resp.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("unexpected response")
            .to_string();
    }

    ServiceError::from_response(resp.status, &code, &message, retry_after)
}

fn trim_etag(etag: &str) -> String {
    etag.trim().trim_matches('"').to_string()
}

fn check_upload_id(upload_id: &str) -> Result<(), ValidationErr> {
    if upload_id.is_empty() {
        return Err(ValidationErr::InvalidUploadId(
            "upload ID cannot be empty".into(),
        ));
    }
    Ok(())
}

fn complete_multipart_body(parts: &[CompletedPart]) -> Bytes {
    // Set capacity of the byte-buffer based on the part count - attempting
    // to avoid extra allocations when building the XML payload.
    let mut data = BytesMut::with_capacity(100 * parts.len() + 100);
    data.extend_from_slice(b"<CompleteMultipartUpload>");
    for part in parts {
        data.extend_from_slice(b"<Part><PartNumber>");
        data.extend_from_slice(part.part_number.to_string().as_bytes());
        data.extend_from_slice(b"</PartNumber><ETag>");
        data.extend_from_slice(part.etag.as_bytes());
        data.extend_from_slice(b"</ETag></Part>");
    }
    data.extend_from_slice(b"</CompleteMultipartUpload>");
    data.freeze()
}

#[async_trait]
impl MultipartApi for S3Client {
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        headers: &Multimap,
    ) -> Result<String, Error> {
        let mut headers = headers.clone();
        let mut query_params = Multimap::new();
        query_params.add("uploads", "");

        let resp = self
            .execute(Method::POST, &mut headers, &query_params, bucket, Some(key), None)
            .await?;

        let root = Element::parse(resp.body.as_ref())?;
        get_option_text(&root, "UploadId")
            .filter(|v| !v.is_empty())
            .ok_or(
                MultipartError::MissingField {
                    operation: "CreateMultipartUpload",
                    field: "UploadId",
                }
                .into(),
            )
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u16,
        body: SegmentedBytes,
    ) -> Result<String, Error> {
        check_upload_id(upload_id)?;
        if part_number == 0 || part_number > MAX_MULTIPART_COUNT {
            return Err(MultipartError::InvalidPartNumber(part_number as u32).into());
        }

        let mut query_params = Multimap::new();
        query_params.add("partNumber", part_number.to_string());
        query_params.add("uploadId", upload_id);

        let resp = self
            .execute(
                Method::PUT,
                &mut Multimap::new(),
                &query_params,
                bucket,
                Some(key),
                Some(body),
            )
            .await?;

        resp.header(ETAG)
            .map(trim_etag)
            .filter(|v| !v.is_empty())
            .ok_or(
                MultipartError::MissingField {
                    operation: "UploadPart",
                    field: "ETag",
                }
                .into(),
            )
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<String, Error> {
        check_upload_id(upload_id)?;

        let data = complete_multipart_body(parts);
        let mut headers = Multimap::new();
        headers.add(CONTENT_TYPE, "application/xml");
        headers.add(CONTENT_MD5, md5sum_hash(data.as_ref()));

        let mut query_params = Multimap::new();
        query_params.add("uploadId", upload_id);

        let resp = self
            .execute(
                Method::POST,
                &mut headers,
                &query_params,
                bucket,
                Some(key),
                Some(SegmentedBytes::from(data)),
            )
            .await?;

        let root = Element::parse(resp.body.as_ref())?;

        // The service may report a failure inside a 200 response.
        if root.name == "Error" {
            return Err(ServiceError::from_response(
                500,
                &get_default_text(&root, "Code"),
                &get_default_text(&root, "Message"),
                None,
            )
            .into());
        }

        get_option_text(&root, "ETag")
            .map(|v| trim_etag(&v))
            .filter(|v| !v.is_empty())
            .ok_or(
                MultipartError::MissingField {
                    operation: "CompleteMultipartUpload",
                    field: "ETag",
                }
                .into(),
            )
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), Error> {
        check_upload_id(upload_id)?;

        let mut query_params = Multimap::new();
        query_params.add("uploadId", upload_id);

        self.execute(
            Method::DELETE,
            &mut Multimap::new(),
            &query_params,
            bucket,
            Some(key),
            None,
        )
        .await?;
        Ok(())
    }
}
