// MinIO Rust Library for Amazon S3 Compatible Cloud Storage
// Copyright 2025 MinIO, Inc.
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

//! HTTP transport abstraction and its reqwest implementation

use crate::s3::error::{CanonicalizationError, Error};
use crate::s3::http::Url;
use crate::s3::multimap_ext::{Multimap, MultimapExt};
use crate::s3::segmented_bytes::SegmentedBytes;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use http::Method;
use reqwest::Body;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

/// A signed request ready to be sent.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Multimap,
    pub body: Option<SegmentedBytes>,
}

/// A response with its body fully read.
#[derive(Clone, Debug, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Multimap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First value of a header, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get_all_ignore_case(name).into_iter().next()
    }
}

pub type ResponseBodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// A response whose body is consumed chunk by chunk.
pub struct StreamingResponse {
    pub status: u16,
    pub headers: Multimap,
    pub body: ResponseBodyStream,
}

impl StreamingResponse {
    /// Reads the remaining body into memory.
    pub async fn collect(mut self) -> Result<HttpResponse, Error> {
        let mut body = SegmentedBytes::new();
        while let Some(chunk) = self.body.next().await {
            body.append(chunk?);
        }
        Ok(HttpResponse {
            status: self.status,
            headers: self.headers,
            body: body.to_bytes(),
        })
    }
}

impl std::fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Sends HTTP requests. Implementations must map transport failures to
/// [`NetworkError`](crate::s3::error::NetworkError); non-2xx responses are returned as-is.
#[async_trait]
pub trait Transport: std::fmt::Debug + Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, Error>;

    async fn execute_stream(&self, request: HttpRequest) -> Result<StreamingResponse, Error>;
}

/// HTTP connection pool configuration.
///
/// # Example
///
/// ```
/// use s3_transfer::s3::transport::ConnectionPoolConfig;
/// use std::time::Duration;
///
/// // High-throughput configuration
/// let config = ConnectionPoolConfig::default()
///     .max_idle_per_host(64)
///     .idle_timeout(Duration::from_secs(120));
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionPoolConfig {
    /// Maximum number of idle connections per host. Default: 32
    pub max_idle_per_host: usize,

    /// How long idle connections are kept in the pool. Default: 90 seconds
    pub idle_timeout: Duration,

    /// TCP keepalive interval. Default: 60 seconds
    pub tcp_keepalive: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm). Default: true
    pub tcp_nodelay: bool,

    /// Timeout for a whole request including the body. Default: none
    pub request_timeout: Option<Duration>,

    /// Timeout for establishing a connection. Default: 30 seconds
    pub connect_timeout: Duration,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 32,
            idle_timeout: Duration::from_secs(90),
            tcp_keepalive: Duration::from_secs(60),
            tcp_nodelay: true,
            request_timeout: None,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl ConnectionPoolConfig {
    /// Set the maximum number of idle connections per host.
    ///
    /// Typical values: 2-8 for light usage, 16-64 for heavy parallel workloads.
    pub fn max_idle_per_host(mut self, max: usize) -> Self {
        self.max_idle_per_host = max;
        self
    }

    /// Set how long idle connections are kept in the pool.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the TCP keepalive interval.
    pub fn tcp_keepalive(mut self, interval: Duration) -> Self {
        self.tcp_keepalive = interval;
        self
    }

    /// Enable or disable TCP_NODELAY (Nagle's algorithm).
    pub fn tcp_nodelay(mut self, enable: bool) -> Self {
        self.tcp_nodelay = enable;
        self
    }

    /// Set the per request timeout. Part uploads have no timeout of their
    /// own, so this bounds how long a stalled part can block a worker.
    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Builds a [`ReqwestTransport`].
#[derive(Debug, Default)]
pub struct ReqwestTransportBuilder {
    pool_config: ConnectionPoolConfig,
    app_info: Option<(String, String)>,
    ssl_cert_file: Option<PathBuf>,
    ignore_cert_check: Option<bool>,
}

impl ReqwestTransportBuilder {
    pub fn connection_pool_config(mut self, config: ConnectionPoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Set the app info as an Option of (app_name, app_version) pair. This will
    /// show up in the user-agent.
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

    pub fn build(self) -> Result<ReqwestTransport, Error> {
        let pool_config = &self.pool_config;
        let mut builder = reqwest::Client::builder()
            .no_gzip()
            .tcp_nodelay(pool_config.tcp_nodelay)
            .tcp_keepalive(pool_config.tcp_keepalive)
            .pool_max_idle_per_host(pool_config.max_idle_per_host)
            .pool_idle_timeout(pool_config.idle_timeout)
            .connect_timeout(pool_config.connect_timeout);

        if let Some(timeout) = pool_config.request_timeout {
            builder = builder.timeout(timeout);
        }

        #[cfg(feature = "http2")]
        {
            builder = builder.http2_adaptive_window(true);
        }

        let mut user_agent = String::from("s3-transfer (")
            + std::env::consts::OS
            + "; "
            + std::env::consts::ARCH
            + ") s3-transfer-rs/"
            + env!("CARGO_PKG_VERSION");

        if let Some((app_name, app_version)) = self.app_info {
            user_agent.push_str(format!(" {app_name}/{app_version}").as_str());
        }
        builder = builder.user_agent(user_agent);

        #[cfg(any(
            feature = "default-tls",
            feature = "native-tls",
            feature = "rustls-tls"
        ))]
        if let Some(v) = self.ignore_cert_check {
            builder = builder.danger_accept_invalid_certs(v);
        }

        #[cfg(any(
            feature = "default-tls",
            feature = "native-tls",
            feature = "rustls-tls"
        ))]
        if let Some(v) = self.ssl_cert_file {
            let buf = std::fs::read(v)?;
            for cert in reqwest::Certificate::from_pem_bundle(&buf)? {
                builder = builder.add_root_certificate(cert);
            }
        }

        Ok(ReqwestTransport {
            http_client: builder.build()?,
        })
    }
}

/// [`Transport`] backed by a pooled `reqwest::Client`.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::default()
    }

    /// Returns a transport with default pool settings.
    pub fn new() -> Result<Self, Error> {
        Self::builder().build()
    }

    async fn send(&self, request: HttpRequest) -> Result<reqwest::Response, Error> {
        if request.url.host.is_empty() {
            return Err(CanonicalizationError::InvalidUrl {
                url: request.url.without_query(),
                reason: "host is missing".into(),
            }
            .into());
        }

        let mut req = self
            .http_client
            .request(request.method.clone(), request.url.to_string());

        for (key, values) in request.headers.iter_all() {
            for value in values {
                req = req.header(key, value);
            }
        }

        if let Some(body) = request.body {
            let stream = futures_util::stream::iter(
                body.into_iter().map(Ok::<_, std::io::Error>),
            );
            req = req.body(Body::wrap_stream(stream));
        }

        Ok(req.send().await?)
    }
}

fn headers_to_multimap(headers: &reqwest::header::HeaderMap) -> Multimap {
    let mut map = Multimap::new();
    for (name, value) in headers {
        // Non UTF-8 values cannot be represented and are skipped.
        if let Ok(v) = value.to_str() {
            map.add(name.as_str(), v);
        }
    }
    map
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        let resp = self.send(request).await?;
        let status = resp.status().as_u16();
        let headers = headers_to_multimap(resp.headers());
        let body = resp.bytes().await?;
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn execute_stream(&self, request: HttpRequest) -> Result<StreamingResponse, Error> {
        let resp = self.send(request).await?;
        let status = resp.status().as_u16();
        let headers = headers_to_multimap(resp.headers());
        let body = resp.bytes_stream().map(|r| r.map_err(Error::from));
        Ok(StreamingResponse {
            status,
            headers,
            body: Box::pin(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_setters() {
        let config = ConnectionPoolConfig::default()
            .max_idle_per_host(4)
            .idle_timeout(Duration::from_secs(30))
            .request_timeout(Some(Duration::from_secs(300)))
            .tcp_nodelay(false);
        assert_eq!(config.max_idle_per_host, 4);
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(300)));
        assert!(!config.tcp_nodelay);
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_response_header_lookup() {
        let mut headers = Multimap::new();
        headers.add("etag", "\"abc\"");
        let resp = HttpResponse {
            status: 200,
            headers,
            body: Bytes::new(),
        };
        assert!(resp.is_success());
        assert_eq!(resp.header("ETag"), Some("\"abc\""));
        assert_eq!(resp.header("x-amz-request-id"), None);
    }

    #[tokio::test]
    async fn test_streaming_response_collect() {
        let chunks: Vec<Result<Bytes, Error>> =
            vec![Ok(Bytes::from_static(b"ab")), Ok(Bytes::from_static(b"cd"))];
        let resp = StreamingResponse {
            status: 200,
            headers: Multimap::new(),
            body: Box::pin(futures_util::stream::iter(chunks)),
        };
        assert_eq!(resp.collect().await.unwrap().body, "abcd");
    }

    #[tokio::test]
    async fn test_reqwest_transport_rejects_missing_host() {
        let transport = ReqwestTransport::new().unwrap();
        let err = transport
            .execute(HttpRequest {
                method: Method::GET,
                url: Url::default(),
                headers: Multimap::new(),
                body: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Canonicalization(CanonicalizationError::InvalidUrl { .. })
        ));
        assert!(!err.is_retryable());
    }
}
