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

//! HTTP URL definitions

use crate::s3::client::DEFAULT_REGION;
use crate::s3::error::{CanonicalizationError, ValidationErr};
use crate::s3::multimap_ext::{Multimap, MultimapExt};
use crate::s3::utils::{url_decode, url_encode_path};
use http::Uri;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Debug, PartialEq, Eq)]
/// Represents HTTP URL. `path` and `query` hold decoded values; encoding
/// happens when the URL is rendered or canonicalized.
pub struct Url {
    pub https: bool,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub query: Multimap,
}

impl Url {
    pub fn host_header_value(&self) -> String {
        if self.port > 0 {
            return format!("{}:{}", self.host, self.port);
        }
        self.host.clone()
    }

    /// Returns the URL without its query, e.g. `https://host:9000/bucket/key`
    pub fn without_query(&self) -> String {
        let scheme = if self.https { "https" } else { "http" };
        let path = if self.path.is_empty() { "/" } else { &self.path };
        format!(
            "{scheme}://{}{}",
            self.host_header_value(),
            url_encode_path(path)
        )
    }
}

impl Default for Url {
    fn default() -> Self {
        Self {
            https: true,
            host: String::default(),
            port: u16::default(),
            path: String::default(),
            query: Multimap::default(),
        }
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.host.is_empty() {
            return Err(fmt::Error);
        }

        f.write_str(&self.without_query())?;

        if !self.query.is_empty() {
            f.write_str("?")?;
            f.write_str(&self.query.to_query_string())?;
        }

        Ok(())
    }
}

impl FromStr for Url {
    type Err = CanonicalizationError;

    /// Parses an absolute http(s) URL. Percent-encoded path and query
    /// components are decoded.
    fn from_str(s: &str) -> Result<Self, CanonicalizationError> {
        let invalid = |reason: &str| CanonicalizationError::InvalidUrl {
            url: s.to_string(),
            reason: reason.to_string(),
        };

        let uri = s.parse::<Uri>().map_err(|e| invalid(&e.to_string()))?;

        let https = match uri.scheme_str() {
            Some("https") => true,
            Some("http") => false,
            Some(_) => return Err(invalid("scheme must be http or https")),
            None => return Err(invalid("scheme is missing")),
        };

        let host = match uri.host() {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => return Err(invalid("host is missing")),
        };

        let port = match uri.port_u16() {
            Some(p) if (https && p == 443) || (!https && p == 80) => 0,
            Some(p) => p,
            None => 0,
        };

        let mut query = Multimap::new();
        if let Some(q) = uri.query() {
            for pair in q.split('&').filter(|p| !p.is_empty()) {
                let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
                query.add(url_decode(name), url_decode(value));
            }
        }

        Ok(Url {
            https,
            host,
            port,
            path: url_decode(uri.path()),
            query,
        })
    }
}

#[derive(Clone, Debug)]
/// Represents Base URL of S3 endpoint
pub struct BaseUrl {
    pub https: bool,
    host: String,
    port: u16,
    pub region: String,
    pub virtual_style: bool,
}

impl Default for BaseUrl {
    fn default() -> Self {
        Self {
            https: true,
            host: "127.0.0.1".to_string(),
            port: 9000,
            region: DEFAULT_REGION.to_string(),
            virtual_style: false,
        }
    }
}

impl FromStr for BaseUrl {
    type Err = ValidationErr;

    /// Convert a string to a BaseUrl.
    ///
    /// # Examples
    ///
    /// ```
    /// use s3_transfer::s3::http::BaseUrl;
    ///
    /// let base_url: BaseUrl = "play.min.io".parse().unwrap();
    /// let base_url: BaseUrl = "http://192.168.124.63:9000".parse().unwrap();
    /// let base_url: BaseUrl = "https://s3.us-west-2.amazonaws.com".parse().unwrap();
    /// assert_eq!(base_url.region, "us-west-2");
    /// ```
    fn from_str(s: &str) -> Result<Self, ValidationErr> {
        let url = s
            .parse::<Uri>()
            .map_err(|e| ValidationErr::InvalidBaseUrl(e.to_string()))?;

        let https = match url.scheme_str() {
            None | Some("https") => true,
            Some("http") => false,
            _ => {
                return Err(ValidationErr::InvalidBaseUrl(
                    "scheme must be http or https".into(),
                ));
            }
        };

        let host = match url.host() {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => {
                return Err(ValidationErr::InvalidBaseUrl(
                    "valid host must be provided".into(),
                ));
            }
        };

        let mut port = url.port_u16().unwrap_or(0);
        if (https && port == 443) || (!https && port == 80) {
            port = 0;
        }

        if url.path() != "/" && !url.path().is_empty() {
            return Err(ValidationErr::InvalidBaseUrl(
                "path must be empty for base URL".into(),
            ));
        }

        if url.query().is_some() {
            return Err(ValidationErr::InvalidBaseUrl(
                "query must be none for base URL".into(),
            ));
        }

        // s3.<region>.amazonaws.com carries its region and prefers
        // virtual-host-style addressing.
        let lower = host.to_lowercase();
        let mut region = DEFAULT_REGION.to_string();
        let mut virtual_style = false;
        if lower.ends_with(".amazonaws.com") {
            virtual_style = true;
            let tokens: Vec<&str> = lower.split('.').collect();
            if tokens.len() == 4 && tokens[0] == "s3" {
                region = tokens[1].to_string();
            }
        }

        Ok(BaseUrl {
            https,
            host,
            port,
            region,
            virtual_style,
        })
    }
}

impl BaseUrl {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Builds URL from base URL for given parameters for S3 operation
    pub fn build_url(&self, query: &Multimap, bucket_name: &str, object_name: Option<&str>) -> Url {
        let mut url = Url {
            https: self.https,
            host: self.host.clone(),
            port: self.port,
            path: String::from("/"),
            query: query.clone(),
        };

        // Use path style for bucket name containing '.' which causes
        // SSL certificate validation error.
        let enforce_path_style = bucket_name.contains('.') && self.https;

        let mut path = String::new();
        if enforce_path_style || !self.virtual_style {
            path.push('/');
            path.push_str(bucket_name);
        } else {
            url.host = format!("{}.{}", bucket_name, self.host);
        }

        if let Some(v) = object_name {
            if !v.starts_with('/') {
                path.push('/');
            }
            path.push_str(v);
        }

        if path.is_empty() {
            path.push('/');
        }
        url.path = path;
        url
    }
}
