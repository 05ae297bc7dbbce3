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

//! Canonical request construction for Signature V4

use crate::s3::error::CanonicalizationError;
use crate::s3::http::Url;
use crate::s3::multimap_ext::{Multimap, MultimapExt, collapse_spaces};
use crate::s3::utils::{sha256_hash, url_encode_path};
use http::{HeaderName, HeaderValue, Method};
use std::fmt;

/// The fixed-format request description that gets hashed and signed.
///
/// ```text
/// HTTPRequestMethod + '\n' +
/// CanonicalURI + '\n' +
/// CanonicalQueryString + '\n' +
/// CanonicalHeaders + '\n\n' +
/// SignedHeaders + '\n' +
/// HexEncode(Hash(RequestPayload))
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CanonicalRequest {
    pub method: Method,
    pub canonical_uri: String,
    pub canonical_query: String,
    /// `name:value` lines joined by `\n`, without the trailing newline.
    pub canonical_headers: String,
    pub signed_headers: String,
    pub payload_hash: String,
}

impl CanonicalRequest {
    /// Builds the canonical form of a request.
    ///
    /// `signed_header_names` may be given in any case and order, and may
    /// contain duplicates. A `host` entry missing from `headers` is taken
    /// from the URL.
    pub fn build<S: AsRef<str>>(
        method: &Method,
        url: &Url,
        headers: &Multimap,
        signed_header_names: &[S],
        payload_hash: &str,
    ) -> Result<Self, CanonicalizationError> {
        if url.host.is_empty() {
            return Err(CanonicalizationError::InvalidUrl {
                url: url.without_query(),
                reason: "host is missing".into(),
            });
        }

        let mut names: Vec<String> = signed_header_names
            .iter()
            .map(|n| n.as_ref().trim().to_lowercase())
            .collect();
        names.sort();
        names.dedup();

        let mut canonical_headers = String::new();
        for name in &names {
            if HeaderName::from_bytes(name.as_bytes()).is_err() {
                return Err(CanonicalizationError::InvalidHeaderName(name.clone()));
            }

            let mut values: Vec<String> = Vec::new();
            for value in headers.get_all_ignore_case(name) {
                if HeaderValue::from_str(value).is_err() {
                    return Err(CanonicalizationError::InvalidHeaderValue(name.clone()));
                }
                values.push(collapse_spaces(value).into_owned());
            }
            if values.is_empty() {
                if name != "host" {
                    return Err(CanonicalizationError::MissingSignedHeader(name.clone()));
                }
                values.push(url.host_header_value());
            }

            if !canonical_headers.is_empty() {
                canonical_headers.push('\n');
            }
            canonical_headers.push_str(name);
            canonical_headers.push(':');
            canonical_headers.push_str(&values.join(","));
        }

        let path = if url.path.is_empty() { "/" } else { &url.path };

        Ok(CanonicalRequest {
            method: method.clone(),
            canonical_uri: url_encode_path(path).into_owned(),
            canonical_query: url.query.get_canonical_query_string(),
            canonical_headers,
            signed_headers: names.join(";"),
            payload_hash: payload_hash.to_string(),
        })
    }

    /// Hex encoded SHA256 of the canonical request string
    pub fn hash(&self) -> String {
        sha256_hash(self.to_string().as_bytes())
    }
}

impl fmt::Display for CanonicalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n{}\n{}\n{}\n\n{}\n{}",
            self.method,
            self.canonical_uri,
            self.canonical_query,
            self.canonical_headers,
            self.signed_headers,
            self.payload_hash
        )
    }
}
