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

//! Signature V4 for S3 API

use crate::s3::canonical::CanonicalRequest;
use crate::s3::creds::{Credentials, Provider};
use crate::s3::error::CanonicalizationError;
use crate::s3::header_constants::*;
use crate::s3::http::Url;
use crate::s3::multimap_ext::{Multimap, MultimapExt};
use crate::s3::utils::{UNSIGNED_PAYLOAD, UtcTime, to_amz_date, to_signer_date};
use hex::encode as hexencode;
use hmac::{Hmac, Mac};
use http::Method;
use sha2::Sha256;
use std::sync::{Arc, RwLock};

/// Longest validity accepted for a presigned URL, in seconds (7 days).
pub const MAX_PRESIGN_EXPIRY: u64 = 604_800;

/// Returns HMAC hash for given key and data
pub fn hmac_hash(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut hasher = Hmac::<Sha256>::new_from_slice(key).expect("HMAC can take key of any size");
    hasher.update(data);
    hasher.finalize().into_bytes().to_vec()
}

/// Returns hex encoded HMAC hash for given key and data
pub fn hmac_hash_hex(key: &[u8], data: &[u8]) -> String {
    hexencode(hmac_hash(key, data))
}

/// Returns scope value of given date stamp, region and service name
pub fn get_scope(date_stamp: &str, region: &str, service_name: &str) -> String {
    format!("{date_stamp}/{region}/{service_name}/aws4_request")
}

/// Returns string-to-sign value of given date, scope and canonical request hash
pub fn get_string_to_sign(date: UtcTime, scope: &str, canonical_request_hash: &str) -> String {
    format!(
        "{SIGN_V4_ALGORITHM}\n{}\n{}\n{}",
        to_amz_date(date),
        scope,
        canonical_request_hash
    )
}

/// Returns authorization value for given access key, scope, signed headers and signature
pub fn get_authorization(
    access_key: &str,
    scope: &str,
    signed_headers: &str,
    signature: &str,
) -> String {
    format!(
        "{SIGN_V4_ALGORITHM} Credential={access_key}/{scope}, SignedHeaders={signed_headers}, Signature={signature}"
    )
}

/// A signing key together with the credential scope it is valid for.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey {
    key: Vec<u8>,
    scope: String,
}

impl SigningKey {
    /// Derives the signing key for a date stamp (`YYYYMMDD`), region and
    /// service through the `AWS4` HMAC chain. An empty secret is accepted
    /// and yields a key no server will accept.
    pub fn derive(secret_key: &str, date_stamp: &str, region: &str, service_name: &str) -> Self {
        let mut key: Vec<u8> = b"AWS4".to_vec();
        key.extend(secret_key.as_bytes());

        let date_key = hmac_hash(&key, date_stamp.as_bytes());
        let date_region_key = hmac_hash(&date_key, region.as_bytes());
        let date_region_service_key = hmac_hash(&date_region_key, service_name.as_bytes());

        SigningKey {
            key: hmac_hash(&date_region_service_key, b"aws4_request"),
            scope: get_scope(date_stamp, region, service_name),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    /// Credential scope, `date/region/service/aws4_request`
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Returns hex encoded signature of given string-to-sign
    pub fn sign(&self, string_to_sign: &str) -> String {
        hmac_hash_hex(&self.key, string_to_sign.as_bytes())
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("key", &"<redacted>")
            .field("scope", &self.scope)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
struct CacheKey {
    secret_key: String,
    date_stamp: String,
    region: String,
    service_name: String,
}

/// Remembers the most recently derived signing key. The key changes at most
/// once a day per region and service, so the HMAC chain is skipped while
/// the inputs stay the same.
#[derive(Default)]
pub struct SigningKeyCache {
    entry: RwLock<Option<(CacheKey, SigningKey)>>,
}

impl SigningKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_derive(
        &self,
        secret_key: &str,
        date_stamp: &str,
        region: &str,
        service_name: &str,
    ) -> SigningKey {
        let lookup = CacheKey {
            secret_key: secret_key.to_string(),
            date_stamp: date_stamp.to_string(),
            region: region.to_string(),
            service_name: service_name.to_string(),
        };

        if let Ok(guard) = self.entry.read() {
            if let Some((cached, key)) = guard.as_ref() {
                if *cached == lookup {
                    return key.clone();
                }
            }
        }

        let key = SigningKey::derive(secret_key, date_stamp, region, service_name);
        if let Ok(mut guard) = self.entry.write() {
            *guard = Some((lookup, key.clone()));
        }
        key
    }
}

impl std::fmt::Debug for SigningKeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyCache").finish_non_exhaustive()
    }
}

/// Signs requests with credentials fetched from a [`Provider`].
#[derive(Debug)]
pub struct RequestSigner {
    provider: Arc<dyn Provider>,
    region: String,
    service_name: String,
    cache: SigningKeyCache,
}

impl RequestSigner {
    pub fn new(provider: Arc<dyn Provider>, region: &str, service_name: &str) -> Self {
        RequestSigner {
            provider,
            region: region.to_string(),
            service_name: service_name.to_string(),
            cache: SigningKeyCache::new(),
        }
    }

    /// Returns a signer for the `s3` service
    pub fn s3(provider: Arc<dyn Provider>, region: &str) -> Self {
        Self::new(provider, region, "s3")
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn signing_key(&self, creds: &Credentials, date: UtcTime) -> SigningKey {
        self.cache.get_or_derive(
            &creds.secret_key,
            &to_signer_date(date),
            &self.region,
            &self.service_name,
        )
    }

    /// Signs a request in place. Sets `Host`, `x-amz-date`,
    /// `x-amz-content-sha256`, `x-amz-security-token` for session
    /// credentials and finally `Authorization`.
    ///
    /// Signed headers are `host`, `x-amz-content-sha256`, `x-amz-date`,
    /// `content-type` and `content-length` when present, and every
    /// `x-amz-*` header.
    pub fn sign(
        &self,
        method: &Method,
        url: &Url,
        headers: &mut Multimap,
        content_sha256: &str,
        date: UtcTime,
    ) -> Result<(), CanonicalizationError> {
        let creds = self.provider.fetch();

        headers.remove_ignore_case(AUTHORIZATION);
        if !headers.contains_key_ignore_case(HOST) {
            headers.add(HOST, url.host_header_value());
        }
        headers.remove_ignore_case(X_AMZ_DATE);
        headers.add(X_AMZ_DATE, to_amz_date(date));
        headers.remove_ignore_case(X_AMZ_CONTENT_SHA256);
        headers.add(X_AMZ_CONTENT_SHA256, content_sha256);
        if let Some(token) = &creds.session_token {
            headers.remove_ignore_case(X_AMZ_SECURITY_TOKEN);
            headers.add(X_AMZ_SECURITY_TOKEN, token.as_str());
        }

        let signed: Vec<String> = headers
            .keys()
            .map(|k| k.to_lowercase())
            .filter(|k| {
                k == "host"
                    || k == "content-type"
                    || k == "content-length"
                    || k.starts_with("x-amz-")
            })
            .collect();

        let canonical_request =
            CanonicalRequest::build(method, url, headers, &signed, content_sha256)?;
        let signing_key = self.signing_key(&creds, date);
        let string_to_sign =
            get_string_to_sign(date, signing_key.scope(), &canonical_request.hash());
        let signature = signing_key.sign(&string_to_sign);

        headers.add(
            AUTHORIZATION,
            get_authorization(
                &creds.access_key,
                signing_key.scope(),
                &canonical_request.signed_headers,
                &signature,
            ),
        );
        Ok(())
    }

    /// Returns a presigned URL valid for `expires` seconds from `date`.
    ///
    /// Query parameters come out sorted with exactly one `X-Amz-Signature`
    /// appended last; any signature already present on `url` is dropped.
    pub fn presign(
        &self,
        method: &Method,
        url: &Url,
        expires: u64,
        date: UtcTime,
    ) -> Result<String, CanonicalizationError> {
        if expires == 0 || expires > MAX_PRESIGN_EXPIRY {
            return Err(CanonicalizationError::InvalidExpiry(expires));
        }

        let creds = self.provider.fetch();
        let signing_key = self.signing_key(&creds, date);

        let mut url = url.clone();
        for name in [
            X_AMZ_SIGNATURE_PARAM,
            X_AMZ_ALGORITHM_PARAM,
            X_AMZ_CREDENTIAL_PARAM,
            X_AMZ_DATE_PARAM,
            X_AMZ_EXPIRES_PARAM,
            X_AMZ_SIGNED_HEADERS_PARAM,
            X_AMZ_SECURITY_TOKEN_PARAM,
        ] {
            url.query.remove(name);
        }

        url.query.add(X_AMZ_ALGORITHM_PARAM, SIGN_V4_ALGORITHM);
        url.query.add(
            X_AMZ_CREDENTIAL_PARAM,
            format!("{}/{}", creds.access_key, signing_key.scope()),
        );
        url.query.add(X_AMZ_DATE_PARAM, to_amz_date(date));
        url.query.add(X_AMZ_EXPIRES_PARAM, expires.to_string());
        url.query.add(X_AMZ_SIGNED_HEADERS_PARAM, "host");
        if let Some(token) = &creds.session_token {
            url.query.add(X_AMZ_SECURITY_TOKEN_PARAM, token.as_str());
        }

        let canonical_request =
            CanonicalRequest::build(method, &url, &Multimap::new(), &["host"], UNSIGNED_PAYLOAD)?;
        let string_to_sign =
            get_string_to_sign(date, signing_key.scope(), &canonical_request.hash());
        let signature = signing_key.sign(&string_to_sign);

        Ok(format!(
            "{}?{}&{X_AMZ_SIGNATURE_PARAM}={signature}",
            url.without_query(),
            canonical_request.canonical_query
        ))
    }
}
