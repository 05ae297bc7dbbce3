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

//! Credential providers

use std::fmt;

pub const ENV_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const ENV_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const ENV_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";

#[derive(Clone, PartialEq, Eq)]
/// Credentials contain access key, secret key and session token optionally
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(access_key: &str, secret_key: &str, session_token: Option<&str>) -> Self {
        Credentials {
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
            session_token: session_token.map(|v| v.to_string()),
        }
    }
}

// Secrets must never end up in logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Provider trait to fetch credentials. Implement it to plug in custom
/// credential sources.
pub trait Provider: fmt::Debug + Send + Sync {
    fn fetch(&self) -> Credentials;
}

#[derive(Clone, Debug)]
/// Static credential provider
pub struct StaticProvider {
    creds: Credentials,
}

impl StaticProvider {
    /// Returns a static provider with given access key, secret key and optional session token
    ///
    /// # Examples
    ///
    /// ```
    /// use s3_transfer::s3::creds::StaticProvider;
    /// let provider = StaticProvider::new("minioadmin", "minio123", None);
    /// ```
    pub fn new(access_key: &str, secret_key: &str, session_token: Option<&str>) -> StaticProvider {
        StaticProvider {
            creds: Credentials::new(access_key, secret_key, session_token),
        }
    }
}

impl Provider for StaticProvider {
    fn fetch(&self) -> Credentials {
        self.creds.clone()
    }
}

/// Reads `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and `AWS_SESSION_TOKEN`
/// on every fetch, so rotated values are picked up.
#[derive(Clone, Debug, Default)]
pub struct EnvProvider;

impl EnvProvider {
    pub fn new() -> Self {
        EnvProvider
    }

    fn credentials_from(lookup: impl Fn(&str) -> Option<String>) -> Credentials {
        let access_key = lookup(ENV_ACCESS_KEY_ID).unwrap_or_default();
        if access_key.is_empty() {
            log::warn!("{ENV_ACCESS_KEY_ID} is not set; requests will fail authentication");
        }
        Credentials {
            access_key,
            secret_key: lookup(ENV_SECRET_ACCESS_KEY).unwrap_or_default(),
            session_token: lookup(ENV_SESSION_TOKEN).filter(|v| !v.is_empty()),
        }
    }
}

impl Provider for EnvProvider {
    fn fetch(&self) -> Credentials {
        Self::credentials_from(|name| std::env::var(name).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = Credentials::new("AKID", "very-secret", Some("token"));
        let out = format!("{creds:?}");
        assert!(out.contains("AKID"));
        assert!(!out.contains("very-secret"));
        assert!(!out.contains("token\""));
    }

    #[test]
    fn test_static_provider() {
        let provider = StaticProvider::new("a", "b", None);
        let creds = provider.fetch();
        assert_eq!(creds.access_key, "a");
        assert_eq!(creds.secret_key, "b");
        assert!(creds.session_token.is_none());
    }

    fn lookup_in(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_env_provider_reads_all_variables() {
        let creds = EnvProvider::credentials_from(lookup_in(&[
            (ENV_ACCESS_KEY_ID, "AKID"),
            (ENV_SECRET_ACCESS_KEY, "secret"),
            (ENV_SESSION_TOKEN, "token"),
        ]));
        assert_eq!(creds, Credentials::new("AKID", "secret", Some("token")));
    }

    #[test]
    fn test_env_provider_ignores_empty_session_token() {
        let creds = EnvProvider::credentials_from(lookup_in(&[
            (ENV_ACCESS_KEY_ID, "AKID"),
            (ENV_SECRET_ACCESS_KEY, "secret"),
            (ENV_SESSION_TOKEN, ""),
        ]));
        assert_eq!(creds.access_key, "AKID");
        assert!(creds.session_token.is_none());
    }

    #[test]
    fn test_env_provider_missing_variables() {
        let creds = EnvProvider::credentials_from(lookup_in(&[]));
        assert_eq!(creds, Credentials::new("", "", None));
    }
}
