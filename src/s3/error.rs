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

//! Error definitions for signing and multipart upload operations

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Failures while turning a request into its canonical form. These are
/// deterministic and never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CanonicalizationError {
    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid header name `{0}`")]
    InvalidHeaderName(String),

    #[error("invalid value for header `{0}`")]
    InvalidHeaderValue(String),

    #[error("signed header `{0}` is not present in the request")]
    MissingSignedHeader(String),

    #[error("presigned URL expiry of {0} seconds is outside 1..=604800")]
    InvalidExpiry(u64),
}

/// Argument validation failures raised before any request is sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationErr {
    #[error("invalid bucket name: {0}")]
    InvalidBucketName(String),

    #[error("invalid object name: {0}")]
    InvalidObjectName(String),

    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("invalid upload ID: {0}")]
    InvalidUploadId(String),
}

/// Transport level failures. These are retryable at the part level.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transport failure: {0}")]
    Transport(String),
}

/// Remote 4xx/5xx responses mapped onto the kinds callers act on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("request rate limited{}", .retry_after.map(|d| format!(" (retry after {}s)", d.as_secs())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    #[error("service error {status}; code: {code}, message: {message}")]
    Unknown {
        status: u16,
        code: String,
        message: String,
    },
}

impl ServiceError {
    /// Maps a status code plus the `Code`/`Message` of an S3 XML error body
    /// onto a service error kind.
    pub fn from_response(
        status: u16,
        code: &str,
        message: &str,
        retry_after: Option<Duration>,
    ) -> Self {
        let message = message.to_string();
        match (status, code) {
            (404, _) | (_, "NoSuchKey") | (_, "NoSuchBucket") | (_, "NoSuchUpload") => {
                ServiceError::NotFound(message)
            }
            (403, _) | (_, "AccessDenied") => ServiceError::AccessDenied(message),
            (412, _) | (_, "PreconditionFailed") => ServiceError::PreconditionFailed(message),
            (429, _) | (_, "SlowDown") | (_, "TooManyRequests") => {
                ServiceError::RateLimited { retry_after }
            }
            _ => ServiceError::Unknown {
                status,
                code: code.to_string(),
                message,
            },
        }
    }

    /// Returns `true` if a request failing with this error may succeed when
    /// sent again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::RateLimited { .. } => true,
            ServiceError::Unknown { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// A multipart session that could not be aborted and may still hold parts
/// on the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanedUpload {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub reason: String,
}

impl fmt::Display for OrphanedUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "upload {} of {}/{} was not aborted: {}",
            self.upload_id, self.bucket, self.key, self.reason
        )
    }
}

#[derive(Error, Debug)]
pub enum MultipartError {
    #[error("part {part_number} failed after {attempts} attempt(s): {source}{}", .orphaned.as_ref().map(|o| format!("; {o}")).unwrap_or_default())]
    PartFailed {
        part_number: u16,
        attempts: u32,
        #[source]
        source: Box<Error>,
        orphaned: Option<OrphanedUpload>,
    },

    #[error("{operation} response is missing required field {field}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },

    /// An upload failed with `source` and the session could not be aborted
    /// afterwards.
    #[error("{source}; {orphaned}")]
    AbortFailed {
        #[source]
        source: Box<Error>,
        orphaned: OrphanedUpload,
    },

    #[error("too many parts for upload; maximum allowed {0}")]
    TooManyParts(u16),

    #[error("part number {0} is outside 1..=10000")]
    InvalidPartNumber(u32),

    #[error("part {0} was already completed")]
    DuplicatePart(u16),

    #[error("part {part_number} has {size} bytes; parts other than the last need at least 5MiB")]
    PartTooSmall { part_number: u16, size: u64 },

    #[error("part size {0} is not supported; allowed range is 5MiB..=5GiB")]
    InvalidPartSize(u64),

    #[error("object size {0} is not supported; maximum allowed 5TiB")]
    InvalidObjectSize(u64),

    #[error("valid part size must be provided when object size is unknown")]
    MissingPartSize,

    #[error("source produced {actual} bytes but {expected} were declared")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("resumable state does not match upload: {0}")]
    StateMismatch(String),
}

#[derive(Error, Debug)]
pub enum StateError {
    #[error("unsupported resumable state version {0}")]
    UnsupportedVersion(u32),

    #[error("resumable state encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Crate error.
#[derive(Error, Debug)]
pub enum Error {
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationErr),

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    #[error("multipart error: {0}")]
    Multipart(#[from] MultipartError),

    #[error("resumable state error: {0}")]
    State(#[from] StateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parse error: {0}")]
    XmlParse(#[from] xmltree::ParseError),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(NetworkError::Http(err))
    }
}

impl Error {
    /// Returns `true` for failures a part upload may recover from by retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::Service(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Server supplied delay for rate limited requests.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::Service(ServiceError::RateLimited { retry_after }) => *retry_after,
            _ => None,
        }
    }

    /// Returns the upload left behind on the remote side when a failed upload
    /// could not be aborted.
    pub fn orphaned_upload(&self) -> Option<&OrphanedUpload> {
        match self {
            Error::Multipart(MultipartError::PartFailed { orphaned, .. }) => orphaned.as_ref(),
            Error::Multipart(MultipartError::AbortFailed { orphaned, .. }) => Some(orphaned),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_mapping() {
        assert_eq!(
            ServiceError::from_response(404, "NoSuchKey", "gone", None),
            ServiceError::NotFound("gone".into())
        );
        assert_eq!(
            ServiceError::from_response(403, "SignatureDoesNotMatch", "bad", None),
            ServiceError::AccessDenied("bad".into())
        );
        assert_eq!(
            ServiceError::from_response(412, "PreconditionFailed", "", None),
            ServiceError::PreconditionFailed(String::new())
        );
        assert_eq!(
            ServiceError::from_response(503, "SlowDown", "", Some(Duration::from_secs(2))),
            ServiceError::RateLimited {
                retry_after: Some(Duration::from_secs(2))
            }
        );
        assert_eq!(
            ServiceError::from_response(500, "InternalError", "oops", None),
            ServiceError::Unknown {
                status: 500,
                code: "InternalError".into(),
                message: "oops".into()
            }
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::from(NetworkError::Transport("reset".into())).is_retryable());
        assert!(Error::from(ServiceError::RateLimited { retry_after: None }).is_retryable());
        assert!(
            Error::from(ServiceError::Unknown {
                status: 502,
                code: "BadGateway".into(),
                message: String::new(),
            })
            .is_retryable()
        );
        assert!(
            !Error::from(ServiceError::Unknown {
                status: 400,
                code: "InvalidArgument".into(),
                message: String::new(),
            })
            .is_retryable()
        );
        assert!(!Error::from(ServiceError::AccessDenied(String::new())).is_retryable());
        assert!(
            !Error::from(CanonicalizationError::InvalidHeaderName("a b".into())).is_retryable()
        );
    }

    #[test]
    fn test_orphaned_upload_is_reported() {
        let err: Error = MultipartError::PartFailed {
            part_number: 3,
            attempts: 2,
            source: Box::new(NetworkError::Transport("reset".into()).into()),
            orphaned: Some(OrphanedUpload {
                bucket: "bucket".into(),
                key: "key".into(),
                upload_id: "id".into(),
                reason: "abort refused".into(),
            }),
        }
        .into();

        let orphaned = err.orphaned_upload().unwrap();
        assert_eq!(orphaned.upload_id, "id");
        assert!(err.to_string().contains("was not aborted"));
    }

    #[test]
    fn test_abort_failure_keeps_original_error() {
        let err: Error = MultipartError::AbortFailed {
            source: Box::new(
                ServiceError::from_response(500, "InternalError", "busy", None).into(),
            ),
            orphaned: OrphanedUpload {
                bucket: "bucket".into(),
                key: "key".into(),
                upload_id: "id".into(),
                reason: "abort refused".into(),
            },
        }
        .into();

        assert_eq!(err.orphaned_upload().unwrap().upload_id, "id");
        let msg = err.to_string();
        assert!(msg.contains("busy"), "{msg}");
        assert!(msg.contains("upload id of bucket/key was not aborted"), "{msg}");
    }
}
