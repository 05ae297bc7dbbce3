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

//! Concurrent, retrying and resumable multipart uploads.
//!
//! [`MultipartUpload`] drives a whole upload: it splits the source with a
//! [`PartPlanner`], hands parts to an [`UploadScheduler`] and records every
//! finished part in a [`ResumableState`] snapshot that callers may persist
//! and later pass back to continue an interrupted upload.

pub mod planner;
pub mod scheduler;
pub mod state;
pub mod upload;

pub use planner::{
    MAX_MULTIPART_COUNT, MAX_OBJECT_SIZE, MAX_PART_SIZE, MIN_PART_SIZE, Part, PartPlanner,
    calc_part_info,
};
pub use scheduler::{RetryPolicy, UploadScheduler};
pub use state::{CompletedPart, ResumableState, UploadSession};
pub use upload::{MultipartUpload, MultipartUploadOutput};

use crate::s3::error::Error;
use crate::s3::multimap_ext::Multimap;
use crate::s3::segmented_bytes::SegmentedBytes;
use async_trait::async_trait;

/// The four object store calls a multipart upload is made of.
///
/// [`S3Client`](crate::s3::client::S3Client) implements it over HTTP; tests
/// substitute in-memory stores.
#[async_trait]
pub trait MultipartApi: Send + Sync {
    /// Starts a session and returns its upload ID.
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        headers: &Multimap,
    ) -> Result<String, Error>;

    /// Uploads one part and returns its ETag.
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u16,
        body: SegmentedBytes,
    ) -> Result<String, Error>;

    /// Assembles the object from `parts`, which must be in ascending order.
    /// Returns the ETag of the object.
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<String, Error>;

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), Error>;
}
