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

use async_trait::async_trait;
use bytes::Bytes;
use s3_transfer::s3::error::{Error, NetworkError, ServiceError};
use s3_transfer::s3::multimap_ext::Multimap;
use s3_transfer::s3::multipart::{CompletedPart, MultipartApi};
use s3_transfer::s3::segmented_bytes::SegmentedBytes;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hasher;
use std::sync::Mutex;
use std::time::Duration;

/// Kind of error injected into a part upload.
#[derive(Clone, Debug)]
pub enum Fault {
    /// Connection level failure, retried by the scheduler
    Retryable,
    /// Rate limiting with a server supplied delay
    RateLimited(Duration),
    /// Access denied, never retried
    Fatal,
}

impl Fault {
    fn to_error(&self) -> Error {
        match self {
            Fault::Retryable => NetworkError::Transport("connection reset by peer".into()).into(),
            Fault::RateLimited(d) => ServiceError::RateLimited {
                retry_after: Some(*d),
            }
            .into(),
            Fault::Fatal => ServiceError::AccessDenied("injected".into()).into(),
        }
    }
}

struct PendingUpload {
    bucket: String,
    key: String,
    parts: BTreeMap<u16, (String, Bytes)>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    uploads: HashMap<String, PendingUpload>,
    objects: HashMap<(String, String), Bytes>,
    part_faults: HashMap<u16, (u32, Fault)>,
    part_latency: HashMap<u16, Duration>,
    fail_abort: bool,
    fail_complete: bool,
    created: Vec<Multimap>,
    upload_part_calls: Vec<u16>,
    completion_order: Vec<u16>,
    complete_calls: Vec<Vec<CompletedPart>>,
    abort_calls: Vec<String>,
    in_flight: usize,
    max_in_flight: usize,
}

/// In-memory [`MultipartApi`] with fault injection.
///
/// Parts are kept per upload ID until the upload is completed, when they are
/// concatenated into an object, or aborted.
#[derive(Default)]
pub struct MockStore {
    inner: Mutex<Inner>,
    latency: Duration,
}

fn etag_of(data: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    hasher.write(data);
    format!("{:016x}", hasher.finish())
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every part upload sleeps this long before it is stored.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the next `times` uploads of part `part_number` with `fault`.
    pub fn fail_part(&self, part_number: u16, times: u32, fault: Fault) {
        self.lock().part_faults.insert(part_number, (times, fault));
    }

    /// Uploads of part `part_number` sleep `latency` instead of the store
    /// wide latency.
    pub fn delay_part(&self, part_number: u16, latency: Duration) {
        self.lock().part_latency.insert(part_number, latency);
    }

    /// Make every abort request fail.
    pub fn fail_abort(&self) {
        self.lock().fail_abort = true;
    }

    /// Make every complete request fail with a 500; the upload stays open.
    pub fn fail_complete(&self) {
        self.lock().fail_complete = true;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    /// Part numbers of all upload part calls, in dispatch order.
    pub fn upload_part_calls(&self) -> Vec<u16> {
        self.lock().upload_part_calls.clone()
    }

    /// Part numbers in the order their uploads were stored.
    pub fn completion_order(&self) -> Vec<u16> {
        self.lock().completion_order.clone()
    }

    /// Part lists handed to every complete call.
    pub fn complete_calls(&self) -> Vec<Vec<CompletedPart>> {
        self.lock().complete_calls.clone()
    }

    /// Upload IDs of every abort call.
    pub fn abort_calls(&self) -> Vec<String> {
        self.lock().abort_calls.clone()
    }

    /// Headers passed to every create call.
    pub fn create_calls(&self) -> Vec<Multimap> {
        self.lock().created.clone()
    }

    /// Highest number of part uploads seen running at once.
    pub fn max_in_flight(&self) -> usize {
        self.lock().max_in_flight
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Whether `upload_id` is still open.
    pub fn is_pending(&self, upload_id: &str) -> bool {
        self.lock().uploads.contains_key(upload_id)
    }

    /// Numbers of the parts stored for an open upload.
    pub fn stored_parts(&self, upload_id: &str) -> Vec<u16> {
        self.lock()
            .uploads
            .get(upload_id)
            .map(|u| u.parts.keys().copied().collect())
            .unwrap_or_default()
    }

    fn no_such_upload(upload_id: &str) -> Error {
        ServiceError::from_response(404, "NoSuchUpload", &format!("no upload {upload_id}"), None)
            .into()
    }
}

#[async_trait]
impl MultipartApi for MockStore {
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        headers: &Multimap,
    ) -> Result<String, Error> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let upload_id = format!("upload-{}", inner.next_id);
        inner.created.push(headers.clone());
        inner.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        part_number: u16,
        body: SegmentedBytes,
    ) -> Result<String, Error> {
        let latency = {
            let mut inner = self.lock();
            inner.upload_part_calls.push(part_number);
            inner.in_flight += 1;
            inner.max_in_flight = inner.max_in_flight.max(inner.in_flight);
            inner
                .part_latency
                .get(&part_number)
                .copied()
                .unwrap_or(self.latency)
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        } else {
            tokio::task::yield_now().await;
        }

        let mut inner = self.lock();
        inner.in_flight -= 1;

        if let Some((remaining, fault)) = inner.part_faults.get_mut(&part_number) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(fault.to_error());
            }
        }

        let data = body.to_bytes();
        let etag = etag_of(&data);
        let upload = inner
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| Self::no_such_upload(upload_id))?;
        upload.parts.insert(part_number, (etag.clone(), data));
        inner.completion_order.push(part_number);
        Ok(etag)
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<String, Error> {
        let mut inner = self.lock();
        inner.complete_calls.push(parts.to_vec());
        if inner.fail_complete {
            return Err(
                ServiceError::from_response(500, "InternalError", "complete refused", None).into(),
            );
        }

        let upload = inner
            .uploads
            .remove(upload_id)
            .ok_or_else(|| Self::no_such_upload(upload_id))?;
        assert_eq!((upload.bucket.as_str(), upload.key.as_str()), (bucket, key));

        let mut content = Vec::new();
        let mut last = 0;
        for part in parts {
            if part.part_number <= last {
                return Err(ServiceError::from_response(400, "InvalidPartOrder", "", None).into());
            }
            last = part.part_number;
            match upload.parts.get(&part.part_number) {
                Some((etag, data)) if *etag == part.etag => content.extend_from_slice(data),
                _ => {
                    return Err(ServiceError::from_response(400, "InvalidPart", "", None).into());
                }
            }
        }

        let content = Bytes::from(content);
        let etag = format!("{}-{}", etag_of(&content), parts.len());
        inner
            .objects
            .insert((bucket.to_string(), key.to_string()), content);
        Ok(etag)
    }

    async fn abort_multipart_upload(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
    ) -> Result<(), Error> {
        let mut inner = self.lock();
        inner.abort_calls.push(upload_id.to_string());
        if inner.fail_abort {
            return Err(NetworkError::Transport("connection refused".into()).into());
        }
        inner.uploads.remove(upload_id);
        Ok(())
    }
}
