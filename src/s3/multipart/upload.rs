// MinIO Rust Library for Amazon S3 Compatible Cloud Storage
// Copyright 2023 MinIO, Inc.
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

//! Multipart upload driver

use crate::s3::error::{Error, MultipartError, OrphanedUpload};
use crate::s3::multimap_ext::Multimap;
use crate::s3::multipart::MultipartApi;
use crate::s3::multipart::planner::{
    MAX_MULTIPART_COUNT, MAX_PART_SIZE, MIN_PART_SIZE, PartPlanner, calc_part_info, part_count,
};
use crate::s3::multipart::scheduler::{DEFAULT_MAX_CONCURRENCY, RetryPolicy, UploadScheduler};
use crate::s3::multipart::state::{ResumableState, UploadSession};
use crate::s3::object_content::{ContentStream, ObjectContent};
use crate::s3::utils::{check_bucket_name, check_object_name};
use futures_util::TryStreamExt;
use futures_util::future::ready;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Called after every completed part with the number of bytes stored so far.
pub type ProgressFn = Box<dyn FnMut(u64) + Send>;

/// Called with a fresh snapshot when the session starts and after every
/// completed part. Persist it to resume the upload later.
pub type CheckpointFn = Box<dyn FnMut(&ResumableState) + Send>;

/// Result of a finished multipart upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultipartUploadOutput {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub etag: String,
    pub size: u64,
    pub part_count: u16,
}

/// Argument builder for a multipart upload.
///
/// The source is split into parts of `part_size` bytes (chosen from the
/// object size when unset) that are uploaded concurrently. Any failure after
/// the session is created aborts it. Passing a [`ResumableState`] to
/// [`resume_from`](Self::resume_from) continues an earlier session instead:
/// the source is read again from the start and parts already stored are
/// skipped, so it must yield the same bytes as before.
pub struct MultipartUpload {
    api: Arc<dyn MultipartApi>,
    bucket: String,
    key: String,
    content: ObjectContent,
    part_size: Option<u64>,
    max_concurrency: usize,
    retry_policy: RetryPolicy,
    progress: Option<ProgressFn>,
    checkpoint: Option<CheckpointFn>,
    resume_from: Option<ResumableState>,
    extra_headers: Multimap,
}

impl MultipartUpload {
    pub fn new(
        api: Arc<dyn MultipartApi>,
        bucket: &str,
        key: &str,
        content: impl Into<ObjectContent>,
    ) -> Self {
        MultipartUpload {
            api,
            bucket: bucket.to_string(),
            key: key.to_string(),
            content: content.into(),
            part_size: None,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            retry_policy: RetryPolicy::default(),
            progress: None,
            checkpoint: None,
            resume_from: None,
            extra_headers: Multimap::new(),
        }
    }

    pub fn part_size(mut self, part_size: impl Into<Option<u64>>) -> Self {
        self.part_size = part_size.into();
        self
    }

    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn progress(mut self, progress: impl FnMut(u64) + Send + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn checkpoint(mut self, checkpoint: impl FnMut(&ResumableState) + Send + 'static) -> Self {
        self.checkpoint = Some(Box::new(checkpoint));
        self
    }

    pub fn resume_from(mut self, state: Option<ResumableState>) -> Self {
        self.resume_from = state;
        self
    }

    /// Headers sent with the request that creates the session, e.g.
    /// `Content-Type` or `x-amz-meta-*`. Ignored when resuming.
    pub fn extra_headers(mut self, extra_headers: Option<Multimap>) -> Self {
        self.extra_headers = extra_headers.unwrap_or_default();
        self
    }

    fn check_resume_state(
        &self,
        state: &ResumableState,
        object_size: Option<u64>,
    ) -> Result<(), MultipartError> {
        if state.bucket() != self.bucket || state.key() != self.key {
            return Err(MultipartError::StateMismatch(format!(
                "state is for {}/{}, upload is for {}/{}",
                state.bucket(),
                state.key(),
                self.bucket,
                self.key
            )));
        }
        if state.part_size() == 0 || state.part_size() > MAX_PART_SIZE {
            return Err(MultipartError::InvalidPartSize(state.part_size()));
        }
        if let Some(p) = self.part_size {
            if p != state.part_size() {
                return Err(MultipartError::StateMismatch(format!(
                    "part size {p} differs from the recorded {}",
                    state.part_size()
                )));
            }
        }
        if let (Some(recorded), Some(actual)) = (state.total_size(), object_size) {
            if recorded != actual {
                return Err(MultipartError::StateMismatch(format!(
                    "object size {actual} differs from the recorded {recorded}"
                )));
            }
        }
        // A part size under the minimum is only valid for a single-part object.
        if state.part_size() < MIN_PART_SIZE && object_size.is_none_or(|n| n > state.part_size()) {
            return Err(MultipartError::PartTooSmall {
                part_number: 1,
                size: state.part_size(),
            });
        }
        if let Some(size) = object_size {
            if part_count(size, state.part_size()) > MAX_MULTIPART_COUNT as u64 {
                return Err(MultipartError::TooManyParts(MAX_MULTIPART_COUNT));
            }
        }
        Ok(())
    }

    pub async fn send(mut self) -> Result<MultipartUploadOutput, Error> {
        check_bucket_name(&self.bucket, true)?;
        check_object_name(&self.key)?;

        let content = std::mem::take(&mut self.content);
        let stream = content.to_content_stream().await?;
        let object_size = stream.get_size().value();

        let session = match self.resume_from.take() {
            Some(state) => {
                self.check_resume_state(&state, object_size)?;
                log::info!(
                    "resuming upload {} of {}/{} with {} completed part(s)",
                    state.upload_id(),
                    self.bucket,
                    self.key,
                    state.completed_parts().len()
                );
                let mut session = UploadSession::from_state(&state);
                session.total_size = session.total_size.or(object_size);
                session
            }
            None => {
                let (part_size, expected_parts) = calc_part_info(object_size, self.part_size)?;
                let upload_id = self
                    .api
                    .create_multipart_upload(&self.bucket, &self.key, &self.extra_headers)
                    .await?;
                log::info!(
                    "created upload {upload_id} of {}/{} (part size {part_size}, parts {})",
                    self.bucket,
                    self.key,
                    expected_parts.map_or("unknown".to_string(), |n| n.to_string())
                );
                UploadSession::new(&self.bucket, &self.key, &upload_id, part_size, object_size)
            }
        };

        if let Some(checkpoint) = self.checkpoint.as_mut() {
            checkpoint(&session.to_state());
        }

        let upload_id = session.upload_id.clone();
        let result = self.upload_parts(session, stream).await;

        match result {
            Ok(output) => Ok(output),
            Err(err) => {
                Err(abort_upload(self.api.as_ref(), &self.bucket, &self.key, &upload_id, err).await)
            }
        }
    }

    async fn upload_parts(
        &mut self,
        mut session: UploadSession,
        stream: ContentStream,
    ) -> Result<MultipartUploadOutput, Error> {
        let skip: HashSet<u16> = session.completed_part_numbers();
        let consumed = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&consumed);

        let parts = PartPlanner::new(stream, session.part_size)?
            .into_stream()
            .inspect_ok(move |p| {
                counter.fetch_add(p.len(), Ordering::Relaxed);
            })
            .try_filter(move |p| ready(!skip.contains(&p.number)));

        let scheduler = UploadScheduler::new(
            Arc::clone(&self.api),
            &session.bucket,
            &session.key,
            &session.upload_id,
        )
        .max_concurrency(self.max_concurrency)
        .retry_policy(self.retry_policy.clone());

        let mut uploaded = session.bytes_uploaded();
        let progress = &mut self.progress;
        let checkpoint = &mut self.checkpoint;
        scheduler
            .run(parts, |part, len| {
                session.record(part)?;
                uploaded += len;
                if let Some(f) = progress.as_mut() {
                    f(uploaded);
                }
                if let Some(f) = checkpoint.as_mut() {
                    f(&session.to_state());
                }
                Ok(())
            })
            .await?;

        let parts = session.sorted_parts();
        let etag = self
            .api
            .complete_multipart_upload(&session.bucket, &session.key, &session.upload_id, &parts)
            .await?;

        log::info!(
            "completed upload {} of {}/{} with {} part(s)",
            session.upload_id,
            session.bucket,
            session.key,
            parts.len()
        );

        Ok(MultipartUploadOutput {
            bucket: session.bucket,
            key: session.key,
            upload_id: session.upload_id,
            etag,
            size: consumed.load(Ordering::Relaxed),
            part_count: parts.len() as u16,
        })
    }
}

/// Aborts the session after `err` and returns the error to report. When the
/// abort fails the session is reported as orphaned: part failures carry it
/// directly, any other error is wrapped in `AbortFailed`.
async fn abort_upload(
    api: &dyn MultipartApi,
    bucket: &str,
    key: &str,
    upload_id: &str,
    err: Error,
) -> Error {
    let Err(abort_err) = api.abort_multipart_upload(bucket, key, upload_id).await else {
        log::debug!("aborted upload {upload_id} after: {err}");
        return err;
    };

    log::warn!("failed to abort upload {upload_id} of {bucket}/{key}: {abort_err}");

    let orphaned = OrphanedUpload {
        bucket: bucket.to_string(),
        key: key.to_string(),
        upload_id: upload_id.to_string(),
        reason: abort_err.to_string(),
    };
    match err {
        Error::Multipart(MultipartError::PartFailed {
            part_number,
            attempts,
            source,
            ..
        }) => MultipartError::PartFailed {
            part_number,
            attempts,
            source,
            orphaned: Some(orphaned),
        },
        other => MultipartError::AbortFailed {
            source: Box::new(other),
            orphaned,
        },
    }
    .into()
}
