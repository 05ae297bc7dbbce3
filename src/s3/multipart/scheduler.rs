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

//! Bounded-concurrency part dispatch with retries

use crate::s3::error::{Error, MultipartError, NetworkError};
use crate::s3::multipart::MultipartApi;
use crate::s3::multipart::planner::Part;
use crate::s3::multipart::state::CompletedPart;
use futures_util::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// Default number of parts uploaded at the same time
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// How failed part uploads are retried.
///
/// Attempt `n` (counting from 1) that fails with a retryable error is
/// followed by a pause of `base_delay * 2^(n-1)`, capped at `max_delay` and
/// never shorter than a server supplied `Retry-After`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per part, the first one included. Default: 3
    pub max_attempts: u32,
    /// Default: 200 milliseconds
    pub base_delay: Duration,
    /// Default: 10 seconds
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// A policy that gives up after the first failure.
    pub fn no_retry() -> Self {
        Self::default().max_attempts(1)
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Pause after failed attempt number `attempt`.
    pub fn backoff(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        let delay = self
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        match retry_after {
            Some(ra) => delay.max(ra),
            None => delay,
        }
    }
}

/// Outcome of one part, as reported by its worker task.
struct PartResult {
    part_number: u16,
    len: u64,
    attempts: u32,
    result: Result<String, Error>,
}

/// Dispatches parts to a [`MultipartApi`] through a bounded pool of tasks.
///
/// Parts are pulled from the input only when a worker slot is free, so at
/// most `max_concurrency` part bodies are held in memory.
#[derive(Clone)]
pub struct UploadScheduler {
    api: Arc<dyn MultipartApi>,
    bucket: String,
    key: String,
    upload_id: String,
    max_concurrency: usize,
    retry_policy: RetryPolicy,
}

impl UploadScheduler {
    pub fn new(api: Arc<dyn MultipartApi>, bucket: &str, key: &str, upload_id: &str) -> Self {
        UploadScheduler {
            api,
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Sets the number of parts in flight. Zero is treated as one.
    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    fn spawn_part(&self, workers: &mut JoinSet<PartResult>, part: Part) {
        let api = Arc::clone(&self.api);
        let bucket = self.bucket.clone();
        let key = self.key.clone();
        let upload_id = self.upload_id.clone();
        let policy = self.retry_policy.clone();

        log::debug!(
            "admitting part {} ({} bytes) of upload {}",
            part.number,
            part.len(),
            upload_id
        );

        workers.spawn(async move {
            upload_with_retry(api.as_ref(), &bucket, &key, &upload_id, part, &policy).await
        });
    }

    /// Uploads every part of `parts`.
    ///
    /// `on_complete` is called on the calling task for each part the store
    /// accepts, with the part and its length, in completion order. After the
    /// first failure, from a worker or from `parts` itself, no further parts
    /// are admitted; in-flight parts are awaited and still reported before
    /// the error is returned.
    pub async fn run<S, F>(&self, parts: S, mut on_complete: F) -> Result<(), Error>
    where
        S: Stream<Item = Result<Part, Error>> + Send + Unpin,
        F: FnMut(CompletedPart, u64) -> Result<(), Error>,
    {
        let mut parts = parts;
        let mut workers: JoinSet<PartResult> = JoinSet::new();
        let mut failure: Option<Error> = None;
        let mut exhausted = false;

        loop {
            while failure.is_none() && !exhausted && workers.len() < self.max_concurrency {
                match parts.next().await {
                    Some(Ok(part)) => self.spawn_part(&mut workers, part),
                    Some(Err(e)) => failure = Some(e),
                    None => exhausted = true,
                }
            }

            let Some(joined) = workers.join_next().await else {
                break;
            };

            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => {
                    if failure.is_none() {
                        failure = Some(
                            NetworkError::Transport(format!("part upload task cancelled: {e}"))
                                .into(),
                        );
                    }
                    continue;
                }
            };

            match outcome.result {
                Ok(etag) => {
                    let part = CompletedPart::new(outcome.part_number, etag);
                    if let Err(e) = on_complete(part, outcome.len) {
                        if failure.is_none() {
                            failure = Some(e);
                        }
                    }
                }
                Err(e) => {
                    if failure.is_none() {
                        log::warn!(
                            "part {} of upload {} failed after {} attempt(s); draining {} in-flight part(s)",
                            outcome.part_number,
                            self.upload_id,
                            outcome.attempts,
                            workers.len()
                        );
                        failure = Some(
                            MultipartError::PartFailed {
                                part_number: outcome.part_number,
                                attempts: outcome.attempts,
                                source: Box::new(e),
                                orphaned: None,
                            }
                            .into(),
                        );
                    } else {
                        log::debug!(
                            "part {} of upload {} also failed: {e}",
                            outcome.part_number,
                            self.upload_id
                        );
                    }
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn upload_with_retry(
    api: &dyn MultipartApi,
    bucket: &str,
    key: &str,
    upload_id: &str,
    part: Part,
    policy: &RetryPolicy,
) -> PartResult {
    let max_attempts = policy.max_attempts.max(1);
    let len = part.len();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let result = api
            .upload_part(bucket, key, upload_id, part.number, part.data.clone())
            .await;

        match result {
            Ok(etag) => {
                return PartResult {
                    part_number: part.number,
                    len,
                    attempts: attempt,
                    result: Ok(etag),
                };
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = policy.backoff(attempt, e.retry_after());
                log::debug!(
                    "retrying part {} in {:?} after attempt {attempt} failed: {e}",
                    part.number,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return PartResult {
                    part_number: part.number,
                    len,
                    attempts: attempt,
                    result: Err(e),
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(200));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1, None), Duration::from_millis(200));
        assert_eq!(policy.backoff(2, None), Duration::from_millis(400));
        assert_eq!(policy.backoff(3, None), Duration::from_millis(800));
        assert_eq!(policy.backoff(7, None), Duration::from_secs(10));
        assert_eq!(policy.backoff(40, None), Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_honors_retry_after() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.backoff(1, Some(Duration::from_secs(3))),
            Duration::from_secs(3)
        );
        assert_eq!(
            policy.backoff(2, Some(Duration::from_millis(10))),
            Duration::from_millis(400)
        );
        // retry-after wins over the cap
        assert_eq!(
            policy.backoff(9, Some(Duration::from_secs(30))),
            Duration::from_secs(30)
        );
    }
}
