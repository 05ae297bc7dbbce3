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

use s3_transfer::s3::error::{Error, MultipartError, NetworkError, ServiceError};
use s3_transfer::s3::multipart::{MultipartUpload, RetryPolicy};
use s3_transfer::s3::object_content::{ObjectContent, Size};
use s3_transfer_common::{Fault, MIB_5, MockStore, RandSrc, rand_bytes};
use std::sync::Arc;
use std::time::Duration;

const BUCKET: &str = "retry-bucket";
const KEY: &str = "object";

fn fast_retries() -> RetryPolicy {
    RetryPolicy::default()
        .base_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(4))
}

fn calls_for(store: &MockStore, part_number: u16) -> usize {
    store
        .upload_part_calls()
        .into_iter()
        .filter(|n| *n == part_number)
        .count()
}

#[tokio::test]
async fn retryable_failure_then_success() {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = Arc::new(MockStore::new());
    store.fail_part(2, 2, Fault::Retryable);
    let data = rand_bytes(2 * MIB_5 + 9, 21);

    let output = MultipartUpload::new(store.clone(), BUCKET, KEY, data.clone())
        .retry_policy(fast_retries())
        .send()
        .await
        .unwrap();

    assert_eq!(output.part_count, 3);
    assert_eq!(calls_for(&store, 2), 3);
    assert_eq!(calls_for(&store, 1), 1);
    assert_eq!(store.object(BUCKET, KEY).unwrap(), data);
    assert!(store.abort_calls().is_empty());
}

#[tokio::test]
async fn rate_limited_part_is_retried() {
    let store = Arc::new(MockStore::new());
    store.fail_part(1, 1, Fault::RateLimited(Duration::from_millis(10)));

    MultipartUpload::new(store.clone(), BUCKET, KEY, rand_bytes(MIB_5 + 1, 4))
        .retry_policy(fast_retries())
        .send()
        .await
        .unwrap();

    assert_eq!(calls_for(&store, 1), 2);
}

#[tokio::test]
async fn exhausted_retries_stop_admission_and_abort() {
    let store = Arc::new(MockStore::new());
    store.fail_part(2, 10, Fault::Retryable);

    let err = MultipartUpload::new(store.clone(), BUCKET, KEY, rand_bytes(3 * MIB_5 + 1, 8))
        .max_concurrency(1)
        .retry_policy(fast_retries())
        .send()
        .await
        .unwrap_err();

    match &err {
        Error::Multipart(MultipartError::PartFailed {
            part_number,
            attempts,
            source,
            orphaned,
        }) => {
            assert_eq!(*part_number, 2);
            assert_eq!(*attempts, 3);
            assert!(matches!(
                source.as_ref(),
                Error::Network(NetworkError::Transport(_))
            ));
            assert!(orphaned.is_none());
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(store.upload_part_calls(), vec![1, 2, 2, 2]);
    assert_eq!(store.abort_calls(), vec!["upload-1".to_string()]);
    assert!(!store.is_pending("upload-1"));
    assert!(store.complete_calls().is_empty());
}

#[tokio::test]
async fn fatal_error_is_not_retried() {
    let store = Arc::new(MockStore::new());
    store.fail_part(1, 1, Fault::Fatal);

    let err = MultipartUpload::new(store.clone(), BUCKET, KEY, rand_bytes(MIB_5 + 1, 8))
        .max_concurrency(1)
        .retry_policy(fast_retries())
        .send()
        .await
        .unwrap_err();

    match &err {
        Error::Multipart(MultipartError::PartFailed {
            part_number: 1,
            attempts: 1,
            source,
            ..
        }) => assert!(matches!(
            source.as_ref(),
            Error::Service(ServiceError::AccessDenied(_))
        )),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!err.is_retryable());
    assert_eq!(store.upload_part_calls(), vec![1]);
    assert_eq!(store.abort_calls().len(), 1);
}

#[tokio::test]
async fn failed_abort_reports_orphaned_upload() {
    let store = Arc::new(MockStore::new());
    store.fail_part(2, 1, Fault::Fatal);
    store.fail_abort();

    let err = MultipartUpload::new(store.clone(), BUCKET, KEY, rand_bytes(2 * MIB_5, 8))
        .max_concurrency(1)
        .send()
        .await
        .unwrap_err();

    let orphaned = err.orphaned_upload().expect("orphaned upload");
    assert_eq!(orphaned.bucket, BUCKET);
    assert_eq!(orphaned.key, KEY);
    assert_eq!(orphaned.upload_id, "upload-1");
    assert!(orphaned.reason.contains("connection refused"));

    assert!(store.is_pending("upload-1"));
    assert_eq!(store.stored_parts("upload-1"), vec![1]);
}

#[tokio::test]
async fn failed_complete_and_abort_reports_orphaned_upload() {
    let store = Arc::new(MockStore::new());
    store.fail_complete();
    store.fail_abort();

    let err = MultipartUpload::new(store.clone(), BUCKET, KEY, "small object")
        .send()
        .await
        .unwrap_err();

    let Error::Multipart(MultipartError::AbortFailed { source, orphaned }) = &err else {
        panic!("unexpected error: {err}");
    };
    assert!(matches!(**source, Error::Service(ServiceError::Unknown { status: 500, .. })));
    assert_eq!(orphaned.upload_id, "upload-1");
    assert_eq!(err.orphaned_upload(), Some(orphaned));
    assert_eq!(store.abort_calls(), vec!["upload-1".to_string()]);
    assert!(store.is_pending("upload-1"));
}

#[tokio::test]
async fn short_stream_with_failed_abort_reports_orphaned_upload() {
    let store = Arc::new(MockStore::new());
    store.fail_abort();
    let content = ObjectContent::new_from_stream(RandSrc::new(10, 3), Size::Known(MIB_5));

    let err = MultipartUpload::new(store.clone(), BUCKET, KEY, content)
        .send()
        .await
        .unwrap_err();

    let Error::Multipart(MultipartError::AbortFailed { source, .. }) = &err else {
        panic!("unexpected error: {err}");
    };
    assert!(matches!(
        **source,
        Error::Multipart(MultipartError::SizeMismatch { expected, actual: 10 }) if expected == MIB_5
    ));
    assert_eq!(err.orphaned_upload().map(|o| o.upload_id.as_str()), Some("upload-1"));
    assert!(store.is_pending("upload-1"));
}

#[tokio::test]
async fn no_retry_policy_gives_up_at_once() {
    let store = Arc::new(MockStore::new());
    store.fail_part(1, 1, Fault::Retryable);

    let err = MultipartUpload::new(store.clone(), BUCKET, KEY, "abc")
        .retry_policy(RetryPolicy::no_retry())
        .send()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Multipart(MultipartError::PartFailed { attempts: 1, .. })
    ));
    assert_eq!(store.upload_part_calls(), vec![1]);
}
