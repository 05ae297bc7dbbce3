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

//! # S3 transfer (`s3-transfer`)
//!
//! AWS Signature Version 4 request signing and concurrent, retrying,
//! resumable multipart uploads for Amazon S3 compatible object storage.
//!
//! Signing is available on its own through [`s3::signer::RequestSigner`],
//! which signs header based requests and produces presigned URLs. Uploads
//! are driven by [`s3::multipart::MultipartUpload`] against any
//! [`s3::multipart::MultipartApi`]; [`s3::S3Client`] is the HTTP backed one.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use s3_transfer::s3::S3Client;
//! use s3_transfer::s3::creds::StaticProvider;
//! use s3_transfer::s3::http::BaseUrl;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() {
//!     let base_url: BaseUrl = "http://localhost:9000".parse().unwrap();
//!     let provider = StaticProvider::new("minioadmin", "minioadmin", None);
//!     let client = S3Client::new(base_url, Some(provider)).unwrap();
//!
//!     let output = client
//!         .multipart_upload("my-bucket", "backups/disk.img", Path::new("/tmp/disk.img"))
//!         .max_concurrency(8)
//!         .progress(|bytes| println!("uploaded {bytes} bytes"))
//!         .send()
//!         .await
//!         .expect("upload failed");
//!
//!     println!("stored {} bytes as {}", output.size, output.etag);
//! }
//! ```
//!
//! ## Design
//! - [`s3::multipart::PartPlanner`] splits a source into fixed size parts
//! - [`s3::multipart::UploadScheduler`] uploads them with bounded concurrency and retries
//! - [`s3::multipart::ResumableState`] is the checkpoint that lets an interrupted upload continue

#![allow(clippy::result_large_err)]
#![allow(clippy::too_many_arguments)]

#[cfg(test)]
#[macro_use]
extern crate quickcheck;

pub mod s3;
