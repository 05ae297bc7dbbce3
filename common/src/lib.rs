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

//! Test tooling shared by the integration tests.

pub mod mock_store;
pub mod rand_src;
pub mod recording_transport;

pub use mock_store::{Fault, MockStore};
pub use rand_src::{RandSrc, rand_bytes};
pub use recording_transport::RecordingTransport;

/// Five MiB, the smallest part size a store accepts.
pub const MIB_5: u64 = 5 * 1024 * 1024;
