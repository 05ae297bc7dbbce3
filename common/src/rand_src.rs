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


use bytes::Bytes;
use futures_util::Stream;
use rand::prelude::SmallRng;
use rand::{RngCore, SeedableRng};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Deterministic stream of pseudo random bytes. Two sources with the same
/// seed and size yield the same content, so a resumed upload can be fed the
/// same object again.
pub struct RandSrc {
    size: u64,
    chunk_size: usize,
    rng: SmallRng,
}

impl RandSrc {
    pub fn new(size: u64, seed: u64) -> RandSrc {
        RandSrc {
            size,
            chunk_size: 8 * 1024,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Yield chunks of at most `chunk_size` bytes. Default: 8 KiB
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl Stream for RandSrc {
    type Item = Result<Bytes, io::Error>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.size == 0 {
            return Poll::Ready(None);
        }
        let bytes_read = this.size.min(this.chunk_size as u64) as usize;

        let mut buf = vec![0; bytes_read];
        this.rng.fill_bytes(&mut buf);
        this.size -= bytes_read as u64;
        Poll::Ready(Some(Ok(Bytes::from(buf))))
    }
}

/// The whole content a [`RandSrc`] with the same size and seed yields at the
/// default chunk size.
pub fn rand_bytes(size: u64, seed: u64) -> Bytes {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut out = Vec::with_capacity(size as usize);
    let mut remaining = size;
    while remaining > 0 {
        let n = remaining.min(8 * 1024) as usize;
        let mut buf = vec![0; n];
        rng.fill_bytes(&mut buf);
        out.extend_from_slice(&buf);
        remaining -= n as u64;
    }
    Bytes::from(out)
}
