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

use bytes::{Bytes, BytesMut};

/// An aggregated collection of `Bytes` objects. Part bodies are assembled
/// from stream chunks without copying them into one buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentedBytes {
    segments: Vec<Bytes>,
    total_size: usize,
}

impl SegmentedBytes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.total_size
    }

    pub fn is_empty(&self) -> bool {
        self.total_size == 0
    }

    pub fn append(&mut self, bytes: Bytes) {
        if bytes.is_empty() {
            return;
        }
        self.total_size += bytes.len();
        self.segments.push(bytes);
    }

    /// Iterates the segments. Cloning a `Bytes` does not copy its contents.
    pub fn iter(&self) -> impl Iterator<Item = Bytes> + '_ {
        self.segments.iter().cloned()
    }

    /// Copy all the content into a single [Bytes] object.
    pub fn to_bytes(&self) -> Bytes {
        if self.segments.len() == 1 {
            return self.segments[0].clone();
        }
        let mut buf = BytesMut::with_capacity(self.total_size);
        for bytes in &self.segments {
            buf.extend_from_slice(bytes);
        }
        buf.freeze()
    }
}

impl IntoIterator for SegmentedBytes {
    type Item = Bytes;
    type IntoIter = std::vec::IntoIter<Bytes>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.into_iter()
    }
}

impl From<Bytes> for SegmentedBytes {
    fn from(bytes: Bytes) -> Self {
        let mut sb = SegmentedBytes::new();
        sb.append(bytes);
        sb
    }
}

impl From<String> for SegmentedBytes {
    fn from(s: String) -> Self {
        Bytes::from(s).into()
    }
}

impl From<&'static str> for SegmentedBytes {
    fn from(s: &'static str) -> Self {
        Bytes::from_static(s.as_bytes()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_skips_empty_segments() {
        let mut sb = SegmentedBytes::new();
        sb.append(Bytes::from_static(b"abc"));
        sb.append(Bytes::new());
        sb.append(Bytes::from_static(b"de"));
        assert_eq!(sb.len(), 5);
        assert_eq!(sb.iter().count(), 2);
        assert_eq!(sb.to_bytes(), Bytes::from_static(b"abcde"));
    }
}
