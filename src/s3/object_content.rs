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

//! Byte sources for uploads

use crate::s3::segmented_bytes::SegmentedBytes;
use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::io::AsyncReadExt;

#[cfg(test)]
use quickcheck::Arbitrary;

type IoResult<T> = core::result::Result<T, std::io::Error>;

/// Chunk size used when streaming a file from disk.
const FILE_READ_CHUNK: usize = 64 * 1024;

// region: Size

#[derive(Debug, Clone, PartialEq, Eq, Copy, Default)]
pub enum Size {
    Known(u64),
    #[default]
    Unknown,
}

impl Size {
    /// Returns `true` if the size is known and `false` otherwise.
    pub fn is_known(&self) -> bool {
        matches!(self, Size::Known(_))
    }

    /// Returns `true` if the size is unknown and `false` otherwise.
    pub fn is_unknown(&self) -> bool {
        matches!(self, Size::Unknown)
    }

    /// Returns the size if known, otherwise returns `None`.
    pub fn value(&self) -> Option<u64> {
        match self {
            Size::Known(v) => Some(*v),
            Size::Unknown => None,
        }
    }
}

impl From<Option<u64>> for Size {
    fn from(value: Option<u64>) -> Self {
        match value {
            Some(v) => Size::Known(v),
            None => Size::Unknown,
        }
    }
}

impl From<u64> for Size {
    fn from(value: u64) -> Self {
        Size::Known(value)
    }
}

#[cfg(test)]
impl Arbitrary for Size {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        if bool::arbitrary(g) {
            Size::Known(u64::arbitrary(g))
        } else {
            Size::Unknown
        }
    }
}
// endregion: Size

/// Boxed stream of byte chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = IoResult<Bytes>> + Send>>;

/// Content of an object to upload.
///
/// Can be constructed from a stream of `Bytes`, a file path, or in-memory
/// bytes. A multipart upload that is resumed later must be given content
/// that yields the same bytes again.
pub struct ObjectContent(ObjectContentInner);

enum ObjectContentInner {
    Stream(ByteStream, Size),
    FilePath(PathBuf),
    Bytes(SegmentedBytes),
}

impl From<Bytes> for ObjectContent {
    fn from(value: Bytes) -> Self {
        ObjectContent(ObjectContentInner::Bytes(SegmentedBytes::from(value)))
    }
}

impl From<String> for ObjectContent {
    fn from(value: String) -> Self {
        ObjectContent(ObjectContentInner::Bytes(SegmentedBytes::from(value)))
    }
}

impl From<Vec<u8>> for ObjectContent {
    fn from(value: Vec<u8>) -> Self {
        ObjectContent(ObjectContentInner::Bytes(SegmentedBytes::from(
            Bytes::from(value),
        )))
    }
}

impl From<&'static [u8]> for ObjectContent {
    fn from(value: &'static [u8]) -> Self {
        ObjectContent(ObjectContentInner::Bytes(SegmentedBytes::from(
            Bytes::from_static(value),
        )))
    }
}

impl From<&'static str> for ObjectContent {
    fn from(value: &'static str) -> Self {
        ObjectContent(ObjectContentInner::Bytes(SegmentedBytes::from(value)))
    }
}

impl From<SegmentedBytes> for ObjectContent {
    fn from(value: SegmentedBytes) -> Self {
        ObjectContent(ObjectContentInner::Bytes(value))
    }
}

impl From<&Path> for ObjectContent {
    fn from(value: &Path) -> Self {
        ObjectContent(ObjectContentInner::FilePath(value.to_path_buf()))
    }
}

impl From<PathBuf> for ObjectContent {
    fn from(value: PathBuf) -> Self {
        ObjectContent(ObjectContentInner::FilePath(value))
    }
}

impl Default for ObjectContent {
    fn default() -> Self {
        ObjectContent(ObjectContentInner::Bytes(SegmentedBytes::new()))
    }
}

impl ObjectContent {
    /// Create a new `ObjectContent` from a stream of `Bytes`.
    pub fn new_from_stream(
        r: impl Stream<Item = IoResult<Bytes>> + Send + 'static,
        size: impl Into<Size>,
    ) -> Self {
        ObjectContent(ObjectContentInner::Stream(Box::pin(r), size.into()))
    }

    pub async fn to_stream(self) -> IoResult<(ByteStream, Size)> {
        match self.0 {
            ObjectContentInner::Stream(r, size) => Ok((r, size)),

            ObjectContentInner::FilePath(path) => {
                let mut file = tokio::fs::File::open(&path).await?;
                let size = file.metadata().await?.len();

                let stream = async_stream::try_stream! {
                    let mut buf = vec![0u8; FILE_READ_CHUNK];
                    loop {
                        let n = file.read(&mut buf).await?;
                        if n == 0 {
                            break;
                        }
                        yield Bytes::copy_from_slice(&buf[..n]);
                    }
                };

                Ok((Box::pin(stream), Size::Known(size)))
            }

            ObjectContentInner::Bytes(sb) => {
                let k = sb.len();
                let r = Box::pin(stream::iter(sb.into_iter().map(Ok)));
                Ok((r, Size::Known(k as u64)))
            }
        }
    }

    pub async fn to_content_stream(self) -> IoResult<ContentStream> {
        let (r, size) = self.to_stream().await?;
        Ok(ContentStream::new(r, size))
    }
}

/// Sequential reader over object content that hands out bounded slices.
pub struct ContentStream {
    r: ByteStream,
    extra: Option<Bytes>,
    size: Size,
}

impl Default for ContentStream {
    fn default() -> Self {
        ContentStream::empty()
    }
}

impl ContentStream {
    pub fn new(
        r: impl Stream<Item = IoResult<Bytes>> + Send + 'static,
        size: impl Into<Size>,
    ) -> Self {
        Self {
            r: Box::pin(r),
            extra: None,
            size: size.into(),
        }
    }

    pub fn empty() -> Self {
        Self {
            r: Box::pin(stream::iter(vec![])),
            extra: None,
            size: Size::Known(0),
        }
    }

    pub fn get_size(&self) -> Size {
        self.size
    }

    /// Read as many bytes as possible up to `n` and return a `SegmentedBytes`
    /// object. A result shorter than `n` means the stream is exhausted.
    pub async fn read_upto(&mut self, n: usize) -> IoResult<SegmentedBytes> {
        let mut segmented_bytes = SegmentedBytes::new();
        let mut remaining = n;
        if let Some(extra) = self.extra.take() {
            let len = extra.len();
            if len <= remaining {
                segmented_bytes.append(extra);
                remaining -= len;
            } else {
                segmented_bytes.append(extra.slice(0..remaining));
                self.extra = Some(extra.slice(remaining..));
                return Ok(segmented_bytes);
            }
        }
        while remaining > 0 {
            let Some(bytes) = self.r.next().await else {
                break;
            };
            let bytes = bytes?;
            let len = bytes.len();
            if len <= remaining {
                segmented_bytes.append(bytes);
                remaining -= len;
            } else {
                segmented_bytes.append(bytes.slice(0..remaining));
                self.extra = Some(bytes.slice(remaining..));
                break;
            }
        }
        Ok(segmented_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_read_upto_across_chunks() {
        let chunks = vec![
            Ok(Bytes::from_static(b"Hel")),
            Ok(Bytes::new()),
            Ok(Bytes::from_static(b"lo, Wor")),
            Ok(Bytes::from_static(b"ld!")),
        ];
        let mut cs = ContentStream::new(stream::iter(chunks), Size::Unknown);

        assert_eq!(cs.read_upto(5).await.unwrap().to_bytes(), "Hello");
        assert_eq!(cs.read_upto(5).await.unwrap().to_bytes(), ", Wor");
        assert_eq!(cs.read_upto(5).await.unwrap().to_bytes(), "ld!");
        assert!(cs.read_upto(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_upto_propagates_errors() {
        let chunks = vec![
            Ok(Bytes::from_static(b"abc")),
            Err(std::io::Error::other("disk gone")),
        ];
        let mut cs = ContentStream::new(stream::iter(chunks), Size::Unknown);
        assert!(cs.read_upto(10).await.is_err());
    }

    #[tokio::test]
    async fn test_file_content_reports_size() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("s3-transfer-content-{}", std::process::id()));
        {
            let mut f = std::fs::File::create(&path).unwrap();
            f.write_all(b"file body").unwrap();
        }

        let content = ObjectContent::from(path.as_path());
        let mut cs = content.to_content_stream().await.unwrap();
        assert_eq!(cs.get_size(), Size::Known(9));
        assert_eq!(cs.read_upto(100).await.unwrap().to_bytes(), "file body");

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let content = ObjectContent::from(Path::new("/nonexistent/s3-transfer/none"));
        assert!(content.to_content_stream().await.is_err());
    }
}
