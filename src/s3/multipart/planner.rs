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

//! Splitting a byte source into upload parts

use crate::s3::error::{Error, MultipartError};
use crate::s3::object_content::{ContentStream, Size};
use crate::s3::segmented_bytes::SegmentedBytes;
use futures_util::Stream;
use std::pin::Pin;

pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024; // 5 MiB
pub const MAX_PART_SIZE: u64 = 1024 * MIN_PART_SIZE; // 5 GiB
pub const MAX_OBJECT_SIZE: u64 = 1024 * MAX_PART_SIZE; // 5 TiB
pub const MAX_MULTIPART_COUNT: u16 = 10_000;

/// Returns the size of each part to upload and the total number of parts. The
/// number of parts is `None` when the object size is unknown.
pub fn calc_part_info(
    object_size: Option<u64>,
    part_size: Option<u64>,
) -> Result<(u64, Option<u16>), MultipartError> {
    if let Some(v) = part_size {
        if !(MIN_PART_SIZE..=MAX_PART_SIZE).contains(&v) {
            return Err(MultipartError::InvalidPartSize(v));
        }
    }

    if let Some(v) = object_size {
        if v > MAX_OBJECT_SIZE {
            return Err(MultipartError::InvalidObjectSize(v));
        }
    }

    match (object_size, part_size) {
        (None, None) => Err(MultipartError::MissingPartSize),
        (None, Some(part_size)) => Ok((part_size, None)),
        (Some(object_size), None) => {
            // Smallest multiple of MIN_PART_SIZE keeping the count within limits.
            let min_psize = object_size.div_ceil(MAX_MULTIPART_COUNT as u64);
            let mut psize = min_psize.div_ceil(MIN_PART_SIZE).max(1) * MIN_PART_SIZE;

            if object_size > 0 && psize > object_size {
                psize = object_size;
            }

            let part_count = object_size.div_ceil(psize).max(1) as u16;
            Ok((psize, Some(part_count)))
        }
        (Some(object_size), Some(part_size)) => {
            let part_count = object_size.div_ceil(part_size).max(1);
            if part_count > MAX_MULTIPART_COUNT as u64 {
                return Err(MultipartError::TooManyParts(MAX_MULTIPART_COUNT));
            }

            Ok((part_size, Some(part_count as u16)))
        }
    }
}

/// Number of parts an object of `object_size` bytes splits into. An empty
/// object still has one (empty) part.
pub fn part_count(object_size: u64, part_size: u64) -> u64 {
    object_size.div_ceil(part_size.max(1)).max(1)
}

/// One numbered slice of the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub number: u16,
    pub data: SegmentedBytes,
}

impl Part {
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

pub type PartStream = Pin<Box<dyn Stream<Item = Result<Part, Error>> + Send>>;

/// Splits a sequential byte stream into parts of `part_size` bytes, numbered
/// from 1 in source order. The last part may be shorter; an empty source
/// yields exactly one empty part.
///
/// When the source declares its size, producing a different number of bytes
/// is an error.
pub struct PartPlanner {
    stream: ContentStream,
    part_size: u64,
    declared_size: Size,
    next_part_number: u32,
    consumed: u64,
    done: bool,
}

impl PartPlanner {
    pub fn new(stream: ContentStream, part_size: u64) -> Result<Self, MultipartError> {
        if part_size == 0 || part_size > MAX_PART_SIZE {
            return Err(MultipartError::InvalidPartSize(part_size));
        }
        let declared_size = stream.get_size();
        Ok(PartPlanner {
            stream,
            part_size,
            declared_size,
            next_part_number: 1,
            consumed: 0,
            done: false,
        })
    }

    fn check_size(&self, finished: bool) -> Result<(), MultipartError> {
        if let Size::Known(expected) = self.declared_size {
            if self.consumed > expected || (finished && self.consumed != expected) {
                return Err(MultipartError::SizeMismatch {
                    expected,
                    actual: self.consumed,
                });
            }
        }
        Ok(())
    }

    /// Returns the next part, or `None` once the source is exhausted.
    pub async fn next_part(&mut self) -> Result<Option<Part>, Error> {
        if self.done {
            return Ok(None);
        }

        let data = self.stream.read_upto(self.part_size as usize).await?;
        let len = data.len() as u64;

        if len == 0 && self.next_part_number > 1 {
            self.done = true;
            self.check_size(true)?;
            return Ok(None);
        }

        if self.next_part_number > MAX_MULTIPART_COUNT as u32 {
            self.done = true;
            return Err(MultipartError::TooManyParts(MAX_MULTIPART_COUNT).into());
        }

        let number = self.next_part_number as u16;
        self.next_part_number += 1;
        self.consumed += len;

        if len < self.part_size {
            self.done = true;
            self.check_size(true)?;
        } else {
            self.check_size(false)?;
        }

        Ok(Some(Part { number, data }))
    }

    /// Turns the planner into a stream of parts. The stream ends after the
    /// first error.
    pub fn into_stream(mut self) -> PartStream {
        Box::pin(async_stream::stream! {
            loop {
                match self.next_part().await {
                    Ok(Some(part)) => yield Ok(part),
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        })
    }
}
