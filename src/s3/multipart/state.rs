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

//! Multipart session bookkeeping and its persistable snapshot

use crate::s3::error::{Error, MultipartError, StateError};
use crate::s3::multipart::planner::{MAX_MULTIPART_COUNT, part_count};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Version written by [`ResumableState::encode`].
pub const STATE_VERSION: u32 = 1;

/// A part accepted by the object store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPart {
    pub part_number: u16,
    #[serde(rename = "eTag")]
    pub etag: String,
}

impl CompletedPart {
    pub fn new(part_number: u16, etag: impl Into<String>) -> Self {
        CompletedPart {
            part_number,
            etag: etag.into(),
        }
    }
}

fn check_part_number(part_number: u16) -> Result<(), MultipartError> {
    if part_number == 0 || part_number > MAX_MULTIPART_COUNT {
        return Err(MultipartError::InvalidPartNumber(part_number as u32));
    }
    Ok(())
}

/// Bytes held by the given parts. Every part but the last of the object is
/// `part_size` long; the last one is whatever `total_size` leaves over.
fn bytes_in_parts<'a>(
    parts: impl Iterator<Item = &'a CompletedPart>,
    part_size: u64,
    total_size: Option<u64>,
) -> u64 {
    match total_size {
        Some(total) => {
            let last = part_count(total, part_size);
            parts
                .map(|p| {
                    let n = p.part_number as u64;
                    if n == last {
                        total.saturating_sub((last - 1) * part_size)
                    } else {
                        part_size
                    }
                })
                .sum()
        }
        None => parts.count() as u64 * part_size,
    }
}

/// Immutable, serializable snapshot of a multipart session.
///
/// ```
/// use s3_transfer::s3::multipart::{CompletedPart, ResumableState};
///
/// let state = ResumableState::new("bucket", "key", "upload-1", 5 * 1024 * 1024, None)
///     .with_completed_part(CompletedPart::new(1, "etag-1"))
///     .unwrap();
/// let restored = ResumableState::decode(&state.encode().unwrap()).unwrap();
/// assert_eq!(state, restored);
/// assert_eq!(restored.next_part_number(), 2);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumableState {
    version: u32,
    bucket: String,
    key: String,
    upload_id: String,
    part_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    total_size: Option<u64>,
    completed_parts: Vec<CompletedPart>,
}

impl ResumableState {
    pub fn new(
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_size: u64,
        total_size: Option<u64>,
    ) -> Self {
        ResumableState {
            version: STATE_VERSION,
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            part_size,
            total_size,
            completed_parts: Vec::new(),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    pub fn total_size(&self) -> Option<u64> {
        self.total_size
    }

    /// Completed parts in the order they finished
    pub fn completed_parts(&self) -> &[CompletedPart] {
        &self.completed_parts
    }

    pub fn contains(&self, part_number: u16) -> bool {
        self.completed_parts
            .iter()
            .any(|p| p.part_number == part_number)
    }

    /// Returns a new snapshot with `part` added.
    pub fn with_completed_part(&self, part: CompletedPart) -> Result<Self, MultipartError> {
        check_part_number(part.part_number)?;
        if self.contains(part.part_number) {
            return Err(MultipartError::DuplicatePart(part.part_number));
        }
        let mut next = self.clone();
        next.completed_parts.push(part);
        Ok(next)
    }

    /// Bytes already stored remotely. Without a total size every part counts
    /// as `part_size`.
    pub fn bytes_uploaded(&self) -> u64 {
        bytes_in_parts(self.completed_parts.iter(), self.part_size, self.total_size)
    }

    /// One past the highest completed part number, or 1 when nothing is done.
    pub fn next_part_number(&self) -> u32 {
        self.completed_parts
            .iter()
            .map(|p| p.part_number as u32 + 1)
            .max()
            .unwrap_or(1)
    }

    pub fn encode(&self) -> Result<Vec<u8>, StateError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses a snapshot produced by [`encode`](Self::encode). Unknown fields
    /// are ignored.
    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        let state: ResumableState = serde_json::from_slice(data).map_err(StateError::from)?;
        if state.version == 0 || state.version > STATE_VERSION {
            return Err(StateError::UnsupportedVersion(state.version).into());
        }
        let mut seen = HashSet::with_capacity(state.completed_parts.len());
        for part in &state.completed_parts {
            check_part_number(part.part_number)?;
            if !seen.insert(part.part_number) {
                return Err(MultipartError::DuplicatePart(part.part_number).into());
            }
        }
        Ok(state)
    }
}

/// Mutable session owned by the coordinator of an upload. Workers never
/// touch it; they hand their results back to the coordinator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadSession {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub part_size: u64,
    pub total_size: Option<u64>,
    completed_parts: Vec<CompletedPart>,
    part_numbers: HashSet<u16>,
}

impl UploadSession {
    pub fn new(
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_size: u64,
        total_size: Option<u64>,
    ) -> Self {
        UploadSession {
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            part_size,
            total_size,
            completed_parts: Vec::new(),
            part_numbers: HashSet::new(),
        }
    }

    pub fn from_state(state: &ResumableState) -> Self {
        UploadSession {
            bucket: state.bucket.clone(),
            key: state.key.clone(),
            upload_id: state.upload_id.clone(),
            part_size: state.part_size,
            total_size: state.total_size,
            part_numbers: state.completed_parts.iter().map(|p| p.part_number).collect(),
            completed_parts: state.completed_parts.clone(),
        }
    }

    pub fn contains(&self, part_number: u16) -> bool {
        self.part_numbers.contains(&part_number)
    }

    pub fn completed_part_numbers(&self) -> HashSet<u16> {
        self.part_numbers.clone()
    }

    pub fn record(&mut self, part: CompletedPart) -> Result<(), MultipartError> {
        check_part_number(part.part_number)?;
        if !self.part_numbers.insert(part.part_number) {
            return Err(MultipartError::DuplicatePart(part.part_number));
        }
        self.completed_parts.push(part);
        Ok(())
    }

    pub fn bytes_uploaded(&self) -> u64 {
        bytes_in_parts(self.completed_parts.iter(), self.part_size, self.total_size)
    }

    /// Completed parts sorted ascending by part number
    pub fn sorted_parts(&self) -> Vec<CompletedPart> {
        let mut parts = self.completed_parts.clone();
        parts.sort_by_key(|p| p.part_number);
        parts
    }

    pub fn to_state(&self) -> ResumableState {
        ResumableState {
            version: STATE_VERSION,
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            upload_id: self.upload_id.clone(),
            part_size: self.part_size,
            total_size: self.total_size,
            completed_parts: self.completed_parts.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn state_with(parts: &[u16]) -> ResumableState {
        let mut state = ResumableState::new("bucket", "key", "uid", 5 * MIB, Some(12 * MIB));
        for &n in parts {
            state = state
                .with_completed_part(CompletedPart::new(n, format!("etag-{n}")))
                .unwrap();
        }
        state
    }

    #[test]
    fn test_round_trip_preserves_part_order() {
        let state = state_with(&[3, 1, 2]);
        let decoded = ResumableState::decode(&state.encode().unwrap()).unwrap();
        assert_eq!(decoded, state);
        let numbers: Vec<u16> = decoded
            .completed_parts()
            .iter()
            .map(|p| p.part_number)
            .collect();
        assert_eq!(numbers, vec![3, 1, 2]);
    }

    #[test]
    fn test_json_layout() {
        let json: serde_json::Value =
            serde_json::from_slice(&state_with(&[1]).encode().unwrap()).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["uploadId"], "uid");
        assert_eq!(json["partSize"], 5 * MIB);
        assert_eq!(json["totalSize"], 12 * MIB);
        assert_eq!(json["completedParts"][0]["partNumber"], 1);
        assert_eq!(json["completedParts"][0]["eTag"], "etag-1");

        let no_total = ResumableState::new("b", "k", "u", 5, None);
        let json: serde_json::Value = serde_json::from_slice(&no_total.encode().unwrap()).unwrap();
        assert!(json.get("totalSize").is_none());
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let data = br#"{"version":1,"bucket":"b","key":"k","uploadId":"u","partSize":5,
            "completedParts":[{"partNumber":2,"eTag":"x","checksum":"abc"}],"owner":"me"}"#;
        let state = ResumableState::decode(data).unwrap();
        assert_eq!(state.total_size(), None);
        assert_eq!(state.completed_parts(), &[CompletedPart::new(2, "x")]);
    }

    #[test]
    fn test_decode_rejects_versions_and_bad_parts() {
        let v2 = br#"{"version":2,"bucket":"b","key":"k","uploadId":"u","partSize":5,"completedParts":[]}"#;
        assert!(matches!(
            ResumableState::decode(v2),
            Err(Error::State(StateError::UnsupportedVersion(2)))
        ));

        let v0 = br#"{"version":0,"bucket":"b","key":"k","uploadId":"u","partSize":5,"completedParts":[]}"#;
        assert!(matches!(
            ResumableState::decode(v0),
            Err(Error::State(StateError::UnsupportedVersion(0)))
        ));

        let missing = br#"{"bucket":"b","key":"k","uploadId":"u","partSize":5,"completedParts":[]}"#;
        assert!(matches!(
            ResumableState::decode(missing),
            Err(Error::State(StateError::Json(_)))
        ));

        let dup = br#"{"version":1,"bucket":"b","key":"k","uploadId":"u","partSize":5,
            "completedParts":[{"partNumber":1,"eTag":"a"},{"partNumber":1,"eTag":"b"}]}"#;
        assert!(matches!(
            ResumableState::decode(dup),
            Err(Error::Multipart(MultipartError::DuplicatePart(1)))
        ));
    }

    #[test]
    fn test_with_completed_part_validation() {
        let state = state_with(&[1]);
        assert!(matches!(
            state.with_completed_part(CompletedPart::new(1, "again")),
            Err(MultipartError::DuplicatePart(1))
        ));
        assert!(matches!(
            state.with_completed_part(CompletedPart::new(0, "zero")),
            Err(MultipartError::InvalidPartNumber(0))
        ));
        assert!(matches!(
            state.with_completed_part(CompletedPart::new(10_001, "big")),
            Err(MultipartError::InvalidPartNumber(10_001))
        ));
        // the original snapshot is untouched
        assert_eq!(state.completed_parts().len(), 1);
    }

    #[test]
    fn test_next_part_number() {
        assert_eq!(state_with(&[]).next_part_number(), 1);
        assert_eq!(state_with(&[2, 1]).next_part_number(), 3);
        assert_eq!(state_with(&[3]).next_part_number(), 4);
    }

    #[test]
    fn test_bytes_uploaded_counts_short_last_part() {
        // 12 MiB in 5 MiB parts: 5 + 5 + 2
        assert_eq!(state_with(&[]).bytes_uploaded(), 0);
        assert_eq!(state_with(&[1]).bytes_uploaded(), 5 * MIB);
        assert_eq!(state_with(&[3]).bytes_uploaded(), 2 * MIB);
        assert_eq!(state_with(&[1, 2, 3]).bytes_uploaded(), 12 * MIB);

        let unknown = ResumableState::new("b", "k", "u", 5 * MIB, None)
            .with_completed_part(CompletedPart::new(1, "a"))
            .unwrap();
        assert_eq!(unknown.bytes_uploaded(), 5 * MIB);
    }

    #[test]
    fn test_session_records_and_snapshots() {
        let mut session = UploadSession::from_state(&state_with(&[2]));
        session.record(CompletedPart::new(3, "c")).unwrap();
        session.record(CompletedPart::new(1, "a")).unwrap();
        assert!(matches!(
            session.record(CompletedPart::new(3, "c")),
            Err(MultipartError::DuplicatePart(3))
        ));

        let sorted: Vec<u16> = session.sorted_parts().iter().map(|p| p.part_number).collect();
        assert_eq!(sorted, vec![1, 2, 3]);
        assert_eq!(session.bytes_uploaded(), 12 * MIB);
        assert_eq!(session.to_state().completed_parts().len(), 3);
        assert!(session.contains(2));
    }
}
