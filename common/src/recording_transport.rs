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

use async_trait::async_trait;
use bytes::Bytes;
use s3_transfer::s3::error::{Error, NetworkError};
use s3_transfer::s3::multimap_ext::{Multimap, MultimapExt};
use s3_transfer::s3::transport::{HttpRequest, HttpResponse, StreamingResponse, Transport};
use std::collections::VecDeque;
use std::sync::Mutex;

/// [`Transport`] that records requests and answers them with queued
/// responses, in order. Runs out with a transport error.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response with the given status, headers and body.
    pub fn respond(&self, status: u16, headers: &[(&str, &str)], body: &str) -> &Self {
        let mut map = Multimap::new();
        for (k, v) in headers {
            map.add(*k, *v);
        }
        self.responses.lock().unwrap().push_back(HttpResponse {
            status,
            headers: map,
            body: Bytes::from(body.to_string()),
        });
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_response(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| NetworkError::Transport("no response queued".into()).into())
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        self.next_response(request)
    }

    async fn execute_stream(&self, request: HttpRequest) -> Result<StreamingResponse, Error> {
        let resp = self.next_response(request)?;
        let body: Vec<Result<Bytes, Error>> = vec![Ok(resp.body)];
        Ok(StreamingResponse {
            status: resp.status,
            headers: resp.headers,
            body: Box::pin(futures_util::stream::iter(body)),
        })
    }
}
