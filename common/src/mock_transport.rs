// storageto - Rust client for the storage.to file sharing service
// Copyright 2025 The storageto Authors
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

//! In-memory presigned URL target with scripted failures.

use async_trait::async_trait;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use storageto::error::{Error, TransferError};
use storageto::upload::{ObjectTransport, PutObjectRequest, PutObjectResponse};

/// A request as seen by [`MockTransport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedPut {
    pub url: String,
    pub content_type: Option<String>,
    pub content_length: u64,
}

#[derive(Debug, Default)]
struct State {
    objects: HashMap<String, Vec<u8>>,
    requests: Vec<RecordedPut>,
    attempts: HashMap<String, u32>,
    remaining_failures: HashMap<String, u32>,
}

/// Stores uploaded bodies by URL and answers with an ETag derived from the
/// URL's last path segment.
#[derive(Debug, Default)]
pub struct MockTransport {
    state: Mutex<State>,
    always_fail: Vec<String>,
    omit_etag: bool,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `times` PUTs to `url` fail with HTTP 500.
    pub fn fail_times(self, url: &str, times: u32) -> Self {
        self.lock().remaining_failures.insert(url.to_string(), times);
        self
    }

    /// Every PUT to a URL ending with `suffix` fails with HTTP 500.
    pub fn always_fail_suffix(mut self, suffix: &str) -> Self {
        self.always_fail.push(suffix.to_string());
        self
    }

    pub fn omit_etag(mut self) -> Self {
        self.omit_etag = true;
        self
    }

    /// Holds every request for `delay` after its body was read.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn object(&self, url: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(url).cloned()
    }

    pub fn requests(&self) -> Vec<RecordedPut> {
        self.lock().requests.clone()
    }

    pub fn attempts(&self, url: &str) -> u32 {
        self.lock().attempts.get(url).copied().unwrap_or(0)
    }

    pub fn stored_count(&self) -> usize {
        self.lock().objects.len()
    }

    /// Highest number of requests that were in progress at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn should_fail(&self, url: &str) -> bool {
        if self.always_fail.iter().any(|s| url.ends_with(s.as_str())) {
            return true;
        }
        let mut state = self.lock();
        match state.remaining_failures.get_mut(url) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl ObjectTransport for MockTransport {
    async fn put_object(&self, request: PutObjectRequest) -> Result<PutObjectResponse, Error> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        {
            let mut state = self.lock();
            *state.attempts.entry(request.url.clone()).or_default() += 1;
            state.requests.push(RecordedPut {
                url: request.url.clone(),
                content_type: request.content_type.clone(),
                content_length: request.content_length,
            });
        }

        let mut body = Vec::new();
        let mut stream = request.body;
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk?);
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.should_fail(&request.url) {
            return Err(TransferError::Status {
                status: 500,
                body: "injected failure".to_string(),
            }
            .into());
        }

        let etag = request
            .url
            .rsplit('/')
            .next()
            .map(|segment| format!("etag-{segment}"));
        self.lock().objects.insert(request.url, body);

        Ok(PutObjectResponse {
            etag: if self.omit_etag { None } else { etag },
        })
    }
}
