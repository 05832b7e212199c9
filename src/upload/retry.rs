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

//! Retry with fixed delay and cooperative cancellation

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::Error;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Fixed pause between a failed attempt and the next one.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

/// Runs `operation` until it succeeds or `policy.max_attempts` attempts fail.
///
/// Cancellation is checked before every attempt and during every delay; an
/// attempt already in flight is not interrupted here. When all attempts fail
/// the error of the last one is returned unchanged.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        attempt += 1;
        if attempt > 1 {
            log::debug!("Retry {}/{}", attempt - 1, max_attempts - 1);
        }

        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => e,
        };
        if attempt >= max_attempts {
            return Err(err);
        }
        log::debug!("attempt {attempt}/{max_attempts} failed: {err}");

        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(policy.delay) => {}
        }
    }
}
