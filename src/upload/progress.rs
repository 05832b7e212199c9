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

//! Progress reporting for uploads

use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::upload::utils::Crc32Handle;

/// Receives progress notifications from an upload.
///
/// Implementations must be cheap: callbacks run on the upload tasks, and
/// `transferred` may fire concurrently for different parts or files.
pub trait ProgressObserver: Send + Sync {
    /// `uploaded` of `total` bytes of `file` have been handed to the network.
    fn transferred(&self, _file: &str, _uploaded: u64, _total: u64) {}

    /// A human readable stage message, e.g. "Creating collection...".
    fn stage(&self, _message: &str) {}

    /// `done` of `total` files of a batch have been transferred.
    fn files_completed(&self, _done: usize, _total: usize) {}

    fn warning(&self, _message: &str) {}
}

/// Observer that discards every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {}

pub type ProgressCallback = Box<dyn FnMut(u64, u64) + Send>;

/// Stream adapter that counts bytes flowing through it.
///
/// After every non-empty chunk the callback receives the running byte count
/// and the expected total. When a [`Crc32Handle`] is attached, every chunk is
/// also folded into the checksum.
pub struct ProgressStream<S> {
    inner: S,
    uploaded: u64,
    total: u64,
    checksum: Option<Crc32Handle>,
    callback: Option<ProgressCallback>,
}

impl<S> ProgressStream<S> {
    pub fn new(inner: S, total: u64) -> Self {
        Self {
            inner,
            uploaded: 0,
            total,
            checksum: None,
            callback: None,
        }
    }

    pub fn with_checksum(mut self, checksum: Crc32Handle) -> Self {
        self.checksum = Some(checksum);
        self
    }

    pub fn with_callback(mut self, callback: impl FnMut(u64, u64) + Send + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn uploaded(&self) -> u64 {
        self.uploaded
    }
}

impl<S, E> Stream for ProgressStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let inner = Pin::new(&mut self.inner);
        match inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if !chunk.is_empty() {
                    let this = &mut *self;
                    this.uploaded += chunk.len() as u64;
                    if let Some(ref checksum) = this.checksum {
                        checksum.update(&chunk);
                    }
                    if let Some(ref mut callback) = this.callback {
                        callback(this.uploaded, this.total);
                    }
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            other => other,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
