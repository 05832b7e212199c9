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

//! Single request upload of a whole file

use crate::error::Error;
use crate::upload::progress::ProgressStream;
use crate::upload::retry::with_retry;
use crate::upload::transport::{PutObjectRequest, file_section_stream, put_with_deadline};
use crate::upload::utils::Crc32Handle;
use crate::upload::{UploadTarget, Uploader};

impl Uploader {
    /// PUTs the whole file to `upload_url`, retrying the request as a unit.
    ///
    /// Every attempt re-reads the file from its start. Returns the CRC32 of
    /// the bytes sent by the successful attempt.
    pub(crate) async fn upload_single(
        &self,
        target: &UploadTarget,
        upload_url: &str,
    ) -> Result<u32, Error> {
        with_retry(&self.config.retry, &self.cancel, || {
            self.put_whole_file(target, upload_url)
        })
        .await
    }

    async fn put_whole_file(&self, target: &UploadTarget, upload_url: &str) -> Result<u32, Error> {
        let body = file_section_stream(&target.path, 0, target.size).await?;

        let checksum = Crc32Handle::new();
        let observer = self.observer.clone();
        let filename = target.filename.clone();
        let body = ProgressStream::new(body, target.size)
            .with_checksum(checksum.clone())
            .with_callback(move |uploaded, total| observer.transferred(&filename, uploaded, total));

        let request = PutObjectRequest {
            url: upload_url.to_string(),
            content_type: Some(target.content_type.clone()),
            content_length: target.size,
            body: Box::pin(body),
        };
        put_with_deadline(
            self.transport.as_ref(),
            request,
            self.config.single_upload_timeout,
            &self.cancel,
            "upload",
        )
        .await?;

        Ok(checksum.take())
    }
}
