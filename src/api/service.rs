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

//! The coordination service seam used by the upload engine

use async_trait::async_trait;

use crate::api::types::{
    CollectionRecord, CompletedPart, ConfirmOutcome, ConfirmUploadRequest, FileRecord,
    InitUploadRequest, NegotiationPlan,
};
use crate::error::Error;

/// Operations of the storage.to coordination API.
///
/// [`crate::api::ApiClient`] talks to the real service over HTTP; tests plug
/// in scripted implementations.
#[async_trait]
pub trait UploadService: Send + Sync {
    /// Negotiates how a single file is to be uploaded.
    async fn init_upload(&self, request: &InitUploadRequest) -> Result<NegotiationPlan, Error>;

    /// Negotiates many files at once. The returned vector is index-aligned
    /// with `files`; an `Err` entry marks that file alone as failed.
    async fn init_upload_batch(
        &self,
        files: &[InitUploadRequest],
    ) -> Result<Vec<Result<NegotiationPlan, Error>>, Error>;

    /// Requests destination URLs for the given parts of a multipart session.
    async fn get_part_urls(
        &self,
        upload_id: &str,
        part_numbers: &[u32],
    ) -> Result<Vec<(u32, String)>, Error>;

    /// Finalizes a multipart session. `parts` is sorted by part number.
    async fn complete_multipart(&self, upload_id: &str, parts: &[CompletedPart])
    -> Result<(), Error>;

    async fn abort_upload(&self, upload_id: &str) -> Result<(), Error>;

    async fn confirm_upload(&self, request: &ConfirmUploadRequest) -> Result<FileRecord, Error>;

    /// Confirms many files into a collection. The returned vector is
    /// index-aligned with `files`.
    async fn confirm_upload_batch(
        &self,
        collection_id: &str,
        files: &[ConfirmUploadRequest],
    ) -> Result<Vec<ConfirmOutcome>, Error>;

    async fn create_collection(&self, expected_file_count: usize)
    -> Result<CollectionRecord, Error>;

    async fn mark_collection_ready(&self, collection_id: &str) -> Result<CollectionRecord, Error>;
}
