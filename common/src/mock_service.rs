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

//! Scripted in-memory implementation of the coordination API.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use storageto::api::{
    CollectionRecord, CompletedPart, ConfirmOutcome, ConfirmUploadRequest, FileRecord,
    InitUploadRequest, MultipartSession, NegotiationPlan, UploadService,
};
use storageto::error::{ApiError, Error};
use storageto::upload::utils::human_size;

pub const SINGLE_URL_PREFIX: &str = "mock://single/";
pub const PART_URL_PREFIX: &str = "mock://parts/";

/// Destination URL the mock hands out for `part_number` of `upload_id`.
pub fn part_url(upload_id: &str, part_number: u32) -> String {
    format!("{PART_URL_PREFIX}{upload_id}/{part_number}")
}

pub fn single_url(filename: &str) -> String {
    format!("{SINGLE_URL_PREFIX}{filename}")
}

pub fn upload_id_for(filename: &str) -> String {
    format!("upload-{filename}")
}

#[derive(Debug, Default)]
struct Calls {
    init: Vec<String>,
    init_batch_sizes: Vec<usize>,
    part_url_requests: Vec<Vec<u32>>,
    completed: Vec<(String, Vec<CompletedPart>)>,
    aborted: Vec<String>,
    confirmed: Vec<ConfirmUploadRequest>,
    confirm_batch_sizes: Vec<usize>,
    collections_created: Vec<usize>,
    ready: Vec<String>,
}

/// In-memory [`UploadService`].
///
/// Files larger than the multipart threshold get a multipart session, all
/// others a single-shot URL. Every call is recorded for later assertions.
#[derive(Debug)]
pub struct MockService {
    part_size: u64,
    multipart_threshold: u64,
    initial_urls: u32,
    fail_init: HashSet<String>,
    fail_confirm: HashSet<String>,
    fail_complete: bool,
    call_delay: Option<Duration>,
    calls: Mutex<Calls>,
}

impl Default for MockService {
    fn default() -> Self {
        Self {
            part_size: 1024,
            multipart_threshold: u64::MAX,
            initial_urls: 2,
            fail_init: HashSet::new(),
            fail_confirm: HashSet::new(),
            fail_complete: false,
            call_delay: None,
            calls: Mutex::new(Calls::default()),
        }
    }
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files strictly larger than `threshold` bytes go multipart with parts
    /// of `part_size` bytes.
    pub fn multipart_above(mut self, threshold: u64, part_size: u64) -> Self {
        self.multipart_threshold = threshold;
        self.part_size = part_size;
        self
    }

    pub fn initial_urls(mut self, count: u32) -> Self {
        self.initial_urls = count;
        self
    }

    pub fn fail_init_for(mut self, filename: &str) -> Self {
        self.fail_init.insert(filename.to_string());
        self
    }

    pub fn fail_confirm_for(mut self, filename: &str) -> Self {
        self.fail_confirm.insert(filename.to_string());
        self
    }

    pub fn fail_complete(mut self) -> Self {
        self.fail_complete = true;
        self
    }

    /// Delays every coordination call.
    pub fn call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = Some(delay);
        self
    }

    fn calls(&self) -> std::sync::MutexGuard<'_, Calls> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn pause(&self) {
        if let Some(delay) = self.call_delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn plan_for(&self, request: &InitUploadRequest) -> Result<NegotiationPlan, Error> {
        if self.fail_init.contains(&request.filename) {
            return Err(ApiError::Rejected(format!("cannot accept {}", request.filename)).into());
        }
        let storage_key = format!("uploads/{}", request.filename);
        if request.size <= self.multipart_threshold {
            return Ok(NegotiationPlan::SingleShot {
                upload_url: single_url(&request.filename),
                storage_key,
            });
        }

        let upload_id = upload_id_for(&request.filename);
        let total_parts = request.size.div_ceil(self.part_size).max(1) as u32;
        let initial_urls: BTreeMap<u32, String> = (1..=self.initial_urls.min(total_parts))
            .map(|n| (n, part_url(&upload_id, n)))
            .collect();
        Ok(NegotiationPlan::Multipart(MultipartSession {
            upload_id,
            storage_key,
            part_size: self.part_size,
            total_parts,
            initial_urls,
        }))
    }

    fn record_for(request: &ConfirmUploadRequest) -> FileRecord {
        FileRecord {
            id: format!("id-{}", request.filename),
            url: format!("https://storage.to/f/{}", request.filename),
            raw_url: format!("https://storage.to/raw/{}", request.filename),
            filename: request.filename.clone(),
            size: request.size,
            human_size: human_size(request.size),
            expires_at: "2030-01-01T00:00:00Z".to_string(),
        }
    }

    pub fn init_calls(&self) -> Vec<String> {
        self.calls().init.clone()
    }

    pub fn init_batch_sizes(&self) -> Vec<usize> {
        self.calls().init_batch_sizes.clone()
    }

    pub fn part_url_requests(&self) -> Vec<Vec<u32>> {
        self.calls().part_url_requests.clone()
    }

    pub fn completed(&self) -> Vec<(String, Vec<CompletedPart>)> {
        self.calls().completed.clone()
    }

    pub fn aborted(&self) -> Vec<String> {
        self.calls().aborted.clone()
    }

    pub fn confirmed(&self) -> Vec<ConfirmUploadRequest> {
        self.calls().confirmed.clone()
    }

    pub fn confirm_batch_sizes(&self) -> Vec<usize> {
        self.calls().confirm_batch_sizes.clone()
    }

    pub fn collections_created(&self) -> Vec<usize> {
        self.calls().collections_created.clone()
    }

    pub fn ready(&self) -> Vec<String> {
        self.calls().ready.clone()
    }
}

#[async_trait]
impl UploadService for MockService {
    async fn init_upload(&self, request: &InitUploadRequest) -> Result<NegotiationPlan, Error> {
        self.pause().await;
        self.calls().init.push(request.filename.clone());
        self.plan_for(request)
    }

    async fn init_upload_batch(
        &self,
        files: &[InitUploadRequest],
    ) -> Result<Vec<Result<NegotiationPlan, Error>>, Error> {
        self.pause().await;
        self.calls().init_batch_sizes.push(files.len());
        Ok(files.iter().map(|f| self.plan_for(f)).collect())
    }

    async fn get_part_urls(
        &self,
        upload_id: &str,
        part_numbers: &[u32],
    ) -> Result<Vec<(u32, String)>, Error> {
        self.pause().await;
        self.calls().part_url_requests.push(part_numbers.to_vec());
        Ok(part_numbers
            .iter()
            .map(|n| (*n, part_url(upload_id, *n)))
            .collect())
    }

    async fn complete_multipart(
        &self,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), Error> {
        self.pause().await;
        if self.fail_complete {
            return Err(ApiError::Server {
                status: 500,
                message: "complete failed".to_string(),
            }
            .into());
        }
        self.calls()
            .completed
            .push((upload_id.to_string(), parts.to_vec()));
        Ok(())
    }

    async fn abort_upload(&self, upload_id: &str) -> Result<(), Error> {
        self.calls().aborted.push(upload_id.to_string());
        Ok(())
    }

    async fn confirm_upload(&self, request: &ConfirmUploadRequest) -> Result<FileRecord, Error> {
        self.pause().await;
        if self.fail_confirm.contains(&request.filename) {
            return Err(ApiError::Rejected("confirm failed".to_string()).into());
        }
        self.calls().confirmed.push(request.clone());
        Ok(Self::record_for(request))
    }

    async fn confirm_upload_batch(
        &self,
        _collection_id: &str,
        files: &[ConfirmUploadRequest],
    ) -> Result<Vec<ConfirmOutcome>, Error> {
        self.pause().await;
        let mut calls = self.calls();
        calls.confirm_batch_sizes.push(files.len());
        Ok(files
            .iter()
            .map(|f| {
                if self.fail_confirm.contains(&f.filename) {
                    Err(Error::from(ApiError::Rejected("confirm failed".to_string())))
                } else {
                    calls.confirmed.push(f.clone());
                    Ok(Some(Self::record_for(f)))
                }
            })
            .collect())
    }

    async fn create_collection(
        &self,
        expected_file_count: usize,
    ) -> Result<CollectionRecord, Error> {
        self.pause().await;
        self.calls().collections_created.push(expected_file_count);
        Ok(CollectionRecord {
            id: "col-1".to_string(),
            url: "https://storage.to/c/col-1".to_string(),
            expires_at: "2030-01-01T00:00:00Z".to_string(),
        })
    }

    async fn mark_collection_ready(&self, collection_id: &str) -> Result<CollectionRecord, Error> {
        self.pause().await;
        self.calls().ready.push(collection_id.to_string());
        Ok(CollectionRecord {
            id: collection_id.to_string(),
            url: format!("https://storage.to/c/{collection_id}"),
            expires_at: "2030-01-01T00:00:00Z".to_string(),
        })
    }
}
