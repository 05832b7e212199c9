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

//! Collection uploads: paged negotiation, bounded concurrent transfers and
//! paged confirmation with per-file fault isolation

use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use crate::api::{ConfirmUploadRequest, FileRecord, NegotiationPlan};
use crate::error::{ApiError, Error, TransferError};
use crate::upload::engine::{BatchSummary, FailedFile, UploadResult, confirm_request};
use crate::upload::progress::ProgressObserver;
use crate::upload::utils::lock;
use crate::upload::{UploadTarget, Uploader};

/// Where one file of a batch stands.
#[derive(Debug)]
pub(crate) enum ItemState {
    Pending,
    Negotiated(NegotiationPlan),
    Transferred { plan: NegotiationPlan, crc32: u32 },
    Confirmed(Option<FileRecord>),
    Failed(Error),
}

/// One file of a batch. At any time exactly one task owns it.
#[derive(Debug)]
pub(crate) struct BatchItem {
    pub target: UploadTarget,
    pub state: ItemState,
}

impl BatchItem {
    fn new(target: UploadTarget) -> Self {
        Self {
            target,
            state: ItemState::Pending,
        }
    }

    fn is_negotiated(&self) -> bool {
        matches!(self.state, ItemState::Negotiated(_))
    }

    fn is_transferred(&self) -> bool {
        matches!(self.state, ItemState::Transferred { .. })
    }

    fn confirm_request(&self) -> Option<ConfirmUploadRequest> {
        match &self.state {
            ItemState::Transferred { plan, crc32 } => {
                Some(confirm_request(&self.target, plan, *crc32))
            }
            _ => None,
        }
    }

    fn fail(&mut self, stage: &str, err: Error) {
        log::warn!("failed to {stage} {}: {err}", self.target.filename);
        self.state = ItemState::Failed(err);
    }
}

/// Counts finished transfers for the observer.
struct BatchProgress {
    completed: Mutex<usize>,
    total: usize,
    observer: Arc<dyn ProgressObserver>,
}

impl BatchProgress {
    fn file_finished(&self) {
        let mut completed = lock(&self.completed);
        *completed += 1;
        self.observer.files_completed(*completed, self.total);
    }
}

fn summarize(items: &[BatchItem]) -> BatchSummary {
    let failures: Vec<FailedFile> = items
        .iter()
        .filter_map(|item| match &item.state {
            ItemState::Failed(e) => Some(FailedFile {
                filename: item.target.filename.clone(),
                error: e.to_string(),
            }),
            _ => None,
        })
        .collect();
    let files_uploaded = items
        .iter()
        .filter(|item| matches!(item.state, ItemState::Confirmed(_)))
        .count();
    let files = items
        .iter()
        .filter_map(|item| match &item.state {
            ItemState::Confirmed(record) => record.clone(),
            _ => None,
        })
        .collect();

    BatchSummary {
        files_total: items.len(),
        files_uploaded,
        files_failed: failures.len(),
        files,
        failures,
    }
}

impl Uploader {
    /// Uploads `paths` as one collection.
    ///
    /// Unreadable inputs fail the whole batch before anything is sent. Once
    /// the collection exists, a file that fails to negotiate, transfer or
    /// confirm is reported in the summary and the remaining files proceed.
    pub(crate) async fn upload_batch<P: AsRef<Path>>(
        &self,
        paths: &[P],
    ) -> Result<UploadResult, Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut items = Vec::with_capacity(paths.len());
        for (index, path) in paths.iter().enumerate() {
            items.push(BatchItem::new(
                UploadTarget::from_path(path.as_ref(), index).await?,
            ));
        }

        let collection = self
            .cancellable(self.service.create_collection(items.len()))
            .await
            .map_err(|e| Error::collection("create collection", e))?;
        log::info!(
            "Created collection {} for {} files",
            collection.id,
            items.len()
        );

        self.negotiate(&mut items).await?;
        let mut items = self.transfer_items(items).await?;
        self.confirm(&collection.id, &mut items).await?;

        let ready = self
            .cancellable(self.service.mark_collection_ready(&collection.id))
            .await
            .map_err(|e| Error::collection("finalize collection", e))?;
        log::info!("Collection {} is ready", ready.id);

        let summary = summarize(&items);
        if summary.files_failed > 0 {
            let message = format!("{} files failed to upload", summary.files_failed);
            log::warn!("{message}");
            self.observer.warning(&message);
        }

        Ok(UploadResult::Collection {
            collection: ready,
            summary,
        })
    }

    /// Negotiates every file, one bulk call per page.
    async fn negotiate(&self, items: &mut [BatchItem]) -> Result<(), Error> {
        self.observer
            .stage(&format!("Initializing {} files...", items.len()));

        for page in items.chunks_mut(self.config.batch_page_size) {
            let requests: Vec<_> = page.iter().map(|item| item.target.init_request()).collect();
            log::debug!("Negotiating {} files", requests.len());
            let plans = self
                .cancellable(self.service.init_upload_batch(&requests))
                .await
                .map_err(|e| Error::collection("initialize batch", e))?;

            let mut plans = plans.into_iter();
            for item in page.iter_mut() {
                match plans.next() {
                    Some(Ok(plan)) => item.state = ItemState::Negotiated(plan),
                    Some(Err(e)) => item.fail("initialize upload of", e),
                    None => item.fail(
                        "initialize upload of",
                        ApiError::MissingField("results").into(),
                    ),
                }
            }
        }
        Ok(())
    }

    /// Transfers every negotiated file, at most `file_concurrency` at a time.
    ///
    /// Items come back in submission order.
    async fn transfer_items(&self, items: Vec<BatchItem>) -> Result<Vec<BatchItem>, Error> {
        let pending = items.iter().filter(|item| item.is_negotiated()).count();
        self.observer.stage(&format!(
            "Uploading {pending} files ({} concurrent)...",
            self.config.file_concurrency
        ));

        let progress = Arc::new(BatchProgress {
            completed: Mutex::new(0),
            total: pending,
            observer: self.observer.clone(),
        });
        let semaphore = Arc::new(Semaphore::new(self.config.file_concurrency));
        let mut slots: Vec<Option<BatchItem>> = Vec::with_capacity(items.len());
        let mut handles = Vec::new();

        for item in items {
            if !item.is_negotiated() || self.cancel.is_cancelled() {
                slots.push(Some(item));
                continue;
            }

            let permit = tokio::select! {
                _ = self.cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                slots.push(Some(item));
                continue;
            };

            let index = slots.len();
            slots.push(None);
            let target = item.target.clone();
            let uploader = self.clone();
            let progress = progress.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                let item = uploader.transfer_item(item).await;
                progress.file_finished();
                item
            });
            handles.push((index, target, handle));
        }

        for (index, target, handle) in handles {
            let item = match handle.await {
                Ok(item) => item,
                Err(e) => {
                    let mut item = BatchItem::new(target);
                    item.fail("upload", TransferError::Worker(e.to_string()).into());
                    item
                }
            };
            slots[index] = Some(item);
        }

        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(slots.into_iter().flatten().collect())
    }

    async fn transfer_item(&self, mut item: BatchItem) -> BatchItem {
        let ItemState::Negotiated(plan) = std::mem::replace(&mut item.state, ItemState::Pending)
        else {
            return item;
        };

        match self.transfer(&item.target, &plan).await {
            Ok(crc32) => item.state = ItemState::Transferred { plan, crc32 },
            Err(e) if e.is_cancelled() => item.state = ItemState::Failed(e),
            Err(e) => item.fail("upload", e),
        }
        item
    }

    /// Confirms every transferred file into the collection, one bulk call per
    /// page.
    async fn confirm(&self, collection_id: &str, items: &mut [BatchItem]) -> Result<(), Error> {
        let mut transferred: Vec<&mut BatchItem> =
            items.iter_mut().filter(|item| item.is_transferred()).collect();
        if transferred.is_empty() {
            return Ok(());
        }
        self.observer
            .stage(&format!("Confirming {} files...", transferred.len()));

        for page in transferred.chunks_mut(self.config.batch_page_size) {
            let requests: Vec<_> = page.iter().filter_map(|item| item.confirm_request()).collect();
            let outcomes = self
                .cancellable(self.service.confirm_upload_batch(collection_id, &requests))
                .await
                .map_err(|e| Error::collection("confirm batch", e))?;

            let mut outcomes = outcomes.into_iter();
            for item in page.iter_mut() {
                match outcomes.next() {
                    Some(Ok(record)) => item.state = ItemState::Confirmed(record),
                    Some(Err(e)) => item.fail("confirm upload of", e),
                    None => item.fail(
                        "confirm upload of",
                        ApiError::MissingField("results").into(),
                    ),
                }
            }
        }
        Ok(())
    }
}
