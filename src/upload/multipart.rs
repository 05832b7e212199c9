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

//! Multipart upload: part planning, paged part URLs and concurrent parts

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::api::{CompletedPart, MultipartSession, UploadService};
use crate::error::{Error, TransferError, ValidationErr};
use crate::upload::progress::{ProgressObserver, ProgressStream};
use crate::upload::retry::with_retry;
use crate::upload::transport::{PutObjectRequest, file_section_stream, put_with_deadline};
use crate::upload::utils::{file_crc32, generate_part_numbers, human_size, lock};
use crate::upload::{UploadTarget, Uploader};

/// Byte range of a file sent as one part.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartAssignment {
    /// 1-based part number.
    pub part_number: u32,
    pub offset: u64,
    pub length: u64,
}

/// Upper bound on the parts of one multipart session.
pub const MAX_MULTIPART_COUNT: u32 = 10_000;

/// Number of parts of `part_size` bytes needed for `file_size` bytes. An
/// empty file still occupies one (empty) part.
pub fn part_count(file_size: u64, part_size: u64) -> Option<u32> {
    if part_size == 0 {
        return None;
    }
    u32::try_from(file_size.div_ceil(part_size).max(1)).ok()
}

/// Splits a file into contiguous parts.
///
/// Part `n` starts at `(n - 1) * part_size`; every part is `part_size` long
/// except the last, which holds the remainder. The server's `total_parts`
/// must agree with that layout and stay within [`MAX_MULTIPART_COUNT`].
pub fn plan_parts(
    file_size: u64,
    part_size: u64,
    total_parts: u32,
) -> Result<Vec<PartAssignment>, ValidationErr> {
    let layout_error = || ValidationErr::InvalidPartLayout {
        file_size,
        part_size,
        total_parts,
    };
    if total_parts > MAX_MULTIPART_COUNT
        || part_count(file_size, part_size).ok_or_else(layout_error)? != total_parts
    {
        return Err(layout_error());
    }

    Ok((1..=total_parts)
        .map(|part_number| {
            let offset = (part_number as u64 - 1) * part_size;
            let length = if part_number == total_parts {
                file_size - offset
            } else {
                part_size
            };
            PartAssignment {
                part_number,
                offset,
                length,
            }
        })
        .collect())
}

/// Known destination URLs of a session, indexed by `part_number - 1`.
#[derive(Clone, Debug, Default)]
pub struct PartUrlPool {
    urls: Vec<Option<String>>,
}

impl PartUrlPool {
    pub fn new(total_parts: u32, initial: &BTreeMap<u32, String>) -> Self {
        let mut pool = Self {
            urls: vec![None; total_parts as usize],
        };
        pool.merge(initial.iter().map(|(n, url)| (*n, url.clone())));
        pool
    }

    pub fn get(&self, part_number: u32) -> Option<&str> {
        let index = (part_number as usize).checked_sub(1)?;
        self.urls.get(index)?.as_deref()
    }

    /// Adds fetched URLs; part numbers outside the session are ignored.
    pub fn merge(&mut self, urls: impl IntoIterator<Item = (u32, String)>) {
        for (part_number, url) in urls {
            if let Some(slot) = (part_number as usize)
                .checked_sub(1)
                .and_then(|i| self.urls.get_mut(i))
            {
                *slot = Some(url);
            }
        }
    }

    /// Part numbers to request when `part_number` has no URL yet: a page of
    /// at most `page_size` parts starting at `part_number`.
    pub fn next_page(&self, part_number: u32, page_size: u32) -> Vec<u32> {
        let total = self.urls.len() as u32;
        let end = part_number
            .saturating_add(page_size.max(1) - 1)
            .min(total);
        generate_part_numbers(part_number, end)
    }
}

/// Completion tokens of a session, indexed by `part_number - 1`.
#[derive(Clone, Debug, Default)]
pub struct CompletionSet {
    etags: Vec<Option<String>>,
}

impl CompletionSet {
    pub fn new(total_parts: u32) -> Self {
        Self {
            etags: vec![None; total_parts as usize],
        }
    }

    pub fn record(&mut self, part_number: u32, etag: String) {
        if let Some(slot) = (part_number as usize)
            .checked_sub(1)
            .and_then(|i| self.etags.get_mut(i))
        {
            *slot = Some(etag);
        }
    }

    pub fn missing(&self) -> Vec<u32> {
        self.etags
            .iter()
            .enumerate()
            .filter(|(_, etag)| etag.is_none())
            .map(|(i, _)| i as u32 + 1)
            .collect()
    }

    /// Returns the parts sorted by number, or the missing part numbers.
    pub fn into_sorted_parts(self) -> Result<Vec<CompletedPart>, ValidationErr> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(ValidationErr::IncompleteParts {
                total: self.etags.len() as u32,
                missing,
            });
        }
        Ok(self
            .etags
            .into_iter()
            .enumerate()
            .filter_map(|(i, etag)| {
                etag.map(|etag| CompletedPart {
                    part_number: i as u32 + 1,
                    etag,
                })
            })
            .collect())
    }
}

/// Running byte count across all parts of one file.
struct PartProgress {
    uploaded: Mutex<u64>,
    total: u64,
    filename: String,
    observer: Arc<dyn ProgressObserver>,
}

impl PartProgress {
    fn add(&self, bytes: u64) {
        let mut uploaded = lock(&self.uploaded);
        *uploaded += bytes;
        self.observer
            .transferred(&self.filename, *uploaded, self.total);
    }

    /// Takes back the bytes of a failed attempt that will be sent again.
    fn rewind(&self, bytes: u64) {
        let mut uploaded = lock(&self.uploaded);
        *uploaded = uploaded.saturating_sub(bytes);
    }
}

/// Aborts a multipart session unless disarmed.
///
/// Failures abort explicitly through [`AbortGuard::abort`]; if the owning
/// future is dropped instead, the abort is spawned from `Drop`.
struct AbortGuard {
    service: Arc<dyn UploadService>,
    upload_id: Option<String>,
    timeout: Duration,
}

impl AbortGuard {
    fn new(service: Arc<dyn UploadService>, upload_id: &str, timeout: Duration) -> Self {
        Self {
            service,
            upload_id: Some(upload_id.to_string()),
            timeout,
        }
    }

    fn disarm(&mut self) {
        self.upload_id = None;
    }

    async fn abort(mut self) {
        if let Some(upload_id) = self.upload_id.take() {
            abort_session(self.service.clone(), upload_id, self.timeout).await;
        }
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if let Some(upload_id) = self.upload_id.take()
            && let Ok(handle) = tokio::runtime::Handle::try_current()
        {
            handle.spawn(abort_session(self.service.clone(), upload_id, self.timeout));
        }
    }
}

/// Best-effort abort bounded by `timeout`. Runs even after cancellation.
async fn abort_session(service: Arc<dyn UploadService>, upload_id: String, timeout: Duration) {
    match tokio::time::timeout(timeout, service.abort_upload(&upload_id)).await {
        Ok(Ok(())) => log::debug!("Cleaned up partial upload {upload_id}"),
        Ok(Err(e)) => log::warn!("failed to abort multipart upload {upload_id}: {e}"),
        Err(_) => log::warn!(
            "abort of multipart upload {upload_id} timed out after {}s",
            timeout.as_secs()
        ),
    }
}

fn record_first_error(slot: &Mutex<Option<Error>>, err: Error) {
    let mut slot = lock(slot);
    if slot.is_none() {
        *slot = Some(err);
    }
}

fn has_error(slot: &Mutex<Option<Error>>) -> bool {
    lock(slot).is_some()
}

impl Uploader {
    /// Uploads `target` through an open multipart session and returns the
    /// CRC32 of the whole file.
    ///
    /// On failure or cancellation the session is aborted.
    pub(crate) async fn upload_multipart(
        &self,
        target: &UploadTarget,
        session: &MultipartSession,
    ) -> Result<u32, Error> {
        log::debug!(
            "Multipart upload of {}: {} parts, {} each",
            target.filename,
            session.total_parts,
            human_size(session.part_size)
        );

        let mut guard = AbortGuard::new(
            self.service.clone(),
            &session.upload_id,
            self.config.abort_timeout,
        );
        match self.run_multipart(target, session).await {
            Ok(crc32) => {
                guard.disarm();
                Ok(crc32)
            }
            Err(e) => {
                guard.abort().await;
                Err(e)
            }
        }
    }

    async fn run_multipart(
        &self,
        target: &UploadTarget,
        session: &MultipartSession,
    ) -> Result<u32, Error> {
        let parts = plan_parts(target.size, session.part_size, session.total_parts)?;
        let mut url_pool = PartUrlPool::new(session.total_parts, &session.initial_urls);

        let completions = Arc::new(Mutex::new(CompletionSet::new(session.total_parts)));
        let first_error: Arc<Mutex<Option<Error>>> = Arc::new(Mutex::new(None));
        let progress = Arc::new(PartProgress {
            uploaded: Mutex::new(0),
            total: target.size,
            filename: target.filename.clone(),
            observer: self.observer.clone(),
        });
        let semaphore = Arc::new(Semaphore::new(self.config.part_concurrency));
        let mut tasks = JoinSet::new();

        for part in parts {
            if self.cancel.is_cancelled() || has_error(&first_error) {
                break;
            }

            let url = match self
                .part_url(&mut url_pool, session, &target.filename, part.part_number)
                .await
            {
                Ok(url) => url,
                Err(e) => {
                    record_first_error(&first_error, e);
                    break;
                }
            };

            let permit = tokio::select! {
                _ = self.cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            // a sibling may have failed while this part waited for a slot
            if has_error(&first_error) {
                break;
            }

            let uploader = self.clone();
            let path = target.path.clone();
            let completions = completions.clone();
            let first_error = first_error.clone();
            let progress = progress.clone();
            tasks.spawn(async move {
                let _permit = permit;
                match uploader.upload_part(&path, part, &url, &progress).await {
                    Ok(etag) => lock(&completions).record(part.part_number, etag),
                    Err(e) if e.is_cancelled() => record_first_error(&first_error, e),
                    Err(e) => record_first_error(
                        &first_error,
                        TransferError::Part {
                            part_number: part.part_number,
                            source: Box::new(e),
                        }
                        .into(),
                    ),
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                record_first_error(&first_error, TransferError::Worker(e.to_string()).into());
            }
        }

        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(e) = lock(&first_error).take() {
            return Err(e);
        }

        let completed = std::mem::take(&mut *lock(&completions)).into_sorted_parts()?;
        log::debug!(
            "Completing multipart upload {} with {} parts",
            session.upload_id,
            completed.len()
        );
        self.cancellable(
            self.service
                .complete_multipart(&session.upload_id, &completed),
        )
        .await
        .map_err(|e| Error::operation("complete upload of", &target.filename, e))?;

        // the checksum reflects what is on disk, independent of part order
        file_crc32(&target.path).await
    }

    /// Returns the URL of `part_number`, fetching the next page when unknown.
    async fn part_url(
        &self,
        pool: &mut PartUrlPool,
        session: &MultipartSession,
        filename: &str,
        part_number: u32,
    ) -> Result<String, Error> {
        if let Some(url) = pool.get(part_number) {
            return Ok(url.to_string());
        }

        let numbers = pool.next_page(part_number, self.config.part_url_page_size);
        log::debug!(
            "Fetching upload URLs for parts {}-{} of {}",
            part_number,
            numbers.last().copied().unwrap_or(part_number),
            session.total_parts
        );
        let urls = self
            .cancellable(self.service.get_part_urls(&session.upload_id, &numbers))
            .await
            .map_err(|e| Error::operation("get upload URLs for", filename, e))?;
        pool.merge(urls);

        pool.get(part_number)
            .map(str::to_string)
            .ok_or_else(|| ValidationErr::MissingPartUrl(part_number).into())
    }

    async fn upload_part(
        &self,
        path: &Path,
        part: PartAssignment,
        url: &str,
        progress: &Arc<PartProgress>,
    ) -> Result<String, Error> {
        with_retry(&self.config.retry, &self.cancel, || {
            self.put_part(path, part, url, progress)
        })
        .await
    }

    async fn put_part(
        &self,
        path: &Path,
        part: PartAssignment,
        url: &str,
        progress: &Arc<PartProgress>,
    ) -> Result<String, Error> {
        let body = file_section_stream(path, part.offset, part.length).await?;

        let sent = Arc::new(AtomicU64::new(0));
        let body = {
            let sent = sent.clone();
            let progress = progress.clone();
            ProgressStream::new(body, part.length).with_callback(move |uploaded, _| {
                let previous = sent.swap(uploaded, Ordering::Relaxed);
                progress.add(uploaded - previous);
            })
        };

        let request = PutObjectRequest {
            url: url.to_string(),
            content_type: None,
            content_length: part.length,
            body: Box::pin(body),
        };
        let result = put_with_deadline(
            self.transport.as_ref(),
            request,
            self.config.part_upload_timeout,
            &self.cancel,
            "part upload",
        )
        .await
        .and_then(|response| response.etag.ok_or_else(|| TransferError::MissingEtag.into()));

        if result.is_err() {
            progress.rewind(sent.load(Ordering::Relaxed));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_exact_multiple() {
        let parts = plan_parts(30, 10, 3).unwrap();
        assert_eq!(
            parts,
            vec![
                PartAssignment { part_number: 1, offset: 0, length: 10 },
                PartAssignment { part_number: 2, offset: 10, length: 10 },
                PartAssignment { part_number: 3, offset: 20, length: 10 },
            ]
        );
    }

    #[test]
    fn plan_short_last_part() {
        let parts = plan_parts(25, 10, 3).unwrap();
        assert_eq!(parts[2], PartAssignment { part_number: 3, offset: 20, length: 5 });
    }

    #[test]
    fn plan_rejects_inconsistent_layout() {
        assert!(plan_parts(25, 10, 2).is_err());
        assert!(plan_parts(25, 10, 4).is_err());
        assert!(plan_parts(25, 0, 1).is_err());
        assert_eq!(plan_parts(0, 10, 1).unwrap()[0].length, 0);
    }

    #[test]
    fn plan_rejects_oversized_sessions() {
        let size = MAX_MULTIPART_COUNT as u64 + 1;
        assert!(matches!(
            plan_parts(size, 1, MAX_MULTIPART_COUNT + 1),
            Err(ValidationErr::InvalidPartLayout { .. })
        ));
        assert!(plan_parts(u32::MAX as u64, 1, u32::MAX).is_err());
        assert_eq!(
            plan_parts(MAX_MULTIPART_COUNT as u64, 1, MAX_MULTIPART_COUNT)
                .unwrap()
                .len(),
            MAX_MULTIPART_COUNT as usize
        );
    }

    #[test]
    fn url_pool_pages() {
        let mut initial = BTreeMap::new();
        initial.insert(1, "u1".to_string());
        initial.insert(2, "u2".to_string());
        let mut pool = PartUrlPool::new(120, &initial);

        assert_eq!(pool.get(2), Some("u2"));
        assert_eq!(pool.get(3), None);
        assert_eq!(pool.get(0), None);

        let page = pool.next_page(3, 50);
        assert_eq!(page.first(), Some(&3));
        assert_eq!(page.last(), Some(&52));
        assert_eq!(pool.next_page(101, 50), generate_part_numbers(101, 120));

        pool.merge(vec![(3, "u3".to_string()), (500, "ignored".to_string())]);
        assert_eq!(pool.get(3), Some("u3"));
    }

    #[test]
    fn completion_set_requires_every_part() {
        let mut set = CompletionSet::new(3);
        set.record(3, "c".into());
        set.record(1, "a".into());
        assert_eq!(set.missing(), vec![2]);

        let err = set.clone().into_sorted_parts().unwrap_err();
        assert!(matches!(
            err,
            ValidationErr::IncompleteParts { total: 3, ref missing } if missing == &vec![2]
        ));

        set.record(2, "b".into());
        let parts = set.into_sorted_parts().unwrap();
        let numbers: Vec<_> = parts.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(parts[1].etag, "b");
    }

    quickcheck! {
        fn prop_parts_cover_file(file_size: u32, part_size: u16) -> bool {
            let part_size = part_size as u64 + 1;
            let file_size = file_size as u64 % (part_size * MAX_MULTIPART_COUNT as u64 + 1);
            let total = part_count(file_size, part_size).unwrap();
            let parts = plan_parts(file_size, part_size, total).unwrap();

            let sum: u64 = parts.iter().map(|p| p.length).sum();
            let offsets_ok = parts
                .iter()
                .all(|p| p.offset == (p.part_number as u64 - 1) * part_size);
            let sizes_ok = parts[..parts.len() - 1].iter().all(|p| p.length == part_size)
                && parts[parts.len() - 1].length <= part_size;
            let contiguous = parts.windows(2).all(|w| w[0].offset + w[0].length == w[1].offset);

            sum == file_size && offsets_ok && sizes_ok && contiguous
        }
    }
}
