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

use serde::{Serialize, Serializer};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use typed_builder::TypedBuilder;

use crate::api::{
    CollectionRecord, ConfirmUploadRequest, FileRecord, NegotiationPlan, UploadService,
};
use crate::error::{Error, ValidationErr};
use crate::upload::progress::{NoProgress, ProgressObserver};
use crate::upload::transport::ObjectTransport;
use crate::upload::utils::human_size;
use crate::upload::{UploadConfig, UploadTarget};

/// Uploads files to storage.to.
///
/// Cloning is cheap: all collaborators are shared, and clones observe the
/// same cancellation token.
///
/// ```no_run
/// use std::sync::Arc;
/// use storageto::api::ApiClient;
/// use storageto::upload::{HttpTransport, Uploader};
///
/// # async fn run() -> Result<(), storageto::error::Error> {
/// let client = ApiClient::builder("https://storage.to").build()?;
/// let uploader = Uploader::builder()
///     .transport(Arc::new(HttpTransport::from_api_client(&client)))
///     .service(Arc::new(client))
///     .build();
/// let result = uploader.upload_files(&["photo.jpg"], false).await?;
/// println!("{}", result.file().map(|f| f.url.as_str()).unwrap_or_default());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, TypedBuilder)]
pub struct Uploader {
    pub(crate) service: Arc<dyn UploadService>,
    pub(crate) transport: Arc<dyn ObjectTransport>,
    #[builder(default)]
    pub(crate) config: UploadConfig,
    #[builder(default = Arc::new(NoProgress) as Arc<dyn ProgressObserver>)]
    pub(crate) observer: Arc<dyn ProgressObserver>,
    #[builder(default)]
    pub(crate) cancel: CancellationToken,
}

/// Counts of a finished batch upload.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct BatchSummary {
    pub files_total: usize,
    pub files_uploaded: usize,
    pub files_failed: usize,
    /// Records returned for confirmed files, in input order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailedFile>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct FailedFile {
    pub filename: String,
    pub error: String,
}

/// Outcome of [`Uploader::upload_files`].
///
/// Serializes as `{"file", "collection", "is_collection"}` with the unused
/// record set to `null`, plus `summary` for collections.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadResult {
    File {
        file: FileRecord,
    },
    Collection {
        collection: CollectionRecord,
        summary: BatchSummary,
    },
}

#[derive(Serialize)]
struct ResultOutput<'a> {
    file: Option<&'a FileRecord>,
    collection: Option<&'a CollectionRecord>,
    is_collection: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<&'a BatchSummary>,
}

impl Serialize for UploadResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ResultOutput {
            file: self.file(),
            collection: self.collection(),
            is_collection: self.is_collection(),
            summary: self.summary(),
        }
        .serialize(serializer)
    }
}

impl UploadResult {
    pub fn is_collection(&self) -> bool {
        matches!(self, UploadResult::Collection { .. })
    }

    pub fn file(&self) -> Option<&FileRecord> {
        match self {
            UploadResult::File { file } => Some(file),
            UploadResult::Collection { .. } => None,
        }
    }

    pub fn collection(&self) -> Option<&CollectionRecord> {
        match self {
            UploadResult::Collection { collection, .. } => Some(collection),
            UploadResult::File { .. } => None,
        }
    }

    pub fn summary(&self) -> Option<&BatchSummary> {
        match self {
            UploadResult::Collection { summary, .. } => Some(summary),
            UploadResult::File { .. } => None,
        }
    }
}

impl Uploader {
    /// Token that cancels every operation of this uploader and its clones.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Uploads `paths`.
    ///
    /// A single path is uploaded on its own unless `as_collection` is set;
    /// anything else becomes a collection through the batch pipeline.
    pub async fn upload_files<P: AsRef<Path>>(
        &self,
        paths: &[P],
        as_collection: bool,
    ) -> Result<UploadResult, Error> {
        match paths {
            [] => Err(ValidationErr::NoFiles.into()),
            [path] if !as_collection => {
                let file = self.upload_file(path.as_ref(), None).await?;
                Ok(UploadResult::File { file })
            }
            _ => self.upload_batch(paths).await,
        }
    }

    /// Uploads one file, optionally into an existing collection.
    pub async fn upload_file(
        &self,
        path: &Path,
        collection_id: Option<&str>,
    ) -> Result<FileRecord, Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let target = UploadTarget::from_path(path, 0).await?;
        log::debug!(
            "Uploading {} ({}, {})",
            target.filename,
            human_size(target.size),
            target.content_type
        );

        let plan = self
            .cancellable(self.service.init_upload(&target.init_request()))
            .await
            .map_err(|e| Error::operation("initialize upload of", &target.filename, e))?;

        let crc32 = self
            .transfer(&target, &plan)
            .await
            .map_err(|e| Error::operation("upload", &target.filename, e))?;

        let mut request = confirm_request(&target, &plan, crc32);
        request.collection_id = collection_id.map(str::to_string);
        self.cancellable(self.service.confirm_upload(&request))
            .await
            .map_err(|e| Error::operation("confirm upload of", &target.filename, e))
    }

    /// Moves the bytes of `target` as `plan` says and returns the file CRC32.
    pub(crate) async fn transfer(
        &self,
        target: &UploadTarget,
        plan: &NegotiationPlan,
    ) -> Result<u32, Error> {
        match plan {
            NegotiationPlan::SingleShot { upload_url, .. } => {
                self.upload_single(target, upload_url).await
            }
            NegotiationPlan::Multipart(session) => self.upload_multipart(target, session).await,
        }
    }

    /// Awaits `fut` unless the uploader is cancelled first.
    pub(crate) async fn cancellable<T>(
        &self,
        fut: impl Future<Output = Result<T, Error>>,
    ) -> Result<T, Error> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            result = fut => result,
        }
    }
}

pub(crate) fn confirm_request(
    target: &UploadTarget,
    plan: &NegotiationPlan,
    crc32: u32,
) -> ConfirmUploadRequest {
    ConfirmUploadRequest::builder()
        .filename(target.filename.as_str())
        .size(target.size)
        .content_type(target.content_type.as_str())
        .storage_key(plan.storage_key())
        .crc32(crc32)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_accessors() {
        let file = UploadResult::File {
            file: FileRecord {
                id: "f1".into(),
                ..Default::default()
            },
        };
        assert!(!file.is_collection());
        assert_eq!(file.file().unwrap().id, "f1");
        assert!(file.collection().is_none());

        let collection = UploadResult::Collection {
            collection: CollectionRecord {
                id: "c1".into(),
                ..Default::default()
            },
            summary: BatchSummary {
                files_total: 3,
                files_uploaded: 2,
                files_failed: 1,
                files: vec![],
                failures: vec![],
            },
        };
        assert!(collection.is_collection());
        assert_eq!(collection.summary().unwrap().files_failed, 1);
    }

    #[test]
    fn result_json_shape() {
        let result = UploadResult::File {
            file: FileRecord {
                id: "f1".into(),
                url: "https://storage.to/f1".into(),
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["is_collection"], false);
        assert_eq!(json["file"]["url"], "https://storage.to/f1");
        assert!(json["collection"].is_null());
        assert!(json.get("summary").is_none());

        let result = UploadResult::Collection {
            collection: CollectionRecord {
                id: "c1".into(),
                url: "https://storage.to/c/c1".into(),
                ..Default::default()
            },
            summary: BatchSummary {
                files_total: 1,
                files_uploaded: 1,
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["is_collection"], true);
        assert!(json["file"].is_null());
        assert_eq!(json["collection"]["url"], "https://storage.to/c/c1");
        assert_eq!(json["summary"]["files_uploaded"], 1);
    }

    #[test]
    fn confirm_request_uses_plan_key() {
        let target = UploadTarget {
            path: "a.txt".into(),
            filename: "a.txt".into(),
            content_type: "text/plain".into(),
            size: 5,
            index: 0,
        };
        let plan = NegotiationPlan::SingleShot {
            upload_url: "u".into(),
            storage_key: "uploads/a".into(),
        };
        let req = confirm_request(&target, &plan, 42);
        assert_eq!(req.storage_key, "uploads/a");
        assert_eq!(req.crc32, Some(42));
        assert_eq!(req.collection_id, None);
    }
}
