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

//! Request and response types of the storage.to upload API

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use typed_builder::TypedBuilder;

use crate::error::{ApiError, Error};

/// Describes one file to the service when negotiating an upload.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct InitUploadRequest {
    pub filename: String,
    pub content_type: String,
    pub size: u64,
}

/// How the service wants a file's bytes delivered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NegotiationPlan {
    /// One PUT of the whole file to `upload_url`.
    SingleShot {
        upload_url: String,
        storage_key: String,
    },
    Multipart(MultipartSession),
}

impl NegotiationPlan {
    /// Opaque identifier of the stored object, echoed back on confirm.
    pub fn storage_key(&self) -> &str {
        match self {
            NegotiationPlan::SingleShot { storage_key, .. } => storage_key,
            NegotiationPlan::Multipart(session) => &session.storage_key,
        }
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self, NegotiationPlan::Multipart(_))
    }
}

/// A server-side multipart upload session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultipartSession {
    pub upload_id: String,
    pub storage_key: String,
    /// Byte size of every part except possibly the last.
    pub part_size: u64,
    pub total_parts: u32,
    /// Destination URLs handed out up front, keyed by part number.
    pub initial_urls: BTreeMap<u32, String>,
}

/// An uploaded part: its number and the ETag the storage returned for it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletedPart {
    #[serde(rename = "partNumber")]
    pub part_number: u32,
    pub etag: String,
}

/// Registers an uploaded object as a file record.
///
/// Also used, without `collection_id`, for the entries of a batch confirm.
#[derive(Clone, Debug, Serialize, PartialEq, Eq, TypedBuilder)]
pub struct ConfirmUploadRequest {
    #[builder(setter(into))]
    pub filename: String,
    pub size: u64,
    #[builder(setter(into))]
    pub content_type: String,
    #[serde(rename = "r2_key")]
    #[builder(setter(into))]
    pub storage_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(into, strip_option))]
    pub collection_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub crc32: Option<u32>,
}

/// A file registered by the service.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRecord {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub raw_url: String,
    pub filename: String,
    pub size: u64,
    #[serde(default)]
    pub human_size: String,
    #[serde(default)]
    pub expires_at: String,
}

/// A collection grouping the files of a batch upload.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectionRecord {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub expires_at: String,
}

/// Outcome of one entry of a batch confirm. `Ok(None)` means the service
/// accepted the file without echoing its record.
pub type ConfirmOutcome = Result<Option<FileRecord>, Error>;

// ---------------------------------------------------------------------------
// wire format

/// Common `{success, error, ...}` shape of every response body.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten)]
    pub data: T,
}

impl<T> Envelope<T> {
    pub(crate) fn into_result(self) -> Result<T, Error> {
        if self.success {
            Ok(self.data)
        } else {
            Err(ApiError::Rejected(self.error.unwrap_or_default()).into())
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Empty {}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct InitUploadWire {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub upload_url: Option<String>,
    #[serde(default)]
    pub upload_id: Option<String>,
    #[serde(default)]
    pub r2_key: Option<String>,
    #[serde(default)]
    pub part_size: Option<u64>,
    #[serde(default)]
    pub total_parts: Option<u32>,
    #[serde(default)]
    pub initial_urls: Option<HashMap<String, String>>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Converts a map keyed by stringified part numbers.
pub(crate) fn parse_part_url_map(
    urls: HashMap<String, String>,
) -> Result<BTreeMap<u32, String>, Error> {
    urls.into_iter()
        .map(|(k, v)| match k.parse::<u32>() {
            Ok(n) if n > 0 => Ok((n, v)),
            _ => Err(ApiError::InvalidResponse(format!("invalid part number {k:?}")).into()),
        })
        .collect()
}

impl TryFrom<InitUploadWire> for NegotiationPlan {
    type Error = Error;

    fn try_from(wire: InitUploadWire) -> Result<Self, Error> {
        let storage_key = non_empty(wire.r2_key).ok_or(ApiError::MissingField("r2_key"))?;
        match wire.kind.as_str() {
            "multipart" => {
                let upload_id =
                    non_empty(wire.upload_id).ok_or(ApiError::MissingField("upload_id"))?;
                let part_size = wire
                    .part_size
                    .filter(|n| *n > 0)
                    .ok_or(ApiError::MissingField("part_size"))?;
                let total_parts = wire
                    .total_parts
                    .filter(|n| *n > 0)
                    .ok_or(ApiError::MissingField("total_parts"))?;
                let initial_urls = parse_part_url_map(wire.initial_urls.unwrap_or_default())?;
                Ok(NegotiationPlan::Multipart(MultipartSession {
                    upload_id,
                    storage_key,
                    part_size,
                    total_parts,
                    initial_urls,
                }))
            }
            // batch results from older servers omit the type
            "single" | "" => {
                let upload_url =
                    non_empty(wire.upload_url).ok_or(ApiError::MissingField("upload_url"))?;
                Ok(NegotiationPlan::SingleShot {
                    upload_url,
                    storage_key,
                })
            }
            other => {
                Err(ApiError::InvalidResponse(format!("unknown upload type {other:?}")).into())
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct InitBatchResultWire {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten)]
    pub plan: InitUploadWire,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct InitBatchWire {
    #[serde(default)]
    pub results: HashMap<String, InitBatchResultWire>,
}

impl InitBatchWire {
    /// Orders the index-keyed results to match the `count` requested files.
    pub(crate) fn into_plans(mut self, count: usize) -> Vec<Result<NegotiationPlan, Error>> {
        (0..count)
            .map(|i| match self.results.remove(&i.to_string()) {
                None => Err(ApiError::MissingField("batch init result").into()),
                Some(result) => match non_empty(result.error) {
                    Some(message) => Err(ApiError::Rejected(message).into()),
                    None => NegotiationPlan::try_from(result.plan),
                },
            })
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PartUrlsWire {
    #[serde(default)]
    pub urls: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ConfirmWire {
    #[serde(default)]
    pub file: Option<FileRecord>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ConfirmBatchResultWire {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub file: Option<FileRecord>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ConfirmBatchWire {
    #[serde(default)]
    pub results: Option<HashMap<String, ConfirmBatchResultWire>>,
}

impl ConfirmBatchWire {
    /// Orders the index-keyed results to match the `count` confirmed files.
    ///
    /// A response without any `results` confirms every file.
    pub(crate) fn into_outcomes(self, count: usize) -> Vec<ConfirmOutcome> {
        let Some(mut results) = self.results else {
            return (0..count).map(|_| Ok(None)).collect();
        };
        (0..count)
            .map(|i| match results.remove(&i.to_string()) {
                None => Err(ApiError::MissingField("batch confirm result").into()),
                Some(r) if r.success || r.file.is_some() => Ok(r.file),
                Some(r) => Err(ApiError::Rejected(
                    non_empty(r.error).unwrap_or_else(|| "confirm failed".to_string()),
                )
                .into()),
            })
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CollectionWire {
    #[serde(default)]
    pub collection: Option<CollectionRecord>,
}

#[derive(Debug, Serialize)]
pub(crate) struct InitBatchRequest<'a> {
    pub files: &'a [InitUploadRequest],
}

#[derive(Debug, Serialize)]
pub(crate) struct GetPartUrlsRequest<'a> {
    pub upload_id: &'a str,
    pub part_numbers: &'a [u32],
}

#[derive(Debug, Serialize)]
pub(crate) struct CompleteMultipartRequest<'a> {
    pub upload_id: &'a str,
    pub parts: &'a [CompletedPart],
}

#[derive(Debug, Serialize)]
pub(crate) struct AbortUploadRequest<'a> {
    pub upload_id: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ConfirmBatchRequest<'a> {
    pub collection_id: &'a str,
    pub files: &'a [ConfirmUploadRequest],
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateCollectionRequest {
    #[serde(skip_serializing_if = "is_zero")]
    pub expected_file_count: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Body of a 429 response.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RateLimitBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub used: Option<u64>,
    #[serde(default)]
    pub resets_in_seconds: Option<u64>,
}

/// Body of any other error response.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
