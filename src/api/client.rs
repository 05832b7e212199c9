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

//! HTTP client for the storage.to coordination API

use async_trait::async_trait;
use http::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use crate::api::service::UploadService;
use crate::api::types::*;
use crate::error::{ApiError, Error, NetworkError, ValidationErr};
use crate::version;

pub const DEFAULT_BASE_URL: &str = "https://storage.to";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const VISITOR_TOKEN_HEADER: &str = "X-Visitor-Token";

const INIT_UPLOAD_PATH: &str = "/api/upload/init";
const INIT_BATCH_PATH: &str = "/api/upload/init-batch";
const PART_URLS_PATH: &str = "/api/upload/parts";
const COMPLETE_MULTIPART_PATH: &str = "/api/upload/complete-multipart";
const ABORT_PATH: &str = "/api/upload/abort";
const CONFIRM_PATH: &str = "/api/upload/confirm";
const CONFIRM_BATCH_PATH: &str = "/api/upload/confirm-batch";
const COLLECTION_PATH: &str = "/api/collection";

/// HTTP connection pool settings shared by API calls and uploads.
#[derive(Debug, Clone)]
pub struct ConnectionPoolConfig {
    /// Idle connections kept per host. Default: 16, enough for the part and
    /// file workers of a batch.
    pub max_idle_per_host: usize,
    pub idle_timeout: Duration,
    pub tcp_keepalive: Duration,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 16,
            idle_timeout: Duration::from_secs(90),
            tcp_keepalive: Duration::from_secs(60),
        }
    }
}

impl ConnectionPoolConfig {
    pub fn max_idle_per_host(mut self, max: usize) -> Self {
        self.max_idle_per_host = max;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

/// Builder for [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ApiClientBuilder {
    base_url: String,
    visitor_token: Option<String>,
    /// (app_name, app_version) appended to the user-agent.
    app_info: Option<(String, String)>,
    request_timeout: Duration,
    connection_pool_config: ConnectionPoolConfig,
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl ApiClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            visitor_token: None,
            app_info: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connection_pool_config: ConnectionPoolConfig::default(),
        }
    }

    /// Anonymous identity sent as `X-Visitor-Token`. Empty tokens are ignored.
    pub fn visitor_token(mut self, token: Option<String>) -> Self {
        self.visitor_token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn app_info(mut self, app_info: Option<(String, String)>) -> Self {
        self.app_info = app_info;
        self
    }

    /// Timeout of each coordination call. Uploads have their own deadlines.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn connection_pool_config(mut self, config: ConnectionPoolConfig) -> Self {
        self.connection_pool_config = config;
        self
    }

    pub fn build(self) -> Result<ApiClient, Error> {
        let base_url = self.base_url.trim_end_matches('/').to_string();
        let parsed = url::Url::parse(&base_url).map_err(|e| ValidationErr::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ValidationErr::InvalidBaseUrl {
                url: self.base_url,
                reason: format!("unsupported scheme {}", parsed.scheme()),
            }
            .into());
        }

        let mut user_agent = version::user_agent();
        if let Some((app_name, app_version)) = self.app_info {
            user_agent.push_str(&format!(" {app_name}/{app_version}"));
        }

        let pool = &self.connection_pool_config;
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .pool_max_idle_per_host(pool.max_idle_per_host)
            .pool_idle_timeout(pool.idle_timeout)
            .tcp_keepalive(pool.tcp_keepalive)
            .build()
            .map_err(NetworkError::from)?;

        Ok(ApiClient {
            http_client,
            shared: Arc::new(SharedClientItems {
                base_url,
                visitor_token: self.visitor_token,
                request_timeout: self.request_timeout,
            }),
        })
    }
}

#[derive(Debug)]
pub(crate) struct SharedClientItems {
    base_url: String,
    visitor_token: Option<String>,
    request_timeout: Duration,
}

/// Client for the storage.to upload API.
///
/// Every call is a JSON `POST` carrying the visitor token; the response
/// envelope's `success` flag is checked before the payload is returned.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http_client: reqwest::Client,
    shared: Arc<SharedClientItems>,
}

impl ApiClient {
    pub fn builder(base_url: impl Into<String>) -> ApiClientBuilder {
        ApiClientBuilder::new(base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.shared.base_url
    }

    /// Underlying HTTP client, shared with [`crate::upload::HttpTransport`].
    pub fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.shared.base_url, path);
        log::debug!("POST {url}");

        let mut request = self
            .http_client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .timeout(self.shared.request_timeout)
            .json(body);
        if let Some(token) = &self.shared.visitor_token {
            request = request.header(VISITOR_TOKEN_HEADER, token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::from(NetworkError::Timeout {
                    operation: "request",
                    seconds: self.shared.request_timeout.as_secs(),
                })
            } else {
                Error::from(e)
            }
        })?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        log::trace!("POST {url} -> {status} ({} bytes)", body.len());

        if status >= 400 {
            return Err(error_from_response(status, &body).into());
        }

        let envelope: Envelope<T> = serde_json::from_slice(&body)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        envelope.into_result()
    }
}

/// Builds the error for a response with status >= 400.
///
/// For 429 the server's `error` text is surfaced verbatim; otherwise the
/// `error` field wins over `message`, with a generic fallback.
pub(crate) fn error_from_response(status: u16, body: &[u8]) -> ApiError {
    if status == 429 {
        let parsed: RateLimitBody = serde_json::from_slice(body).unwrap_or_default();
        let message = parsed
            .error
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| "rate limited - please try again later".to_string());
        return ApiError::RateLimited {
            message,
            limit: parsed.limit,
            used: parsed.used,
            resets_in_seconds: parsed.resets_in_seconds,
        };
    }

    let parsed: ErrorBody = serde_json::from_slice(body).unwrap_or_default();
    let message = parsed
        .error
        .filter(|e| !e.is_empty())
        .or(parsed.message.filter(|m| !m.is_empty()))
        .unwrap_or_else(|| format!("server error (HTTP {status})"));
    ApiError::Server { status, message }
}

#[async_trait]
impl UploadService for ApiClient {
    async fn init_upload(&self, request: &InitUploadRequest) -> Result<NegotiationPlan, Error> {
        let wire: InitUploadWire = self.post(INIT_UPLOAD_PATH, request).await?;
        NegotiationPlan::try_from(wire)
    }

    async fn init_upload_batch(
        &self,
        files: &[InitUploadRequest],
    ) -> Result<Vec<Result<NegotiationPlan, Error>>, Error> {
        let wire: InitBatchWire = self
            .post(INIT_BATCH_PATH, &InitBatchRequest { files })
            .await?;
        Ok(wire.into_plans(files.len()))
    }

    async fn get_part_urls(
        &self,
        upload_id: &str,
        part_numbers: &[u32],
    ) -> Result<Vec<(u32, String)>, Error> {
        let wire: PartUrlsWire = self
            .post(
                PART_URLS_PATH,
                &GetPartUrlsRequest {
                    upload_id,
                    part_numbers,
                },
            )
            .await?;
        Ok(parse_part_url_map(wire.urls)?.into_iter().collect())
    }

    async fn complete_multipart(
        &self,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), Error> {
        let _: Empty = self
            .post(
                COMPLETE_MULTIPART_PATH,
                &CompleteMultipartRequest { upload_id, parts },
            )
            .await?;
        Ok(())
    }

    async fn abort_upload(&self, upload_id: &str) -> Result<(), Error> {
        let _: Empty = self
            .post(ABORT_PATH, &AbortUploadRequest { upload_id })
            .await?;
        Ok(())
    }

    async fn confirm_upload(&self, request: &ConfirmUploadRequest) -> Result<FileRecord, Error> {
        let wire: ConfirmWire = self.post(CONFIRM_PATH, request).await?;
        Ok(wire.file.ok_or(ApiError::MissingField("file"))?)
    }

    async fn confirm_upload_batch(
        &self,
        collection_id: &str,
        files: &[ConfirmUploadRequest],
    ) -> Result<Vec<ConfirmOutcome>, Error> {
        let wire: ConfirmBatchWire = self
            .post(
                CONFIRM_BATCH_PATH,
                &ConfirmBatchRequest {
                    collection_id,
                    files,
                },
            )
            .await?;
        Ok(wire.into_outcomes(files.len()))
    }

    async fn create_collection(
        &self,
        expected_file_count: usize,
    ) -> Result<CollectionRecord, Error> {
        let wire: CollectionWire = self
            .post(
                COLLECTION_PATH,
                &CreateCollectionRequest {
                    expected_file_count,
                },
            )
            .await?;
        Ok(wire.collection.ok_or(ApiError::MissingField("collection"))?)
    }

    async fn mark_collection_ready(&self, collection_id: &str) -> Result<CollectionRecord, Error> {
        let path = format!(
            "{COLLECTION_PATH}/{}/ready",
            urlencoding::encode(collection_id)
        );
        let wire: CollectionWire = self.post(&path, &serde_json::json!({})).await?;
        Ok(wire.collection.ok_or(ApiError::MissingField("collection"))?)
    }
}
