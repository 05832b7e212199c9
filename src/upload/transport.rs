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

//! Byte transfer to presigned destination URLs

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use std::io::SeekFrom;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::error::{Error, IoError, NetworkError, TransferError};
use crate::upload::utils::READ_CHUNK_SIZE;

/// Request body handed to a transport.
pub type BodyStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// A single PUT of `content_length` bytes to a presigned URL.
pub struct PutObjectRequest {
    pub url: String,
    /// Set for whole-file uploads; parts are sent without a content type.
    pub content_type: Option<String>,
    pub content_length: u64,
    pub body: BodyStream,
}

impl std::fmt::Debug for PutObjectRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PutObjectRequest")
            .field("url", &self.url)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PutObjectResponse {
    /// ETag with surrounding quotes removed; `None` when absent or empty.
    pub etag: Option<String>,
}

/// Moves bytes to storage. Implemented over HTTP by [`HttpTransport`].
#[async_trait]
pub trait ObjectTransport: Send + Sync {
    async fn put_object(&self, request: PutObjectRequest) -> Result<PutObjectResponse, Error>;
}

/// [`ObjectTransport`] backed by `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Reuses the connection pool and user-agent of an API client.
    pub fn from_api_client(client: &ApiClient) -> Self {
        Self::new(client.http_client().clone())
    }
}

#[async_trait]
impl ObjectTransport for HttpTransport {
    async fn put_object(&self, request: PutObjectRequest) -> Result<PutObjectResponse, Error> {
        log::trace!("PUT {} ({} bytes)", request.url, request.content_length);
        let mut req = self
            .http_client
            .put(&request.url)
            .header(CONTENT_LENGTH, request.content_length)
            .body(reqwest::Body::wrap_stream(request.body));
        if let Some(content_type) = request.content_type {
            req = req.header(CONTENT_TYPE, content_type);
        }

        let resp = req.send().await?;
        let status = resp.status().as_u16();
        if status >= 400 {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransferError::Status { status, body }.into());
        }

        Ok(PutObjectResponse {
            etag: normalize_etag(
                resp.headers()
                    .get(ETAG)
                    .and_then(|v| v.to_str().ok()),
            ),
        })
    }
}

pub(crate) fn normalize_etag(raw: Option<&str>) -> Option<String> {
    raw.map(|v| v.trim_matches('"'))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Runs one PUT bounded by `deadline` and abandoned on cancellation.
pub(crate) async fn put_with_deadline(
    transport: &dyn ObjectTransport,
    request: PutObjectRequest,
    deadline: Duration,
    cancel: &CancellationToken,
    operation: &'static str,
) -> Result<PutObjectResponse, Error> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = tokio::time::timeout(deadline, transport.put_object(request)) => match result {
            Ok(response) => response,
            Err(_) => Err(NetworkError::Timeout {
                operation,
                seconds: deadline.as_secs(),
            }
            .into()),
        },
    }
}

/// Streams `length` bytes of the file at `path` starting at `offset`.
///
/// Every call opens its own handle, so concurrent sections of the same file
/// never share a cursor. A file that turns out shorter than expected ends
/// the stream with `UnexpectedEof`.
pub async fn file_section_stream(
    path: &Path,
    offset: u64,
    length: u64,
) -> Result<BodyStream, Error> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|source| IoError::Open {
            path: path.display().to_string(),
            source,
        })?;
    if offset > 0 {
        file.seek(SeekFrom::Start(offset)).await?;
    }
    let mut reader = file.take(length);

    let stream = async_stream::try_stream! {
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        let mut sent = 0u64;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            sent += n as u64;
            yield Bytes::copy_from_slice(&buf[..n]);
        }
        if sent < length {
            Err::<(), _>(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("file ended after {sent} of {length} bytes"),
            ))?;
        }
    };
    Ok(Box::pin(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::io::Write;

    async fn collect(mut body: BodyStream) -> std::io::Result<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }

    #[test]
    fn etag_quotes_are_trimmed() {
        assert_eq!(normalize_etag(Some("\"abc123\"")), Some("abc123".to_string()));
        assert_eq!(normalize_etag(Some("abc")), Some("abc".to_string()));
        assert_eq!(normalize_etag(Some("\"\"")), None);
        assert_eq!(normalize_etag(None), None);
    }

    #[tokio::test]
    async fn reads_exact_section() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..300_000u32).map(|i| (i % 256) as u8).collect();
        file.write_all(&data).unwrap();

        let body = file_section_stream(file.path(), 100_000, 150_000).await.unwrap();
        assert_eq!(collect(body).await.unwrap(), &data[100_000..250_000]);

        let body = file_section_stream(file.path(), 0, data.len() as u64).await.unwrap();
        assert_eq!(collect(body).await.unwrap(), data);
    }

    #[tokio::test]
    async fn short_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"only ten b").unwrap();
        let body = file_section_stream(file.path(), 0, 20).await.unwrap();
        let err = collect(body).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn missing_file_fails_to_open() {
        let err = file_section_stream(Path::new("/nonexistent/file.bin"), 0, 1)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Io(IoError::Open { .. })));
    }
}
