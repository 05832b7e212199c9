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

//! Upload orchestration: strategy selection, transfers, retry and batching
//!
//! [`Uploader`] is the entry point. It negotiates a plan for each file with an
//! [`UploadService`](crate::api::UploadService), moves the bytes through an
//! [`ObjectTransport`] and confirms the result, either for one file or for a
//! whole collection.

mod batch;
pub mod content_type;
mod engine;
pub mod multipart;
pub mod progress;
pub mod retry;
mod single;
pub mod transport;
pub mod utils;

pub use engine::{BatchSummary, FailedFile, UploadResult, Uploader};
pub use progress::{NoProgress, ProgressObserver, ProgressStream};
pub use retry::RetryPolicy;
pub use transport::{HttpTransport, ObjectTransport, PutObjectRequest, PutObjectResponse};

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::InitUploadRequest;
use crate::error::{Error, IoError, ValidationErr};
use content_type::{detect_content_type, read_head};

/// Files above this size are always uploaded in parts by the service. The
/// decision itself belongs to the server; this is informational.
pub const MULTIPART_THRESHOLD: u64 = 5 * 1024 * 1024 * 1024;

/// Engine tunables.
#[derive(Clone, Debug)]
pub struct UploadConfig {
    pub retry: RetryPolicy,
    /// Parts of one multipart upload in flight at once.
    pub part_concurrency: usize,
    /// Whole files of a batch in flight at once.
    pub file_concurrency: usize,
    /// Files per bulk init / bulk confirm call.
    pub batch_page_size: usize,
    /// Part numbers requested per part URL fetch.
    pub part_url_page_size: u32,
    pub single_upload_timeout: Duration,
    pub part_upload_timeout: Duration,
    /// Deadline of the best-effort abort of a failed multipart session.
    pub abort_timeout: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            part_concurrency: 4,
            file_concurrency: 6,
            batch_page_size: 250,
            part_url_page_size: 50,
            single_upload_timeout: Duration::from_secs(30 * 60),
            part_upload_timeout: Duration::from_secs(10 * 60),
            abort_timeout: Duration::from_secs(10),
        }
    }
}

impl UploadConfig {
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn part_concurrency(mut self, n: usize) -> Self {
        self.part_concurrency = n.max(1);
        self
    }

    pub fn file_concurrency(mut self, n: usize) -> Self {
        self.file_concurrency = n.max(1);
        self
    }

    pub fn batch_page_size(mut self, n: usize) -> Self {
        self.batch_page_size = n.max(1);
        self
    }

    pub fn part_url_page_size(mut self, n: u32) -> Self {
        self.part_url_page_size = n.max(1);
        self
    }

    pub fn single_upload_timeout(mut self, timeout: Duration) -> Self {
        self.single_upload_timeout = timeout;
        self
    }

    pub fn part_upload_timeout(mut self, timeout: Duration) -> Self {
        self.part_upload_timeout = timeout;
        self
    }

    pub fn abort_timeout(mut self, timeout: Duration) -> Self {
        self.abort_timeout = timeout;
        self
    }
}

/// A local file ready for negotiation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadTarget {
    pub path: PathBuf,
    /// Final path component, as shown to the service.
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    /// Position within the submitted batch.
    pub index: usize,
}

impl UploadTarget {
    /// Opens and stats `path` and classifies its content.
    pub async fn from_path(path: &Path, index: usize) -> Result<Self, Error> {
        let display = path.display().to_string();
        let mut file = tokio::fs::File::open(path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                Error::from(ValidationErr::FileNotFound(display.clone()))
            } else {
                Error::from(IoError::Open {
                    path: display.clone(),
                    source,
                })
            }
        })?;
        let metadata = file.metadata().await.map_err(|source| IoError::Stat {
            path: display.clone(),
            source,
        })?;
        if metadata.is_dir() {
            return Err(ValidationErr::IsDirectory(display).into());
        }

        let head = read_head(&mut file).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(display);

        Ok(Self {
            content_type: detect_content_type(path, &head),
            path: path.to_path_buf(),
            filename,
            size: metadata.len(),
            index,
        })
    }

    pub fn init_request(&self) -> InitUploadRequest {
        InitUploadRequest {
            filename: self.filename.clone(),
            content_type: self.content_type.clone(),
            size: self.size,
        }
    }
}

/// Expands user supplied paths and glob patterns into a list of files.
///
/// A pattern without matches is taken as a literal path. Missing files and
/// directories are rejected before anything is uploaded.
pub fn expand_paths<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<PathBuf>, Error> {
    let mut files = Vec::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let paths = glob::glob(pattern).map_err(|source| ValidationErr::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        let mut matches: Vec<PathBuf> = paths.filter_map(Result::ok).collect();
        if matches.is_empty() {
            let literal = PathBuf::from(pattern);
            if !literal.exists() {
                return Err(ValidationErr::FileNotFound(pattern.to_string()).into());
            }
            matches.push(literal);
        }
        for path in matches {
            let metadata = std::fs::metadata(&path).map_err(|source| IoError::Stat {
                path: path.display().to_string(),
                source,
            })?;
            if metadata.is_dir() {
                return Err(ValidationErr::IsDirectory(path.display().to_string()).into());
            }
            files.push(path);
        }
    }
    if files.is_empty() {
        return Err(ValidationErr::NoFiles.into());
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn target_from_path_classifies_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.unknownext");
        fs::write(&path, b"plain text content").unwrap();

        let target = UploadTarget::from_path(&path, 7).await.unwrap();
        assert_eq!(target.filename, "notes.unknownext");
        assert_eq!(target.content_type, "text/plain; charset=utf-8");
        assert_eq!(target.size, 18);
        assert_eq!(target.index, 7);
        assert_eq!(target.init_request().size, 18);
    }

    #[tokio::test]
    async fn target_rejects_missing_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let err = UploadTarget::from_path(&dir.path().join("nope.txt"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationErr::FileNotFound(_))));

        let err = UploadTarget::from_path(dir.path(), 0).await.unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationErr::IsDirectory(_))));
    }

    #[test]
    fn expand_globs_and_literals() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.log", "b.log", "c.txt"] {
            fs::write(dir.path().join(name), name).unwrap();
        }
        let pattern = format!("{}/*.log", dir.path().display());
        let literal = dir.path().join("c.txt").display().to_string();

        let files = expand_paths(&[pattern, literal]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.log", "b.log", "c.txt"]);
    }

    #[test]
    fn expand_rejects_directories_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = expand_paths(&[dir.path().display().to_string()]).unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationErr::IsDirectory(_))));

        let missing = dir.path().join("missing.bin").display().to_string();
        let err = expand_paths(&[missing]).unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationErr::FileNotFound(_))));

        let err = expand_paths::<&str>(&[]).unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationErr::NoFiles)));
    }

    #[test]
    fn config_setters_clamp_to_one() {
        let config = UploadConfig::default()
            .part_concurrency(0)
            .file_concurrency(0)
            .batch_page_size(0);
        assert_eq!(config.part_concurrency, 1);
        assert_eq!(config.file_concurrency, 1);
        assert_eq!(config.batch_page_size, 1);
        assert_eq!(UploadConfig::default().retry.max_attempts, 3);
    }
}
