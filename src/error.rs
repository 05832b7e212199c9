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

//! Error definitions for upload operations

use thiserror::Error;

/// Errors detected locally before any request leaves the process.
#[derive(Debug, Error)]
pub enum ValidationErr {
    #[error("no files specified")]
    NoFiles,

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("{0} is a directory (use storageto upload {0}/* for contents)")]
    IsDirectory(String),

    #[error("invalid file pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("server proposed {total_parts} parts of {part_size} bytes for a {file_size} byte file")]
    InvalidPartLayout {
        file_size: u64,
        part_size: u64,
        total_parts: u32,
    },

    #[error("cannot complete multipart upload: {} of {total} parts missing (first missing part {})", .missing.len(), .missing.first().copied().unwrap_or_default())]
    IncompleteParts { total: u32, missing: Vec<u32> },

    #[error("no upload URL for part {0}")]
    MissingPartUrl(u32),
}

/// Errors raised while talking to the network layer.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        operation: &'static str,
        seconds: u64,
    },
}

/// Errors reported by the coordination service.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    RateLimited {
        message: String,
        limit: Option<u64>,
        used: Option<u64>,
        resets_in_seconds: Option<u64>,
    },

    #[error("{message}")]
    Server { status: u16, message: String },

    /// The service answered but flagged the request as unsuccessful.
    #[error("{0}")]
    Rejected(String),

    #[error("invalid response from server: {0}")]
    InvalidResponse(String),

    #[error("response is missing {0}")]
    MissingField(&'static str),
}

/// Errors from moving bytes to a destination URL.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("upload failed (HTTP {status}): {body}")]
    Status { status: u16, body: String },

    #[error("server did not return an ETag")]
    MissingEtag,

    #[error("part {part_number} failed: {source}")]
    Part {
        part_number: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("upload worker stopped unexpectedly: {0}")]
    Worker(String),
}

/// Local file system errors.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read file info for {path}: {source}")]
    Stat {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot load visitor token from {path}: {source}")]
    Identity {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationErr),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error("upload cancelled")]
    Cancelled,

    /// A step of a single file upload failed.
    #[error("failed to {operation} {file}: {source}")]
    Operation {
        operation: &'static str,
        file: String,
        #[source]
        source: Box<Error>,
    },

    /// A collection-level step of a batch upload failed.
    #[error("failed to {operation}: {source}")]
    Collection {
        operation: &'static str,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Returns true when this error, or the error it wraps, is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::Operation { source, .. } | Error::Collection { source, .. } => {
                source.is_cancelled()
            }
            Error::Transfer(TransferError::Part { source, .. }) => source.is_cancelled(),
            _ => false,
        }
    }

    pub(crate) fn operation(operation: &'static str, file: impl Into<String>, source: Error) -> Self {
        if source.is_cancelled() {
            return source;
        }
        Error::Operation {
            operation,
            file: file.into(),
            source: Box::new(source),
        }
    }

    pub(crate) fn collection(operation: &'static str, source: Error) -> Self {
        if source.is_cancelled() {
            return source;
        }
        Error::Collection {
            operation,
            source: Box::new(source),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(IoError::Other(err))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(NetworkError::Request(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_not_wrapped() {
        let err = Error::operation("initialize upload of", "a.bin", Error::Cancelled);
        assert!(matches!(err, Error::Cancelled));

        let err = Error::collection("create collection", Error::Cancelled);
        assert!(err.is_cancelled());
    }

    #[test]
    fn nested_cancellation_is_detected() {
        let err = Error::Transfer(TransferError::Part {
            part_number: 3,
            source: Box::new(Error::Cancelled),
        });
        assert!(err.is_cancelled());
        assert!(!Error::Api(ApiError::Rejected("nope".into())).is_cancelled());
    }

    #[test]
    fn operation_message_names_file() {
        let err = Error::operation(
            "confirm upload of",
            "photo.jpg",
            ApiError::Server {
                status: 500,
                message: "server error (HTTP 500)".into(),
            }
            .into(),
        );
        assert_eq!(
            err.to_string(),
            "failed to confirm upload of photo.jpg: server error (HTTP 500)"
        );
    }

    #[test]
    fn incomplete_parts_message() {
        let err = ValidationErr::IncompleteParts {
            total: 5,
            missing: vec![2, 4],
        };
        assert_eq!(
            err.to_string(),
            "cannot complete multipart upload: 2 of 5 parts missing (first missing part 2)"
        );
    }
}
