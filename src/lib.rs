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

//! # storageto
//!
//! Client side upload orchestration for the [storage.to](https://storage.to)
//! file sharing service.
//!
//! The service never receives file bytes directly: every upload is
//! negotiated over its JSON API, the bytes go to presigned URLs, and a final
//! confirm call turns the stored object into a shareable link.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use storageto::api::ApiClient;
//! use storageto::upload::{HttpTransport, Uploader};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = ApiClient::builder("https://storage.to")
//!         .visitor_token(Some("cli_0123456789abcdef0123456789abcdef".to_string()))
//!         .build()
//!         .unwrap();
//!     let uploader = Uploader::builder()
//!         .transport(Arc::new(HttpTransport::from_api_client(&client)))
//!         .service(Arc::new(client))
//!         .build();
//!
//!     let result = uploader
//!         .upload_files(&["report.pdf", "photo.jpg"], false)
//!         .await
//!         .expect("upload failed");
//!     println!("{}", result.collection().unwrap().url);
//! }
//! ```
//!
//! ## Design
//! - [`upload::Uploader`] picks the strategy: one file goes single shot or
//!   multipart as the service decides, several files become a collection
//! - The service contract is the [`api::UploadService`] trait and the byte
//!   transport is [`upload::ObjectTransport`]; both can be replaced in tests
//! - Every network call and retry wait observes one
//!   [`tokio_util::sync::CancellationToken`]

#![allow(clippy::result_large_err)]

pub mod api;
pub mod config;
pub mod error;
pub mod upload;
pub mod version;

#[cfg(test)]
#[macro_use]
extern crate quickcheck;
