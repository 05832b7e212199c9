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

//! Client side of the storage.to coordination API

pub mod client;
pub mod service;
pub mod types;

pub use client::{ApiClient, ApiClientBuilder, ConnectionPoolConfig, DEFAULT_BASE_URL};
pub use service::UploadService;
pub use types::{
    CollectionRecord, CompletedPart, ConfirmOutcome, ConfirmUploadRequest, FileRecord,
    InitUploadRequest, MultipartSession, NegotiationPlan,
};
