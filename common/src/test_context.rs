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

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use storageto::upload::{ProgressObserver, RetryPolicy, UploadConfig, Uploader};

use crate::mock_service::MockService;
use crate::mock_transport::MockTransport;

/// Engine settings for tests: three attempts with a short delay.
pub fn fast_config() -> UploadConfig {
    UploadConfig::default().retry(RetryPolicy::new(3, Duration::from_millis(10)))
}

/// Observer that keeps every notification.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub transferred: Mutex<Vec<(String, u64, u64)>>,
    pub stages: Mutex<Vec<String>>,
    pub files_completed: Mutex<Vec<(usize, usize)>>,
    pub warnings: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn stages(&self) -> Vec<String> {
        self.stages.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn files_completed(&self) -> Vec<(usize, usize)> {
        self.files_completed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Last reported byte count for `file`.
    pub fn last_transferred(&self, file: &str) -> Option<(u64, u64)> {
        self.transferred
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .find(|(f, _, _)| f == file)
            .map(|(_, uploaded, total)| (*uploaded, *total))
    }
}

impl ProgressObserver for RecordingObserver {
    fn transferred(&self, file: &str, uploaded: u64, total: u64) {
        self.transferred
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((file.to_string(), uploaded, total));
    }

    fn stage(&self, message: &str) {
        self.stages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.to_string());
    }

    fn files_completed(&self, done: usize, total: usize) {
        self.files_completed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((done, total));
    }

    fn warning(&self, message: &str) {
        self.warnings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.to_string());
    }
}

/// A scratch directory plus the service and transport doubles an uploader
/// under test talks to.
pub struct TestContext {
    pub dir: TempDir,
    pub service: Arc<MockService>,
    pub transport: Arc<MockTransport>,
    pub observer: Arc<RecordingObserver>,
}

impl TestContext {
    pub fn new(service: MockService, transport: MockTransport) -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
            service: Arc::new(service),
            transport: Arc::new(transport),
            observer: Arc::new(RecordingObserver::default()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(MockService::new(), MockTransport::new())
    }

    pub fn write_file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).expect("write test file");
        path
    }

    pub fn uploader(&self, config: UploadConfig) -> Uploader {
        Uploader::builder()
            .service(self.service.clone())
            .transport(self.transport.clone())
            .observer(self.observer.clone())
            .config(config)
            .build()
    }
}
