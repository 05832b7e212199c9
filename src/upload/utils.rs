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

//! Various utility and helper functions

use crc_fast::{CrcAlgorithm, Digest as CrcFastDigest};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::AsyncReadExt;

use crate::error::{Error, IoError};

/// Read buffer size used when streaming files.
pub(crate) const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Formats a byte count with binary (1024) units, e.g. `1.5 MB`.
pub fn human_size(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT && exp < 5 {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let prefix = b"KMGTPE"[exp] as char;
    format!("{:.1} {prefix}B", bytes as f64 / div as f64)
}

/// Returns the consecutive part numbers `start..=end`.
pub fn generate_part_numbers(start: u32, end: u32) -> Vec<u32> {
    (start..=end).collect()
}

/// Computes CRC32 (IEEE) of given data.
pub fn crc32(data: &[u8]) -> u32 {
    crc_fast::checksum(CrcAlgorithm::Crc32IsoHdlc, data) as u32
}

/// Computes CRC32 (IEEE) of a whole file by reading it sequentially.
pub async fn file_crc32(path: &Path) -> Result<u32, Error> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|source| IoError::Open {
            path: path.display().to_string(),
            source,
        })?;
    let mut digest = CrcFastDigest::new(CrcAlgorithm::Crc32IsoHdlc);
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        digest.update(&buf[..n]);
    }
    Ok(digest.finalize() as u32)
}

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared running CRC32 that a body stream feeds while it is being sent.
#[derive(Clone)]
pub struct Crc32Handle(Arc<Mutex<CrcFastDigest>>);

impl Default for Crc32Handle {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc32Handle {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(CrcFastDigest::new(
            CrcAlgorithm::Crc32IsoHdlc,
        ))))
    }

    pub fn update(&self, data: &[u8]) {
        lock(&self.0).update(data);
    }

    /// Returns the checksum of everything fed so far and resets the state.
    pub fn take(&self) -> u32 {
        let mut guard = lock(&self.0);
        let digest = std::mem::replace(
            &mut *guard,
            CrcFastDigest::new(CrcAlgorithm::Crc32IsoHdlc),
        );
        digest.finalize() as u32
    }
}
