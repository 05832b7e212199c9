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

//! Local configuration: config directory, visitor identity token and CLI
//! defaults

use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, IoError};

pub use crate::api::DEFAULT_BASE_URL as DEFAULT_API_URL;

/// Environment variable overriding the API endpoint.
pub const API_URL_ENV: &str = "STORAGETO_API";
/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "STORAGETO_CONFIG_DIR";

const TOKEN_FILE: &str = "token";
const TOKEN_PREFIX: &str = "cli_";
const TOKEN_BYTES: usize = 16;

/// Returns the config directory: `$STORAGETO_CONFIG_DIR` when set, otherwise
/// `~/.config/storageto`.
pub fn config_dir() -> Result<PathBuf, Error> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().ok_or_else(|| IoError::Identity {
        path: "~/.config/storageto".to_string(),
        source: io::Error::new(io::ErrorKind::NotFound, "home directory not found"),
    })?;
    Ok(home.join(".config").join("storageto"))
}

/// Persists the anonymous visitor token that ties uploads to this machine.
///
/// The token is not a credential; it only lets the service group uploads
/// made from the same installation.
#[derive(Clone, Debug)]
pub struct IdentityStore {
    dir: PathBuf,
}

impl IdentityStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at [`config_dir`].
    pub fn from_env() -> Result<Self, Error> {
        Ok(Self::new(config_dir()?))
    }

    pub fn token_path(&self) -> PathBuf {
        self.dir.join(TOKEN_FILE)
    }

    /// Returns the stored token, creating and saving a new one on first use.
    pub fn visitor_token(&self) -> Result<String, Error> {
        let path = self.token_path();
        let identity_error = |source: io::Error| IoError::Identity {
            path: path.display().to_string(),
            source,
        };
        match std::fs::read_to_string(&path) {
            Ok(stored) if !stored.trim().is_empty() => return Ok(stored.trim().to_string()),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(identity_error(source).into()),
        }

        let token = generate_token();
        create_private_dir(&self.dir).map_err(identity_error)?;
        write_private_file(&path, &token).map_err(identity_error)?;
        log::debug!("Created visitor token at {}", path.display());
        Ok(token)
    }
}

fn generate_token() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::random();
    format!("{TOKEN_PREFIX}{}", hex::encode(bytes))
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dir)
}

fn write_private_file(path: &Path, contents: &str) -> io::Result<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_created_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path().join("nested"));

        let first = store.visitor_token().unwrap();
        assert_eq!(first.len(), 36);
        assert!(first.starts_with("cli_"));
        assert!(first[4..].chars().all(|c| c.is_ascii_hexdigit()));

        let second = store.visitor_token().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn stored_token_is_trimmed_and_empty_file_regenerates() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path());

        std::fs::write(store.token_path(), "cli_abc\n").unwrap();
        assert_eq!(store.visitor_token().unwrap(), "cli_abc");

        std::fs::write(store.token_path(), "  \n").unwrap();
        let token = store.visitor_token().unwrap();
        assert_eq!(token.len(), 36);
        assert_eq!(std::fs::read_to_string(store.token_path()).unwrap(), token);
    }

    #[test]
    fn unusable_config_dir_is_an_identity_error() {
        let dir = tempfile::tempdir().unwrap();
        let not_a_dir = dir.path().join("file");
        std::fs::write(&not_a_dir, "x").unwrap();

        let err = IdentityStore::new(&not_a_dir).visitor_token().unwrap_err();
        assert!(matches!(err, Error::Io(IoError::Identity { .. })), "{err}");
        assert!(err.to_string().starts_with("cannot load visitor token from"));
    }

    #[cfg(unix)]
    #[test]
    fn token_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path().join("cfg"));
        store.visitor_token().unwrap();

        let mode = std::fs::metadata(store.token_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
