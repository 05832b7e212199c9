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

//! Build and version information

/// Crate version baked in at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Commit hash injected by the release build through `STORAGETO_GIT_COMMIT`.
pub fn git_commit() -> &'static str {
    option_env!("STORAGETO_GIT_COMMIT").unwrap_or("unknown")
}

/// Build date injected by the release build through `STORAGETO_BUILD_DATE`.
pub fn build_date() -> &'static str {
    option_env!("STORAGETO_BUILD_DATE").unwrap_or("unknown")
}

/// Returns just the version number.
pub fn short() -> &'static str {
    VERSION
}

/// Returns the version together with commit, build date and platform.
pub fn full() -> String {
    format!(
        "{VERSION} (commit: {}, built: {}, {}/{})",
        git_commit(),
        build_date(),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// User-Agent header value sent with every request.
pub fn user_agent() -> String {
    format!(
        "storageto-cli/{VERSION} ({}/{})",
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_contains_version_and_platform() {
        let full = full();
        assert!(full.starts_with(VERSION));
        assert!(full.contains(std::env::consts::OS));
        assert!(full.contains(std::env::consts::ARCH));
        assert!(full.contains("commit:"));
    }

    #[test]
    fn short_is_version() {
        assert_eq!(short(), VERSION);
    }

    #[test]
    fn user_agent_format() {
        let ua = user_agent();
        assert!(ua.starts_with("storageto-cli/"));
        assert!(ua.contains(VERSION));
        assert!(ua.ends_with(&format!(
            "({}/{})",
            std::env::consts::OS,
            std::env::consts::ARCH
        )));
    }
}
