//! Runtime configuration for Quill components.
//!
//! All state that would otherwise be ambient (data directory, remote API base
//! URL, timeouts) lives in [`DataConfig`] and is threaded explicitly through
//! the credential store, local index, and sync client. Tests construct their
//! own configs pointing at isolated temp directories.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

/// Default remote API base URL; overridable via `QUILL_API_URL`.
pub const DEFAULT_API_BASE_URL: &str = "https://api.quillnotes.app";

/// Environment variable overriding the local data directory.
pub const DATA_DIR_ENV: &str = "QUILL_DATA_DIR";

/// Environment variable overriding the remote API base URL.
pub const API_URL_ENV: &str = "QUILL_API_URL";

const HTTP_TIMEOUT_SECS: u64 = 30;

/// Resolved runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataConfig {
    /// Directory holding the credential file and the local index database.
    pub data_dir: PathBuf,
    /// Base URL of the remote note service, without a trailing slash.
    pub api_base_url: String,
    /// Per-request timeout for network calls.
    pub http_timeout: Duration,
}

impl DataConfig {
    /// Resolve configuration from an optional explicit data directory,
    /// falling back to environment overrides and platform defaults.
    pub fn resolve(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = data_dir
            .or_else(|| env::var_os(DATA_DIR_ENV).map(PathBuf::from))
            .unwrap_or_else(default_data_dir);

        let api_base_url = normalize_text_option(env::var(API_URL_ENV).ok())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        Self::new(data_dir, api_base_url)
    }

    /// Build a config from explicit values, validating the API URL.
    pub fn new(data_dir: impl Into<PathBuf>, api_base_url: impl Into<String>) -> Result<Self> {
        let api_base_url = api_base_url.into().trim().to_string();
        if !is_http_url(&api_base_url) {
            return Err(Error::InvalidInput(format!(
                "API base URL must include http:// or https://: {api_base_url}"
            )));
        }

        Ok(Self {
            data_dir: data_dir.into(),
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            http_timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
        })
    }

    /// Path to the persisted credential file.
    pub fn credential_path(&self) -> PathBuf {
        self.data_dir.join("credential.json")
    }

    /// Path to the local index database.
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join("index.db")
    }

    /// Ensure the data directory exists.
    pub fn ensure_data_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quill")
}

/// Config pointing at a caller-owned directory, used by tests.
pub fn config_for_dir(dir: &Path) -> DataConfig {
    DataConfig::new(dir, DEFAULT_API_BASE_URL).expect("default URL is valid")
}
