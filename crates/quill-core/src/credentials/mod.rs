//! File-backed credential persistence.
//!
//! Stores the API credential as JSON under the data directory with
//! owner-only permissions. Purely local; no network access.

use std::fs;
use std::path::PathBuf;

use crate::config::DataConfig;
use crate::error::{Error, Result};
use crate::models::Credential;

/// Persists and retrieves the API credential for one data directory.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    #[must_use]
    pub fn new(config: &DataConfig) -> Self {
        Self {
            path: config.credential_path(),
        }
    }

    /// Write the credential, creating the data directory if needed.
    pub fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let payload = serde_json::to_string_pretty(credential)?;
        fs::write(&self.path, payload)?;
        restrict_permissions(&self.path)?;
        tracing::debug!("Credential saved to {}", self.path.display());
        Ok(())
    }

    /// Load the stored credential.
    ///
    /// Fails with [`Error::AuthMissing`] when no credential file exists,
    /// prompting the caller to run `quill init`.
    pub fn load(&self) -> Result<Credential> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::AuthMissing);
            }
            Err(error) => return Err(error.into()),
        };

        serde_json::from_str(&raw)
            .map_err(|error| Error::IndexCorrupt(format!("credential file: {error}")))
    }

    /// Remove the stored credential. Removing a missing credential is not an error.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &std::path::Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &std::path::Path) -> Result<()> {
    Ok(())
}
