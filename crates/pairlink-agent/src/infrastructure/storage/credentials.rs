//! Persisted link credentials.
//!
//! A successful pairing leaves one small JSON file behind
//! (`creds.json`, stored beside `config.toml`):
//!
//! ```json
//! {
//!   "device_id": "5b2a2b1e-6f4f-4d2e-9cd0-3f6f0a68c1a4",
//!   "display_id": "+15551234567"
//! }
//! ```
//!
//! Its presence is what "this device is linked" means to the rest of the
//! agent: `status` reads it, `unlink` and the logged-out verdict delete it,
//! and a new login refuses to start while it exists (unless forced).
//!
//! [`FileCredentialStore`] implements the [`CredentialStore`] port from
//! `pairlink-core` on top of this file, and additionally exposes the
//! concrete [`save`](FileCredentialStore::save) the gateway session calls
//! when the gateway reports a pair success.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pairlink_core::{CredentialStore, LinkedIdentity};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use super::config::{self, ConfigError};

/// File name of the credential file, stored beside the config file.
pub const CREDENTIALS_FILE_NAME: &str = "creds.json";

/// Error type for credential file operations.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing credentials at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The credential file is not valid JSON (or valid JSON of another shape).
    #[error("credential file is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

/// What one successful pairing persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Registration identity this device presented to the gateway in its
    /// `hello` frame.
    pub device_id: Uuid,
    /// Account handle the device is linked to, as reported by the gateway's
    /// pair-success frame (e.g. a phone number).
    pub display_id: String,
}

/// Resolves the platform-default credential file path.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot
/// be determined.
pub fn credentials_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config::config_dir()?.join(CREDENTIALS_FILE_NAME))
}

/// Returns the credential path that pairs with an explicit config path
/// (same directory, used with the `--config` override).
pub fn sibling_credentials_path(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(CREDENTIALS_FILE_NAME),
        _ => PathBuf::from(CREDENTIALS_FILE_NAME),
    }
}

/// JSON-file-backed credential store.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Creates a store over the given file path. The file need not exist.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The path this store reads and writes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the persisted record, or `None` when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Io`] for file-system errors other than
    /// "not found", and [`CredentialError::Json`] when the file exists but
    /// cannot be parsed.
    pub fn load(&self) -> Result<Option<CredentialRecord>, CredentialError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let record: CredentialRecord = serde_json::from_str(&content)?;
                Ok(Some(record))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CredentialError::Io {
                path: self.path.clone(),
                source: e,
            }),
        }
    }

    /// Persists `record`, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Io`] for file-system failures or
    /// [`CredentialError::Json`] if serialization fails.
    pub fn save(&self, record: &CredentialRecord) -> Result<(), CredentialError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| CredentialError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let content = serde_json::to_string_pretty(record)?;
        std::fs::write(&self.path, content).map_err(|source| CredentialError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Deletes the credential file. A file that is already gone counts as
    /// success, so remove is idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Io`] for file-system errors other than
    /// "not found".
    pub fn remove(&self) -> Result<(), CredentialError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CredentialError::Io {
                path: self.path.clone(),
                source: e,
            }),
        }
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn has_credentials(&self) -> bool {
        match self.load() {
            Ok(record) => record.is_some(),
            Err(e) => {
                // An unreadable file must not brick the login flow; treat it
                // as "not linked" and let a new pairing overwrite it.
                warn!("treating unreadable credential file as not linked: {e}");
                false
            }
        }
    }

    async fn identity(&self) -> Option<LinkedIdentity> {
        self.load().ok().flatten().map(|record| LinkedIdentity {
            display_id: Some(record.display_id),
        })
    }

    async fn clear(&self) -> Result<(), String> {
        self.remove().map_err(|e| e.to_string())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
