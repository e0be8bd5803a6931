//! Credential persistence

use crate::auth::Credential;
use crate::storage::{write_file_atomic, StorageError, StorageResult};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

/// Durable home for the OAuth access credential
pub trait CredentialStore: Send + Sync {
    /// Loads the stored credential, `None` if nothing has been stored yet
    fn load(&self) -> StorageResult<Option<Credential>>;

    /// Replaces the stored credential
    fn save(&self, credential: &Credential) -> StorageResult<()>;

    /// Forgets the stored credential (no-op when nothing is stored)
    fn clear(&self) -> StorageResult<()>;
}

/// Credential kept in a JSON file readable only by its owner
///
/// The file holds `{"token": ..., "secret": ...}`.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> StorageResult<Option<Credential>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let credential: Credential = serde_json::from_str(&content)?;
        if credential.access_token.is_empty() || credential.token_secret.is_empty() {
            return Err(StorageError::Corrupt(format!(
                "{} holds an empty token",
                self.path.display()
            )));
        }

        Ok(Some(credential))
    }

    fn save(&self, credential: &Credential) -> StorageResult<()> {
        let json = serde_json::to_vec_pretty(credential)?;
        write_file_atomic(&self.path, &json, true)?;
        tracing::info!("Saved access token to {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process credential store
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credential: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            credential: Mutex::new(Some(credential)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> StorageResult<Option<Credential>> {
        Ok(self.credential.lock().clone())
    }

    fn save(&self, credential: &Credential) -> StorageResult<()> {
        *self.credential.lock() = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        *self.credential.lock() = None;
        Ok(())
    }
}
