//! High-level API for the persisted credential pair.

use crate::{SecureStorage, StorageKeys, StorageResult};
use tracing::warn;

/// An access/refresh credential pair as persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub access: String,
    pub refresh: String,
}

impl std::fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

/// Durable store for the session's credential pair.
pub struct CredentialStore {
    storage: Box<dyn SecureStorage>,
}

impl CredentialStore {
    /// Create a new credential store with the given storage backend
    pub fn new(storage: Box<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    /// Persist both credentials.
    ///
    /// The refresh credential is written first so that an interrupted save
    /// never leaves an access credential without its refresh partner.
    pub fn save_pair(&self, access: &str, refresh: &str) -> StorageResult<()> {
        self.storage.set(StorageKeys::REFRESH, refresh)?;
        self.storage.set(StorageKeys::ACCESS, access)
    }

    /// Load the pair; `None` unless both halves are present and non-empty.
    pub fn load_pair(&self) -> StorageResult<Option<CredentialPair>> {
        let access = self.access_credential()?;
        let refresh = self.refresh_credential()?;

        Ok(match (access, refresh) {
            (Some(access), Some(refresh)) => Some(CredentialPair { access, refresh }),
            _ => None,
        })
    }

    /// Stored access credential, if any.
    pub fn access_credential(&self) -> StorageResult<Option<String>> {
        self.get_non_empty(StorageKeys::ACCESS)
    }

    /// Stored refresh credential, if any.
    pub fn refresh_credential(&self) -> StorageResult<Option<String>> {
        self.get_non_empty(StorageKeys::REFRESH)
    }

    /// Whether a usable pair is stored.
    pub fn has_pair(&self) -> StorageResult<bool> {
        Ok(self.load_pair()?.is_some())
    }

    /// Remove both credentials.
    ///
    /// Both deletes are attempted; the first failure is returned.
    pub fn clear(&self) -> StorageResult<()> {
        let access = self.storage.delete(StorageKeys::ACCESS);
        let refresh = self.storage.delete(StorageKeys::REFRESH);

        if let Err(ref e) = access {
            warn!(key = StorageKeys::ACCESS, error = %e, "Failed to delete credential");
        }
        if let Err(ref e) = refresh {
            warn!(key = StorageKeys::REFRESH, error = %e, "Failed to delete credential");
        }

        access?;
        refresh?;
        Ok(())
    }

    fn get_non_empty(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.storage.get(key)?.filter(|value| !value.is_empty()))
    }
}
