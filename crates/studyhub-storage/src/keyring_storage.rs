//! OS keychain backend.
//!
//! Delegates to the `keyring` crate, which maps onto Keychain Access on
//! macOS, the Secret Service on Linux and the Credential Vault on Windows.

use crate::{SecureStorage, StorageError, StorageResult};
use keyring::Entry;
use tracing::debug;

/// Keychain-backed storage; one entry per key under a single service name.
pub struct KeyringStorage {
    service: String,
}

impl KeyringStorage {
    pub fn new(service: impl Into<String>) -> StorageResult<Self> {
        let service = service.into();
        if service.trim().is_empty() {
            return Err(StorageError::Platform(
                "Keychain service name must not be empty".to_string(),
            ));
        }
        Ok(Self { service })
    }

    fn entry(&self, key: &str) -> StorageResult<Entry> {
        Entry::new(&self.service, key).map_err(|e| {
            StorageError::Platform(format!("Failed to create keychain entry {}: {}", key, e))
        })
    }
}

impl SecureStorage for KeyringStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entry(key)?.set_password(value).map_err(|e| {
            StorageError::Platform(format!("Failed to store {} in keychain: {}", key, e))
        })
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(keyring::Error::BadEncoding(_)) => Err(StorageError::Encoding(format!(
                "Keychain value for {} is not valid UTF-8",
                key
            ))),
            Err(e) => Err(StorageError::Platform(format!(
                "Failed to read {} from keychain: {}",
                key, e
            ))),
        }
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => {
                debug!(key = %key, "Keychain entry already absent");
                Ok(false)
            }
            Err(e) => Err(StorageError::Platform(format!(
                "Failed to delete {} from keychain: {}",
                key, e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_service_rejected() {
        assert!(matches!(
            KeyringStorage::new("  "),
            Err(StorageError::Platform(_))
        ));
    }
}
