//! Secure credential storage for StudyHub.
//!
//! This crate provides:
//! - `SecureStorage`, the backend trait (get/set/delete, all fallible)
//! - `KeyringStorage`, the OS keychain backend via `keyring`
//! - `MemoryStorage`, a process-local backend
//! - `CredentialStore`, the access/refresh pair API the session layer uses

mod credentials;
mod keyring_storage;
mod keys;
mod memory;
mod traits;

pub use credentials::{CredentialPair, CredentialStore};
pub use keyring_storage::KeyringStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use traits::SecureStorage;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Platform-specific storage error
    #[error("Platform storage error: {0}")]
    Platform(String),

    /// Key not found
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create the default platform storage under the given keychain service name.
pub fn create_storage(service: &str) -> StorageResult<Box<dyn SecureStorage>> {
    Ok(Box::new(KeyringStorage::new(service)?))
}

/// Create a CredentialStore with the default platform storage.
pub fn create_credential_store(service: &str) -> StorageResult<CredentialStore> {
    Ok(CredentialStore::new(create_storage(service)?))
}
