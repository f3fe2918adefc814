//! Storage key constants.

/// Keys of the persisted credential pair.
pub struct StorageKeys;

impl StorageKeys {
    /// Short-lived access credential
    pub const ACCESS: &'static str = "access";

    /// Long-lived refresh credential
    pub const REFRESH: &'static str = "refresh";
}
