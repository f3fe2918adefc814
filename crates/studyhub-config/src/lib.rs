//! Configuration, paths, and logging setup shared by the StudyHub crates.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_KEYRING_SERVICE, DEFAULT_LOG_LEVEL, DEFAULT_REFRESH_LEEWAY_SECS,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SUPABASE_PUBLISHABLE_KEY, DEFAULT_SUPABASE_URL,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
