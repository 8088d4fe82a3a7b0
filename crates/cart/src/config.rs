//! Cart configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All variables are optional.
//! - `CART_STORAGE_KEY` - Storage key holding the serialized cart (default: `@GoMarketplace:product`)
//! - `CART_STORAGE_DIR` - Directory used by file-backed storage (default: `.marketplace`)
//! - `CART_SAVE_RETRIES` - Extra save attempts after a failed write (default: 3)
//! - `CART_SAVE_BACKOFF_MS` - Delay before the first retry, doubled per attempt (default: 100)

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Storage key used by earlier releases of the mobile client.
pub const DEFAULT_STORAGE_KEY: &str = "@GoMarketplace:product";
const DEFAULT_STORAGE_DIR: &str = ".marketplace";
const DEFAULT_SAVE_RETRIES: u32 = 3;
const DEFAULT_SAVE_BACKOFF_MS: u64 = 100;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Cart store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartConfig {
    /// The single key the whole cart is stored under
    pub storage_key: String,
    /// Base directory for file-backed storage
    pub storage_dir: PathBuf,
    /// Extra attempts after a failed save
    pub save_retries: u32,
    /// Delay before the first retry
    pub save_backoff: Duration,
}

impl Default for CartConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            save_retries: DEFAULT_SAVE_RETRIES,
            save_backoff: Duration::from_millis(DEFAULT_SAVE_BACKOFF_MS),
        }
    }
}

impl CartConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a numeric variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let storage_key = lookup("CART_STORAGE_KEY")
            .filter(|key| !key.is_empty())
            .unwrap_or(defaults.storage_key);
        let storage_dir = lookup("CART_STORAGE_DIR").map_or(defaults.storage_dir, PathBuf::from);
        let save_retries = parse_var(&lookup, "CART_SAVE_RETRIES", defaults.save_retries)?;
        let backoff_ms = parse_var(&lookup, "CART_SAVE_BACKOFF_MS", DEFAULT_SAVE_BACKOFF_MS)?;

        Ok(Self {
            storage_key,
            storage_dir,
            save_retries,
            save_backoff: Duration::from_millis(backoff_ms),
        })
    }

    /// Use a different storage key.
    #[must_use]
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    /// Use a different retry policy.
    #[must_use]
    pub const fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.save_retries = retries;
        self.save_backoff = backoff;
        self
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse an optional variable, falling back to `default` when unset.
fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}
