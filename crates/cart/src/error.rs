//! Error types for the cart store and its storage collaborators.

use std::sync::Arc;

use thiserror::Error;

/// Errors reported by a [`Storage`](crate::storage::Storage) backend.
///
/// Cloneable so the persister can hand the same failure to every caller
/// waiting on a flush.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Filesystem or device I/O failed.
    #[error("storage I/O error: {0}")]
    Io(#[source] Arc<std::io::Error>),

    /// The backend refused or could not service the request.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

/// Why a snapshot could not be written back to storage.
#[derive(Debug, Clone, Error)]
pub enum PersistError {
    /// The cart could not be serialized.
    #[error("failed to encode cart: {0}")]
    Encode(String),

    /// Every write attempt failed.
    #[error("failed to save cart revision {revision} after {attempts} attempt(s): {source}")]
    Storage {
        /// Revision that was being written.
        revision: u64,
        /// Number of attempts made.
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        source: StorageError,
    },
}

/// Errors surfaced by the cart store to its owner.
#[derive(Debug, Clone, Error)]
pub enum CartError {
    /// The cart was accessed before a store was installed in the provider.
    #[error("cart used outside of a provider: install a CartStore first")]
    OutsideProvider,

    /// A provider can only hold one store.
    #[error("a cart store is already installed in this provider")]
    AlreadyInstalled,

    /// The store's background tasks have stopped.
    #[error("cart store is closed")]
    Closed,

    /// The latest cart state could not be persisted.
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Result type alias for [`CartError`].
pub type Result<T> = std::result::Result<T, CartError>;
