//! Explicit container through which consumers reach the cart store.

use std::sync::{Arc, OnceLock};

use crate::error::{CartError, Result};
use crate::store::CartStore;

/// Holds the cart store for a group of consumers.
///
/// A provider starts empty. The owner installs a store once, then hands clones
/// of the provider to whatever needs the cart. Asking for the cart before a
/// store is installed fails immediately.
///
/// ```rust
/// use marketplace_cart::{CartError, CartProvider};
///
/// let provider = CartProvider::new();
/// assert!(matches!(provider.cart(), Err(CartError::OutsideProvider)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CartProvider {
    store: Arc<OnceLock<CartStore>>,
}

impl CartProvider {
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the store consumers will use.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::AlreadyInstalled`] if a store is already present.
    pub fn install(&self, store: CartStore) -> Result<()> {
        self.store
            .set(store)
            .map_err(|_| CartError::AlreadyInstalled)
    }

    /// The installed store.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::OutsideProvider`] if no store has been installed.
    pub fn cart(&self) -> Result<&CartStore> {
        self.store.get().ok_or(CartError::OutsideProvider)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::CartConfig;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_cart_before_install_fails() {
        let provider = CartProvider::new();
        assert!(matches!(provider.cart(), Err(CartError::OutsideProvider)));
    }

    #[tokio::test]
    async fn test_clones_share_installed_store() {
        let provider = CartProvider::new();
        let consumer = provider.clone();

        let store = CartStore::new(Arc::new(MemoryStorage::new()), &CartConfig::default());
        provider.install(store).unwrap();

        let cart = consumer.cart().unwrap();
        cart.loaded().await.unwrap();
        assert!(cart.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_second_install_rejected() {
        let provider = CartProvider::new();
        let config = CartConfig::default();
        provider
            .install(CartStore::new(Arc::new(MemoryStorage::new()), &config))
            .unwrap();

        let result = provider.install(CartStore::new(Arc::new(MemoryStorage::new()), &config));
        assert!(matches!(result, Err(CartError::AlreadyInstalled)));
    }
}
