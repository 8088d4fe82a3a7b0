//! Integration tests for the Marketplace cart.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p marketplace-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cart_store` - Store lifecycle against real file storage
//! - `cart_provider` - Consumer access through the provider
//!
//! This crate also exposes a few fixtures shared by the test files.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use marketplace_cart::{CartConfig, CartStore, FileStorage, NewCartItem};
use marketplace_core::Price;

/// Config with a unique storage key and fast retries.
#[must_use]
pub fn test_config(dir: &Path) -> CartConfig {
    let mut config = CartConfig::default()
        .with_storage_key(format!("@Test:{}", uuid::Uuid::new_v4()))
        .with_retries(1, Duration::from_millis(1));
    config.storage_dir = dir.to_path_buf();
    config
}

/// File storage rooted at the config's directory.
#[must_use]
pub fn file_storage(config: &CartConfig) -> Arc<FileStorage> {
    Arc::new(FileStorage::new(&config.storage_dir))
}

/// Open a store over file storage and wait for its load.
pub async fn open_store(config: &CartConfig) -> CartStore {
    CartStore::open(file_storage(config), config).await
}

/// A candidate product with a predictable title and image.
#[must_use]
pub fn product(id: &str, cents: i64) -> NewCartItem {
    NewCartItem::new(
        id,
        format!("Product {id}"),
        format!("https://cdn.example.com/{id}.png"),
        Price::from_cents(cents),
    )
}
