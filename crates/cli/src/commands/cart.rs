//! Cart commands.
//!
//! # Usage
//!
//! ```bash
//! # Show the saved cart
//! mp-cli cart show
//!
//! # Add a product (adds one more unit if it is already in the cart)
//! mp-cli cart add --id tee-1 --title "T-shirt" --image-url https://cdn/tee.png --price 19.99
//!
//! # Change quantities
//! mp-cli cart increment tee-1
//! mp-cli cart decrement tee-1
//!
//! # Delete the saved cart
//! mp-cli cart clear
//! ```
//!
//! # Environment Variables
//!
//! See `marketplace_cart::config` for `CART_STORAGE_KEY`, `CART_STORAGE_DIR`
//! and the save retry settings.

use std::sync::Arc;

use marketplace_cart::{
    CartCollection, CartConfig, CartError, CartStore, ConfigError, FileStorage, NewCartItem,
    Storage, StorageError,
};
use marketplace_core::{Price, ProductId};
use thiserror::Error;

/// Errors that can occur during cart commands.
#[derive(Debug, Error)]
pub enum CartCommandError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The cart store reported a failure.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Storage could not be accessed directly.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// A product to add, as given on the command line.
pub struct AddParams {
    pub id: String,
    pub title: String,
    pub image_url: String,
    pub price: Price,
}

/// Open the store backed by the configured directory.
async fn open_store(config: &CartConfig) -> CartStore {
    tracing::debug!(dir = %config.storage_dir.display(), "Opening cart storage");
    let storage = Arc::new(FileStorage::new(&config.storage_dir));
    CartStore::open(storage, config).await
}

/// Print the saved cart.
pub async fn show() -> Result<(), CartCommandError> {
    let config = CartConfig::from_env()?;
    let store = open_store(&config).await;

    print_cart(&store.snapshot());
    store.close().await?;
    Ok(())
}

/// Add one unit of a product.
pub async fn add(params: AddParams) -> Result<(), CartCommandError> {
    let config = CartConfig::from_env()?;
    let store = open_store(&config).await;

    tracing::info!("Adding {} to cart", params.id);
    store
        .add_to_cart(NewCartItem::new(
            params.id,
            params.title,
            params.image_url,
            params.price,
        ))
        .await?;

    print_cart(&store.snapshot());
    store.close().await?;
    Ok(())
}

/// Add one unit of a product already in the cart.
pub async fn increment(id: &str) -> Result<(), CartCommandError> {
    let config = CartConfig::from_env()?;
    let store = open_store(&config).await;

    let id = ProductId::new(id);
    if store.snapshot().get(&id).is_none() {
        tracing::warn!("{id} is not in the cart, nothing to increment");
    }
    store.increment(&id).await?;

    print_cart(&store.snapshot());
    store.close().await?;
    Ok(())
}

/// Remove one unit of a product.
pub async fn decrement(id: &str) -> Result<(), CartCommandError> {
    let config = CartConfig::from_env()?;
    let store = open_store(&config).await;

    let id = ProductId::new(id);
    if store.snapshot().get(&id).is_none() {
        tracing::warn!("{id} is not in the cart, nothing to decrement");
    }
    store.decrement(&id).await?;

    print_cart(&store.snapshot());
    store.close().await?;
    Ok(())
}

/// Delete the saved cart from storage.
pub async fn clear() -> Result<(), CartCommandError> {
    let config = CartConfig::from_env()?;
    let storage = FileStorage::new(&config.storage_dir);

    storage.remove(&config.storage_key).await?;
    tracing::info!("Removed saved cart {}", config.storage_key);
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_cart(cart: &CartCollection) {
    if cart.is_empty() {
        println!("Cart is empty");
        return;
    }

    for item in cart {
        println!(
            "{:>4} x {:<32} {:>10} {:>10}  [{}]",
            item.quantity.get(),
            item.title,
            item.price.to_string(),
            item.line_total().to_string(),
            item.id
        );
    }
    println!(
        "{} item(s), subtotal {}",
        cart.item_count(),
        cart.subtotal()
    );
}
