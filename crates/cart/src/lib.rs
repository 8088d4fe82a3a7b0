//! Marketplace cart - a write-through shopping cart store.
//!
//! The cart is an ordered list of line items keyed by product id. Consumers
//! read snapshots of it and change it through three operations: add to cart,
//! increment and decrement. Every change is written back, as a whole, to a
//! single key in durable storage so the cart survives restarts.
//!
//! # Modules
//!
//! - [`item`] - Cart line items and candidate items
//! - [`collection`] - The ordered item collection and its reducer
//! - [`storage`] - Storage trait with memory and file backends
//! - [`store`] - The cart store and its load/save lifecycle
//! - [`provider`] - Container that hands the store to consumers
//! - [`config`] - Environment-driven configuration
//! - [`error`] - Error types

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod collection;
pub mod config;
pub mod error;
pub mod item;
mod persist;
pub mod provider;
pub mod storage;
pub mod store;

pub use collection::CartCollection;
pub use config::{CartConfig, ConfigError};
pub use error::{CartError, PersistError, Result, StorageError};
pub use item::{CartItem, NewCartItem};
pub use persist::{CartState, PersistStatus};
pub use provider::CartProvider;
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use store::CartStore;
