//! Marketplace Core - Shared types library.
//!
//! This crate provides common types used across all Marketplace components:
//! - `cart` - The cart store and its storage collaborators
//! - `cli` - Command-line access to a locally persisted cart
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no storage access, no async
//! runtime. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for product IDs, prices and quantities

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
