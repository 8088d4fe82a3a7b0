//! The cart store: in-memory cart state kept in sync with durable storage.
//!
//! # Lifecycle
//!
//! 1. [`CartStore::new`] creates an empty store and starts two background
//!    tasks: the initial load from storage and the persister.
//! 2. The load replaces the empty cart with the stored one. A missing,
//!    unreadable or corrupt value leaves the cart empty and is only logged.
//! 3. Mutators wait for the load to finish before applying, so a change made
//!    while loading lands on top of the stored cart instead of being replaced
//!    by it.
//! 4. Every applied mutation publishes a new revision; the persister writes
//!    the newest revision back under the configured key.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use marketplace_cart::{CartConfig, CartStore, MemoryStorage, NewCartItem};
//! use marketplace_core::Price;
//!
//! # async fn run() -> marketplace_cart::Result<()> {
//! let store = CartStore::open(Arc::new(MemoryStorage::new()), &CartConfig::default()).await;
//!
//! store
//!     .add_to_cart(NewCartItem::new("tee-1", "T-shirt", "https://cdn/tee.png", Price::from_cents(1999)))
//!     .await?;
//! store.increment(&"tee-1".into()).await?;
//!
//! assert_eq!(store.snapshot().item_count(), 2);
//! store.close().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use marketplace_core::ProductId;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, info, instrument, warn};

use crate::collection::CartCollection;
use crate::config::CartConfig;
use crate::error::{CartError, PersistError, Result};
use crate::item::NewCartItem;
use crate::persist::{CartState, PersistStatus, Persister};
use crate::storage::Storage;

/// Where the store is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Loading,
    Ready,
    Closed,
}

/// Handle to the cart store.
///
/// Cheap to clone; all clones share the same cart. Must be created inside a
/// tokio runtime.
#[derive(Clone)]
pub struct CartStore {
    inner: Arc<CartStoreInner>,
}

struct CartStoreInner {
    key: String,
    storage: Arc<dyn Storage>,
    state: watch::Sender<CartState>,
    phase: watch::Sender<Phase>,
    status: watch::Receiver<PersistStatus>,
    persister: AbortHandle,
}

impl std::fmt::Debug for CartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("CartStore")
            .field("key", &self.inner.key)
            .field("phase", &*self.inner.phase.borrow())
            .field("revision", &state.revision)
            .field("items", &state.items.len())
            .finish_non_exhaustive()
    }
}

impl CartStore {
    /// Create a store and start loading the saved cart in the background.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, config: &CartConfig) -> Self {
        let (state, snapshots) = watch::channel(CartState::default());
        let (status_tx, status) = watch::channel(PersistStatus::default());
        let (phase, _) = watch::channel(Phase::Loading);

        let persister = Persister::new(Arc::clone(&storage), config)
            .spawn(snapshots, status_tx)
            .abort_handle();

        let store = Self {
            inner: Arc::new(CartStoreInner {
                key: config.storage_key.clone(),
                storage,
                state,
                phase,
                status,
                persister,
            }),
        };

        let loader = store.clone();
        tokio::spawn(async move { loader.load().await });

        store
    }

    /// Create a store and wait until the saved cart has been loaded.
    pub async fn open(storage: Arc<dyn Storage>, config: &CartConfig) -> Self {
        let store = Self::new(storage, config);
        // A fresh store cannot be closed yet, so this only waits for the load.
        let _ = store.loaded().await;
        store
    }

    #[instrument(skip(self), fields(key = %self.inner.key))]
    async fn load(&self) {
        match self.inner.storage.get(&self.inner.key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<CartCollection>(&bytes) {
                Ok(items) => {
                    info!(items = items.len(), "Loaded saved cart");
                    self.inner.state.send_modify(|state| {
                        state.revision += 1;
                        state.items = items;
                    });
                }
                Err(e) => warn!(error = %e, "Saved cart is corrupt, starting empty"),
            },
            Ok(None) => debug!("No saved cart"),
            Err(e) => warn!(error = %e, "Failed to read saved cart, starting empty"),
        }

        self.inner.phase.send_if_modified(|phase| {
            if *phase == Phase::Loading {
                *phase = Phase::Ready;
                true
            } else {
                false
            }
        });
    }

    /// Wait for the initial load to finish.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Closed`] if the store has been closed.
    pub async fn loaded(&self) -> Result<()> {
        let mut phase = self.inner.phase.subscribe();
        let current = *phase
            .wait_for(|p| *p != Phase::Loading)
            .await
            .map_err(|_| CartError::Closed)?;

        match current {
            Phase::Closed => Err(CartError::Closed),
            Phase::Loading | Phase::Ready => Ok(()),
        }
    }

    /// Whether the initial load has finished.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        *self.inner.phase.borrow() != Phase::Loading
    }

    /// Put one unit of `item` in the cart.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Closed`] if the store has been closed.
    #[instrument(skip(self, item), fields(id = %item.id))]
    pub async fn add_to_cart(&self, item: NewCartItem) -> Result<()> {
        self.loaded().await?;
        self.apply(|items| {
            items.add(item);
            true
        })?;
        Ok(())
    }

    /// Add one unit to an item already in the cart. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Closed`] if the store has been closed.
    #[instrument(skip(self))]
    pub async fn increment(&self, id: &ProductId) -> Result<()> {
        self.loaded().await?;
        if !self.apply(|items| items.increment(id))? {
            debug!("Increment ignored, item not in cart");
        }
        Ok(())
    }

    /// Remove one unit of an item, dropping it from the cart at zero.
    /// Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Closed`] if the store has been closed.
    #[instrument(skip(self))]
    pub async fn decrement(&self, id: &ProductId) -> Result<()> {
        self.loaded().await?;
        if !self.apply(|items| items.decrement(id))? {
            debug!("Decrement ignored, item not in cart");
        }
        Ok(())
    }

    /// Apply `op` to the cart and publish the result as a new revision.
    ///
    /// The result is published even when `op` changed nothing, so every call
    /// is followed by a save. The phase is checked under the state lock, so
    /// once [`close`](Self::close) has marked the store closed no further
    /// revision can appear.
    fn apply(&self, op: impl FnOnce(&mut CartCollection) -> bool) -> Result<bool> {
        let mut outcome = Err(CartError::Closed);
        self.inner.state.send_if_modified(|state| {
            if *self.inner.phase.borrow() == Phase::Closed {
                return false;
            }
            outcome = Ok(op(&mut state.items));
            state.revision += 1;
            debug!(revision = state.revision, items = state.items.len(), "Cart updated");
            true
        });
        outcome
    }

    /// Current cart contents.
    #[must_use]
    pub fn snapshot(&self) -> CartCollection {
        self.inner.state.borrow().items.clone()
    }

    /// Current revision. Starts at zero and grows with every change.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.inner.state.borrow().revision
    }

    /// Observe every change to the cart.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartState> {
        self.inner.state.subscribe()
    }

    /// The error from the most recent save, if it failed.
    #[must_use]
    pub fn last_save_error(&self) -> Option<PersistError> {
        self.inner.status.borrow().last_error.clone()
    }

    /// Wait until the current revision has been written to storage.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Persist`] if the newest handled revision could not
    /// be saved, or [`CartError::Closed`] if the persister has stopped.
    pub async fn flush(&self) -> Result<()> {
        let target = self.revision();
        let mut status = self.inner.status.clone();
        let last_error = status
            .wait_for(|s| s.handled_revision >= target)
            .await
            .map_err(|_| CartError::Closed)?
            .last_error
            .clone();

        last_error.map_or(Ok(()), |err| Err(err.into()))
    }

    /// Stop accepting changes, flush the final state and stop the store.
    ///
    /// Mutations on any clone of this store fail with [`CartError::Closed`]
    /// from the moment `close` is called, including while the final flush is
    /// still running.
    ///
    /// # Errors
    ///
    /// Returns the flush error if the final state could not be saved.
    pub async fn close(&self) -> Result<()> {
        // Let a pending load finish so its result is flushed too.
        self.loaded().await?;

        self.inner.phase.send_replace(Phase::Closed);
        let flushed = self.flush().await;
        self.inner.persister.abort();
        info!(key = %self.inner.key, "Cart store closed");

        flushed
    }
}
