//! Write-through persistence of cart snapshots.
//!
//! A single background task owns every write to storage. It watches the
//! store's snapshot channel and always writes the newest snapshot, so at most
//! one save is in flight and revisions produced while a save is running are
//! folded into the next one. The final persisted value therefore always
//! matches the last mutation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info_span, warn};

use crate::collection::CartCollection;
use crate::config::CartConfig;
use crate::error::PersistError;
use crate::storage::Storage;

/// Upper bound for the delay between two save attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// The store's current state as seen by observers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartState {
    /// Increases by one on every change, starting at zero for the empty cart.
    pub revision: u64,
    /// Items at this revision.
    pub items: CartCollection,
}

/// Progress of the persister.
#[derive(Debug, Clone, Default)]
pub struct PersistStatus {
    /// Newest revision the persister has finished with, successfully or not.
    pub handled_revision: u64,
    /// Failure of the newest handled revision, if it could not be written.
    pub last_error: Option<PersistError>,
}

enum SaveOutcome {
    Saved,
    Superseded,
    Failed(PersistError),
}

/// Writes cart snapshots to a single storage key.
pub(crate) struct Persister {
    storage: Arc<dyn Storage>,
    key: String,
    retries: u32,
    backoff: Duration,
}

impl Persister {
    pub(crate) fn new(storage: Arc<dyn Storage>, config: &CartConfig) -> Self {
        Self {
            storage,
            key: config.storage_key.clone(),
            retries: config.save_retries,
            backoff: config.save_backoff,
        }
    }

    /// Run until the snapshot sender is dropped, reporting progress on
    /// `status`.
    pub(crate) fn spawn(
        self,
        mut snapshots: watch::Receiver<CartState>,
        status: watch::Sender<PersistStatus>,
    ) -> JoinHandle<()> {
        let span = info_span!("cart_persister", key = %self.key);
        tokio::spawn(
            async move {
                debug!("Persister started");

                while snapshots.changed().await.is_ok() {
                    let state = snapshots.borrow_and_update().clone();

                    match self.save(&state, &snapshots).await {
                        SaveOutcome::Saved => {
                            debug!(revision = state.revision, items = state.items.len(), "Saved cart");
                            status.send_modify(|s| {
                                s.handled_revision = state.revision;
                                s.last_error = None;
                            });
                        }
                        SaveOutcome::Superseded => {
                            debug!(revision = state.revision, "Skipping superseded cart revision");
                        }
                        SaveOutcome::Failed(err) => {
                            error!(revision = state.revision, error = %err, "Giving up on saving cart");
                            status.send_modify(|s| {
                                s.handled_revision = state.revision;
                                s.last_error = Some(err);
                            });
                        }
                    }
                }

                debug!("Persister stopped");
            }
            .instrument(span),
        )
    }

    /// Write one snapshot, retrying with exponential backoff.
    ///
    /// Retries stop early once a newer snapshot is waiting, since that one
    /// replaces this write anyway.
    async fn save(&self, state: &CartState, snapshots: &watch::Receiver<CartState>) -> SaveOutcome {
        let bytes = match serde_json::to_vec(&state.items) {
            Ok(bytes) => bytes,
            Err(e) => return SaveOutcome::Failed(PersistError::Encode(e.to_string())),
        };

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let Err(err) = self.storage.set(&self.key, &bytes).await else {
                return SaveOutcome::Saved;
            };

            if attempt > self.retries {
                return SaveOutcome::Failed(PersistError::Storage {
                    revision: state.revision,
                    attempts: attempt,
                    source: err,
                });
            }

            warn!(
                revision = state.revision,
                attempt,
                error = %err,
                "Failed to save cart, retrying"
            );

            tokio::time::sleep(self.backoff_for(attempt)).await;

            if snapshots.has_changed().unwrap_or(false) {
                return SaveOutcome::Superseded;
            }
        }
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << (attempt - 1).min(10);
        self.backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use marketplace_core::Price;
    use tokio::sync::Notify;

    use super::*;
    use crate::error::StorageError;
    use crate::item::NewCartItem;
    use crate::storage::MemoryStorage;

    /// Storage whose first `failures` writes fail.
    struct FlakyStorage {
        inner: MemoryStorage,
        failures: AtomicU32,
        writes: AtomicU32,
        failed: Notify,
    }

    impl FlakyStorage {
        fn new(failures: u32) -> Self {
            Self {
                inner: MemoryStorage::new(),
                failures: AtomicU32::new(failures),
                writes: AtomicU32::new(0),
                failed: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl Storage for FlakyStorage {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                self.failed.notify_one();
                return Err(StorageError::Unavailable("flaky".to_string()));
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key).await
        }
    }

    fn config(retries: u32) -> CartConfig {
        CartConfig::default()
            .with_storage_key("cart")
            .with_retries(retries, Duration::from_millis(1))
    }

    fn state(revision: u64, ids: &[&str]) -> CartState {
        let mut items = CartCollection::new();
        for id in ids {
            items.add(NewCartItem::new(*id, "T", "u", Price::from_cents(100)));
        }
        CartState { revision, items }
    }

    async fn wait_handled(status: &mut watch::Receiver<PersistStatus>, revision: u64) -> PersistStatus {
        status
            .wait_for(|s| s.handled_revision >= revision)
            .await
            .unwrap()
            .clone()
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let persister = Persister::new(
            Arc::new(MemoryStorage::new()),
            &config(3).with_retries(3, Duration::from_millis(100)),
        );
        assert_eq!(persister.backoff_for(1), Duration::from_millis(100));
        assert_eq!(persister.backoff_for(2), Duration::from_millis(200));
        assert_eq!(persister.backoff_for(3), Duration::from_millis(400));
        assert_eq!(persister.backoff_for(30), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn test_saves_latest_snapshot() {
        let storage = Arc::new(MemoryStorage::new());
        let (tx, rx) = watch::channel(CartState::default());
        let (status_tx, mut status_rx) = watch::channel(PersistStatus::default());
        Persister::new(storage.clone(), &config(0)).spawn(rx, status_tx);

        for revision in 1..=20 {
            let ids: &[&str] = if revision % 2 == 0 { &["a"] } else { &["a", "b"] };
            tx.send_replace(state(revision, ids));
        }
        tx.send_replace(state(21, &["z"]));

        let status = wait_handled(&mut status_rx, 21).await;
        assert!(status.last_error.is_none());

        let stored = storage.get("cart").await.unwrap().unwrap();
        let items: CartCollection = serde_json::from_slice(&stored).unwrap();
        assert_eq!(items, state(21, &["z"]).items);
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let storage = Arc::new(FlakyStorage::new(2));
        let (tx, rx) = watch::channel(CartState::default());
        let (status_tx, mut status_rx) = watch::channel(PersistStatus::default());
        Persister::new(storage.clone(), &config(3)).spawn(rx, status_tx);

        tx.send_replace(state(1, &["a"]));

        let status = wait_handled(&mut status_rx, 1).await;
        assert!(status.last_error.is_none());
        assert_eq!(storage.writes.load(Ordering::SeqCst), 3);
        assert!(storage.get("cart").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reports_exhausted_retries() {
        let storage = Arc::new(FlakyStorage::new(u32::MAX));
        let (tx, rx) = watch::channel(CartState::default());
        let (status_tx, mut status_rx) = watch::channel(PersistStatus::default());
        Persister::new(storage.clone(), &config(1)).spawn(rx, status_tx);

        tx.send_replace(state(1, &["a"]));

        let status = wait_handled(&mut status_rx, 1).await;
        assert!(matches!(
            status.last_error,
            Some(PersistError::Storage {
                revision: 1,
                attempts: 2,
                ..
            })
        ));
        assert_eq!(storage.writes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_newer_revision_replaces_failing_save() {
        let storage = Arc::new(FlakyStorage::new(1));
        let (tx, rx) = watch::channel(CartState::default());
        let (status_tx, mut status_rx) = watch::channel(PersistStatus::default());
        let config = config(3).with_retries(3, Duration::from_millis(50));
        Persister::new(storage.clone(), &config).spawn(rx, status_tx);

        tx.send_replace(state(1, &["a"]));
        storage.failed.notified().await;
        tx.send_replace(state(2, &["b"]));

        let status = wait_handled(&mut status_rx, 2).await;
        assert_eq!(status.handled_revision, 2);
        assert!(status.last_error.is_none());

        // Revision 1 was dropped after its first failure instead of retried
        assert_eq!(storage.writes.load(Ordering::SeqCst), 2);
        let stored = storage.get("cart").await.unwrap().unwrap();
        let items: CartCollection = serde_json::from_slice(&stored).unwrap();
        assert_eq!(items, state(2, &["b"]).items);
    }

    #[tokio::test]
    async fn test_stops_when_sender_dropped() {
        let storage = Arc::new(MemoryStorage::new());
        let (tx, rx) = watch::channel(CartState::default());
        let (status_tx, _status_rx) = watch::channel(PersistStatus::default());
        let handle = Persister::new(storage.clone(), &config(0)).spawn(rx, status_tx);

        tx.send_replace(state(1, &["a"]));
        drop(tx);

        handle.await.unwrap();
        assert!(storage.get("cart").await.unwrap().is_some());
    }
}
