//! The session store.
//!
//! Holds the current user, mirrors it to a [`KeyValueStorage`], and publishes
//! every transition to subscribers. All operations are synchronous and total:
//! storage failures are logged, never returned.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use threatmap_domain::{AuthSnapshot, DomainError, PersistedSnapshot, User, keys};
use tokio::sync::watch;
use tracing::{debug, error, warn};

use super::subscribers::{Subscribers, Subscription};
use crate::ApplicationResult;
use crate::ports::KeyValueStorage;

/// Client-side session state.
///
/// Create one per process and share it by `Arc`; nothing reaches it through
/// a global. Each transition updates memory, the persisted snapshot and the
/// watch channel atomically. Listeners are called outside the lock, so
/// callers that publish from several threads at once must serialize their
/// operations to see listener calls in transition order.
pub struct AuthStore {
    state: RwLock<AuthSnapshot>,
    storage: Option<Arc<dyn KeyValueStorage>>,
    /// Set when the snapshot middleware is active (requires storage).
    snapshot_key: Option<String>,
    subscribers: Subscribers,
    watch_tx: watch::Sender<AuthSnapshot>,
}

impl AuthStore {
    /// Creates a store over `storage` with the snapshot middleware enabled
    /// under the default key, hydrating from it.
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self::builder().storage(storage).build()
    }

    /// Creates a store with no storage attached. Persistence branches are
    /// skipped and [`AuthStore::check_auth_from_storage`] is a no-op.
    #[must_use]
    pub fn detached() -> Self {
        Self::builder().build()
    }

    /// Returns a builder for a configured store.
    #[must_use]
    pub fn builder() -> AuthStoreBuilder {
        AuthStoreBuilder::default()
    }

    /// Returns a copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> AuthSnapshot {
        self.state.read().clone()
    }

    /// Returns the signed-in user, if any.
    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.state.read().user.clone()
    }

    /// Returns true if a user is signed in.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.read().is_authenticated
    }

    /// Returns true while a sign-out is in progress.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.read().is_loading
    }

    /// Returns true if a storage surface is attached.
    #[must_use]
    pub fn has_storage(&self) -> bool {
        self.storage.is_some()
    }

    /// Signs `user` in.
    ///
    /// The user is written to storage under [`keys::USER`] before the new
    /// state is published. No validation is performed.
    pub fn sign_in(&self, user: User) {
        if let Some(storage) = &self.storage {
            match user.to_stored_json() {
                Ok(json) => {
                    if let Err(e) = storage.set(keys::USER, &json) {
                        warn!(error = %e, "failed to persist signed-in user");
                    }
                }
                Err(e) => warn!(error = %e, "failed to serialize signed-in user"),
            }
        }

        debug!(user_id = %user.id, "signed in");
        self.publish(|state| *state = AuthSnapshot::signed_in(user));
    }

    /// Signs the current user out.
    ///
    /// Publishes a loading state, clears [`keys::USER`] and
    /// [`keys::ACCESS_TOKEN`] from storage, then publishes the cleared state.
    pub fn sign_out(&self) {
        self.publish(|state| state.is_loading = true);

        if let Some(storage) = &self.storage {
            for key in [keys::USER, keys::ACCESS_TOKEN] {
                if let Err(e) = storage.remove(key) {
                    warn!(key, error = %e, "failed to clear session key");
                }
            }
        }

        debug!("signed out");
        self.publish(|state| *state = AuthSnapshot::signed_out());
    }

    /// Restores the session from the user stored under [`keys::USER`].
    ///
    /// A missing, malformed, or incomplete record leaves the store signed
    /// out. `is_loading` is not touched, and storage is only read.
    pub fn check_auth_from_storage(&self) {
        let Some(storage) = &self.storage else {
            return;
        };

        let stored = storage.get(keys::USER).unwrap_or_else(|e| {
            warn!(error = %e, "failed to read stored user");
            None
        });

        let user = stored.and_then(|text| match User::from_stored_json(&text) {
            Ok(user) => Some(user),
            Err(DomainError::MalformedUser(reason)) => {
                error!(%reason, "error parsing stored user");
                None
            }
            Err(e) => {
                debug!(error = %e, "stored user is not usable");
                None
            }
        });

        match user {
            Some(user) => {
                debug!(user_id = %user.id, "restored session from storage");
                self.publish(|state| {
                    state.user = Some(user);
                    state.is_authenticated = true;
                });
            }
            None => self.publish(|state| {
                state.user = None;
                state.is_authenticated = false;
            }),
        }
    }

    /// Removes the persisted snapshot envelope. In-memory state is unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails.
    pub fn clear_persisted_snapshot(&self) -> ApplicationResult<()> {
        if let (Some(storage), Some(key)) = (&self.storage, &self.snapshot_key) {
            storage.remove(key)?;
        }
        Ok(())
    }

    /// Registers `listener` to receive every published state.
    ///
    /// Listeners run synchronously on the calling thread, in registration
    /// order.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&AuthSnapshot) + Send + Sync + 'static,
    {
        self.subscribers.add(listener)
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.subscribers.remove(subscription)
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Returns a receiver that always holds the latest state.
    ///
    /// Transitions published in quick succession may coalesce; use
    /// [`AuthStore::subscribe`] to observe each one.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<AuthSnapshot> {
        self.watch_tx.subscribe()
    }

    /// Applies `update`, then writes the envelope and the watch channel while
    /// the state lock is still held so both always match memory. Listeners
    /// run after the lock is released.
    fn publish(&self, update: impl FnOnce(&mut AuthSnapshot)) {
        let snapshot = {
            let mut state = self.state.write();
            update(&mut *state);
            let snapshot = state.clone();
            self.persist_snapshot(&snapshot);
            self.watch_tx.send_replace(snapshot.clone());
            snapshot
        };

        self.subscribers.notify(&snapshot);
    }

    fn persist_snapshot(&self, snapshot: &AuthSnapshot) {
        let (Some(storage), Some(key)) = (&self.storage, &self.snapshot_key) else {
            return;
        };

        if let Err(e) = write_snapshot(storage.as_ref(), key, snapshot) {
            warn!(key = %key, error = %e, "failed to persist session snapshot");
        }
    }
}

impl Default for AuthStore {
    fn default() -> Self {
        Self::detached()
    }
}

impl fmt::Debug for AuthStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthStore")
            .field("state", &*self.state.read())
            .field("has_storage", &self.storage.is_some())
            .field("snapshot_key", &self.snapshot_key)
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`AuthStore`].
#[derive(Default)]
pub struct AuthStoreBuilder {
    storage: Option<Arc<dyn KeyValueStorage>>,
    persist_snapshot: Option<bool>,
    snapshot_key: Option<String>,
}

impl AuthStoreBuilder {
    /// Attaches a storage surface.
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn KeyValueStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Enables or disables the snapshot middleware. Enabled by default when
    /// storage is attached.
    #[must_use]
    pub const fn persist_snapshot(mut self, enabled: bool) -> Self {
        self.persist_snapshot = Some(enabled);
        self
    }

    /// Overrides the snapshot key (default [`keys::SNAPSHOT`]).
    #[must_use]
    pub fn snapshot_key(mut self, key: impl Into<String>) -> Self {
        self.snapshot_key = Some(key.into());
        self
    }

    /// Builds the store, hydrating from the persisted snapshot when the
    /// middleware is active. Hydration does not notify anyone.
    #[must_use]
    pub fn build(self) -> AuthStore {
        let snapshot_key = match (&self.storage, self.persist_snapshot.unwrap_or(true)) {
            (Some(_), true) => Some(
                self.snapshot_key
                    .unwrap_or_else(|| keys::SNAPSHOT.to_string()),
            ),
            _ => None,
        };

        let initial = match (&self.storage, &snapshot_key) {
            (Some(storage), Some(key)) => hydrate(storage.as_ref(), key),
            _ => AuthSnapshot::signed_out(),
        };

        let (watch_tx, _) = watch::channel(initial.clone());

        AuthStore {
            state: RwLock::new(initial),
            storage: self.storage,
            snapshot_key,
            subscribers: Subscribers::default(),
            watch_tx,
        }
    }
}

fn write_snapshot(
    storage: &dyn KeyValueStorage,
    key: &str,
    snapshot: &AuthSnapshot,
) -> ApplicationResult<()> {
    let json = PersistedSnapshot::new(snapshot.clone()).to_json()?;
    storage.set(key, &json)?;
    Ok(())
}

fn hydrate(storage: &dyn KeyValueStorage, key: &str) -> AuthSnapshot {
    let text = match storage.get(key) {
        Ok(Some(text)) => text,
        Ok(None) => return AuthSnapshot::signed_out(),
        Err(e) => {
            warn!(key, error = %e, "failed to read session snapshot");
            return AuthSnapshot::signed_out();
        }
    };

    match PersistedSnapshot::from_json(&text) {
        Ok(snapshot) => {
            debug!(key, authenticated = snapshot.is_authenticated, "hydrated session snapshot");
            snapshot
        }
        Err(e) => {
            warn!(key, error = %e, "ignoring persisted session snapshot");
            AuthSnapshot::signed_out()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::ports::StorageError;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MockStorage {
        entries: Mutex<HashMap<String, String>>,
        writes: Mutex<Vec<String>>,
        failing: bool,
    }

    impl MockStorage {
        fn failing() -> Self {
            Self {
                failing: true,
                ..Self::default()
            }
        }

        fn with_entry(key: &str, value: &str) -> Self {
            let storage = Self::default();
            storage
                .entries
                .lock()
                .insert(key.to_string(), value.to_string());
            storage
        }

        fn entry(&self, key: &str) -> Option<String> {
            self.entries.lock().get(key).cloned()
        }

        fn writes_to(&self, key: &str) -> usize {
            self.writes.lock().iter().filter(|k| *k == key).count()
        }

        fn check(&self) -> Result<(), StorageError> {
            if self.failing {
                Err(StorageError::Unavailable("quota exceeded".to_string()))
            } else {
                Ok(())
            }
        }
    }

    impl KeyValueStorage for MockStorage {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.check()?;
            Ok(self.entry(key))
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.check()?;
            self.writes.lock().push(key.to_string());
            self.entries
                .lock()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.check()?;
            self.entries.lock().remove(key);
            Ok(())
        }
    }

    fn ann() -> User {
        User::new("u-1", "Ann", "ann@example.com")
    }

    fn store_over(storage: &Arc<MockStorage>) -> AuthStore {
        AuthStore::new(Arc::clone(storage) as Arc<dyn KeyValueStorage>)
    }

    fn record(store: &AuthStore) -> Arc<Mutex<Vec<AuthSnapshot>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.subscribe(move |snapshot| sink.lock().push(snapshot.clone()));
        seen
    }

    #[test]
    fn test_initial_state() {
        let store = AuthStore::detached();
        assert_eq!(store.snapshot(), AuthSnapshot::signed_out());
        assert!(!store.has_storage());
    }

    #[test]
    fn test_sign_in_sets_state_and_persists_user() {
        let storage = Arc::new(MockStorage::default());
        let store = store_over(&storage);

        store.sign_in(ann());

        assert_eq!(store.snapshot(), AuthSnapshot::signed_in(ann()));
        assert_eq!(
            storage.entry(keys::USER).as_deref(),
            Some(r#"{"id":"u-1","name":"Ann","email":"ann@example.com"}"#)
        );
    }

    #[test]
    fn test_sign_in_without_storage() {
        let store = AuthStore::detached();
        store.sign_in(ann());

        assert_eq!(store.user(), Some(ann()));
        assert!(store.is_authenticated());
        assert!(!store.is_loading());
    }

    #[test]
    fn test_sign_in_does_not_validate() {
        let store = AuthStore::detached();
        store.sign_in(User::new("", "", ""));
        assert!(store.is_authenticated());
    }

    #[test]
    fn test_sign_in_survives_storage_failure() {
        let store = AuthStore::new(Arc::new(MockStorage::failing()));
        store.sign_in(ann());
        assert_eq!(store.snapshot(), AuthSnapshot::signed_in(ann()));
    }

    #[test]
    fn test_sign_out_clears_state_and_keys() {
        let storage = Arc::new(MockStorage::with_entry(keys::ACCESS_TOKEN, "tok-123"));
        let store = store_over(&storage);
        store.sign_in(ann());

        store.sign_out();

        assert_eq!(store.snapshot(), AuthSnapshot::signed_out());
        assert_eq!(storage.entry(keys::USER), None);
        assert_eq!(storage.entry(keys::ACCESS_TOKEN), None);
    }

    #[test]
    fn test_sign_out_publishes_loading_then_cleared() {
        let store = AuthStore::detached();
        store.sign_in(ann());
        let seen = record(&store);

        store.sign_out();

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen[0],
            AuthSnapshot {
                user: Some(ann()),
                is_authenticated: true,
                is_loading: true,
            }
        );
        assert_eq!(seen[1], AuthSnapshot::signed_out());
    }

    #[test]
    fn test_sign_out_when_signed_out() {
        let storage = Arc::new(MockStorage::default());
        let store = store_over(&storage);

        store.sign_out();

        assert_eq!(store.snapshot(), AuthSnapshot::signed_out());
        assert_eq!(storage.entry(keys::USER), None);
    }

    #[test]
    fn test_sign_out_survives_storage_failure() {
        let store = AuthStore::new(Arc::new(MockStorage::failing()));
        store.sign_in(ann());
        store.sign_out();
        assert_eq!(store.snapshot(), AuthSnapshot::signed_out());
    }

    #[test]
    fn test_check_auth_restores_valid_user() {
        let storage = Arc::new(MockStorage::default());
        store_over(&storage).sign_in(ann());

        let reloaded = AuthStore::builder()
            .storage(Arc::clone(&storage) as Arc<dyn KeyValueStorage>)
            .persist_snapshot(false)
            .build();
        assert!(!reloaded.is_authenticated());

        reloaded.check_auth_from_storage();
        assert_eq!(reloaded.snapshot(), AuthSnapshot::signed_in(ann()));
    }

    #[test]
    fn test_check_auth_without_entry() {
        let store = AuthStore::new(Arc::new(MockStorage::default()));
        store.check_auth_from_storage();
        assert_eq!(store.snapshot(), AuthSnapshot::signed_out());
    }

    #[test]
    fn test_check_auth_malformed_json() {
        let storage = Arc::new(MockStorage::with_entry(keys::USER, "{not valid json"));
        let store = store_over(&storage);

        store.check_auth_from_storage();

        assert_eq!(store.user(), None);
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_check_auth_rejects_array_record() {
        let storage = Arc::new(MockStorage::with_entry(
            keys::USER,
            r#"["u-1","Ann","ann@example.com"]"#,
        ));
        let store = store_over(&storage);

        store.check_auth_from_storage();

        assert_eq!(store.snapshot(), AuthSnapshot::signed_out());
    }

    #[test]
    fn test_concurrent_publishes_keep_snapshot_in_sync() {
        let storage = Arc::new(MockStorage::default());
        let store = Arc::new(store_over(&storage));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        if i % 2 == 0 {
                            store.sign_in(ann());
                        } else {
                            store.sign_out();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stored = storage.entry(keys::SNAPSHOT).unwrap();
        assert_eq!(PersistedSnapshot::from_json(&stored).unwrap(), store.snapshot());
        assert_eq!(*store.watch().borrow(), store.snapshot());
    }

    #[test]
    fn test_check_auth_missing_required_fields() {
        let storage = Arc::new(MockStorage::with_entry(keys::USER, r#"{"name":"Ann"}"#));
        let store = store_over(&storage);

        store.check_auth_from_storage();

        assert_eq!(store.user(), None);
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_check_auth_clears_previous_session() {
        let store = AuthStore::new(Arc::new(MockStorage::default()));
        store.sign_in(ann());

        // drop the stored user behind the store's back
        store.storage.as_ref().unwrap().remove(keys::USER).unwrap();
        store.check_auth_from_storage();

        assert_eq!(store.snapshot(), AuthSnapshot::signed_out());
    }

    #[test]
    fn test_check_auth_is_idempotent() {
        let storage = Arc::new(MockStorage::default());
        let store = store_over(&storage);
        store.sign_in(ann());

        store.check_auth_from_storage();
        let first = store.snapshot();
        store.check_auth_from_storage();

        assert_eq!(store.snapshot(), first);
    }

    #[test]
    fn test_check_auth_never_writes_user_key() {
        let storage = Arc::new(MockStorage::default());
        store_over(&storage).sign_in(ann());
        assert_eq!(storage.writes_to(keys::USER), 1);

        store_over(&storage).check_auth_from_storage();
        assert_eq!(storage.writes_to(keys::USER), 1);
    }

    #[test]
    fn test_check_auth_leaves_loading_untouched() {
        let json = r#"{"state":{"user":null,"isAuthenticated":false,"isLoading":true},"version":0}"#;
        let storage = Arc::new(MockStorage::with_entry(keys::SNAPSHOT, json));
        let store = store_over(&storage);
        assert!(store.is_loading());

        store.check_auth_from_storage();

        assert!(store.is_loading());
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_check_auth_without_storage_is_noop() {
        let store = AuthStore::detached();
        store.sign_in(ann());
        let seen = record(&store);

        store.check_auth_from_storage();

        assert_eq!(store.snapshot(), AuthSnapshot::signed_in(ann()));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_check_auth_storage_read_failure() {
        let store = AuthStore::new(Arc::new(MockStorage::failing()));
        store.sign_in(ann());

        store.check_auth_from_storage();

        assert_eq!(store.snapshot(), AuthSnapshot::signed_out());
    }

    #[test]
    fn test_snapshot_middleware_hydrates_new_store() {
        let storage = Arc::new(MockStorage::default());
        store_over(&storage).sign_in(ann());

        let reloaded = store_over(&storage);
        assert_eq!(reloaded.snapshot(), AuthSnapshot::signed_in(ann()));
    }

    #[test]
    fn test_snapshot_middleware_tracks_sign_out() {
        let storage = Arc::new(MockStorage::default());
        let store = store_over(&storage);
        store.sign_in(ann());
        store.sign_out();

        let stored = storage.entry(keys::SNAPSHOT).unwrap();
        assert_eq!(
            PersistedSnapshot::from_json(&stored).unwrap(),
            AuthSnapshot::signed_out()
        );
    }

    #[test]
    fn test_snapshot_middleware_disabled() {
        let storage = Arc::new(MockStorage::default());
        let store = AuthStore::builder()
            .storage(Arc::clone(&storage) as Arc<dyn KeyValueStorage>)
            .persist_snapshot(false)
            .build();

        store.sign_in(ann());

        assert_eq!(storage.entry(keys::SNAPSHOT), None);
        assert!(storage.entry(keys::USER).is_some());
    }

    #[test]
    fn test_snapshot_custom_key() {
        let storage = Arc::new(MockStorage::default());
        let store = AuthStore::builder()
            .storage(Arc::clone(&storage) as Arc<dyn KeyValueStorage>)
            .snapshot_key("custom-auth")
            .build();

        store.sign_in(ann());

        assert!(storage.entry("custom-auth").is_some());
        assert_eq!(storage.entry(keys::SNAPSHOT), None);
    }

    #[test]
    fn test_malformed_snapshot_is_ignored() {
        let storage = Arc::new(MockStorage::with_entry(keys::SNAPSHOT, "garbage"));
        let store = store_over(&storage);
        assert_eq!(store.snapshot(), AuthSnapshot::signed_out());
    }

    #[test]
    fn test_clear_persisted_snapshot() {
        let storage = Arc::new(MockStorage::default());
        let store = store_over(&storage);
        store.sign_in(ann());
        assert!(storage.entry(keys::SNAPSHOT).is_some());

        store.clear_persisted_snapshot().unwrap();

        assert_eq!(storage.entry(keys::SNAPSHOT), None);
        assert!(store.is_authenticated());
    }

    #[test]
    fn test_clear_persisted_snapshot_reports_failure() {
        let store = AuthStore::new(Arc::new(MockStorage::failing()));
        assert!(store.clear_persisted_snapshot().is_err());
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let store = AuthStore::detached();
        let seen = Arc::new(Mutex::new(0_usize));
        let sink = Arc::clone(&seen);
        let subscription = store.subscribe(move |_| *sink.lock() += 1);

        store.sign_in(ann());
        assert!(store.unsubscribe(subscription));
        store.sign_out();

        assert_eq!(*seen.lock(), 1);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_watch_receives_latest_state() {
        let store = AuthStore::detached();
        let mut rx = store.watch();
        assert_eq!(*rx.borrow(), AuthSnapshot::signed_out());

        store.sign_in(ann());

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), AuthSnapshot::signed_in(ann()));
    }
}
