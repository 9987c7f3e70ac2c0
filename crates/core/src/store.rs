//! Shared session store
//!
//! The store is the single source of truth for the current tokens. It is
//! handed to collaborators by cloning the handle; all mutation goes through
//! [`SessionStore::dispatch`], which reduces the action, persists the result
//! and then runs the registered middleware with the new state.

use crate::clock::{Clock, SystemClock};
use crate::persist::{Storage, load_session, save_session};
use crate::session::{SessionAction, SessionState};
use crate::{MemoryStorage, Result};
use chrono::{DateTime, Utc};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// Hook run after every state transition
pub trait SessionMiddleware: Send + Sync {
    fn after_dispatch(&self, store: &SessionStore, state: &SessionState);
}

struct Inner {
    state: RwLock<SessionState>,
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    middleware: RwLock<Vec<Arc<dyn SessionMiddleware>>>,
}

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Arc::new(MemoryStorage::new()), Arc::new(SystemClock))
    }
}

impl SessionStore {
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(SessionState::default()),
                storage,
                clock,
                middleware: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Register a hook that runs after each transition
    pub fn add_middleware(&self, middleware: Arc<dyn SessionMiddleware>) {
        self.inner
            .middleware
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(middleware);
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    pub fn snapshot(&self) -> SessionState {
        self.read(Clone::clone)
    }

    pub fn access_token(&self) -> Option<String> {
        self.read(|s| s.access_token().map(str::to_string))
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read(|s| s.refresh_token().map(str::to_string))
    }

    pub fn is_authenticated(&self) -> bool {
        self.read(|s| s.is_authenticated)
    }

    fn read<T>(&self, f: impl FnOnce(&SessionState) -> T) -> T {
        f(&*self.inner.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Apply an action and return the resulting state
    pub fn dispatch(&self, action: SessionAction) -> SessionState {
        self.dispatch_if(action, |_| true)
            .unwrap_or_else(|| self.snapshot())
    }

    /// Apply an action only if `guard` accepts the current state.
    ///
    /// The check, the transition and the write to storage happen under one
    /// write lock, so two callers racing on the same condition cannot both
    /// win and storage never ends up behind memory.
    pub fn dispatch_if(
        &self,
        action: SessionAction,
        guard: impl FnOnce(&SessionState) -> bool,
    ) -> Option<SessionState> {
        let name = action.name();
        let next = {
            let mut state = self
                .inner
                .state
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if !guard(&*state) {
                return None;
            }
            let next = state.clone().reduce(action, self.now());
            if let Err(e) = save_session(self.inner.storage.as_ref(), &next) {
                warn!(action = name, "Failed to persist session: {e}");
            }
            *state = next.clone();
            next
        };
        debug!(action = name, authenticated = next.is_authenticated, "Session transition");

        let middleware = self
            .inner
            .middleware
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for hook in middleware {
            hook.after_dispatch(self, &next);
        }

        Some(next)
    }

    /// Load the persisted session, if any. Returns whether a session is active
    /// once middleware has run (an expired session is cleared straight away).
    pub fn restore(&self) -> Result<bool> {
        if let Some(stored) = load_session(self.inner.storage.as_ref())? {
            self.dispatch(SessionAction::Restored(stored));
        }
        Ok(self.is_authenticated())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::persist::{ROOT_KEY, load_session};
    use crate::types::{AuthUser, LoginResponse, TokenPair};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Storage whose writes of an authenticated slice take a while
    #[derive(Default)]
    struct SlowStorage(MemoryStorage);

    impl Storage for SlowStorage {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.0.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            if value.contains("\"isAuthenticated\":true") {
                std::thread::sleep(Duration::from_millis(200));
            }
            self.0.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<()> {
            self.0.remove(key)
        }
    }

    fn login_response() -> LoginResponse {
        LoginResponse {
            user: AuthUser {
                id: "u1".to_string(),
                email: "ada@example.com".to_string(),
                name: "Ada".to_string(),
                roles: None,
            },
            tokens: TokenPair {
                access_token: "access".to_string(),
                refresh_token: "refresh".to_string(),
                access_token_expires_in: 900,
                refresh_token_expires_in: 3600,
            },
        }
    }

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl SessionMiddleware for Counter {
        fn after_dispatch(&self, _store: &SessionStore, _state: &SessionState) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_dispatch_persists_and_runs_middleware() {
        let storage = Arc::new(MemoryStorage::new());
        let store = SessionStore::new(storage.clone(), Arc::new(ManualClock::default()));
        let counter = Arc::new(Counter::default());
        store.add_middleware(counter.clone());

        store.dispatch(SessionAction::LoggedIn(login_response()));

        assert_eq!(store.access_token().as_deref(), Some("access"));
        assert_eq!(store.refresh_token().as_deref(), Some("refresh"));
        assert!(storage.get(ROOT_KEY).unwrap().is_some());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_if_rejected_is_silent() {
        let store = SessionStore::default();
        let counter = Arc::new(Counter::default());
        store.add_middleware(counter.clone());

        let result = store.dispatch_if(SessionAction::Cleared, |s| s.is_authenticated);

        assert!(result.is_none());
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_restore_round_trip() {
        let storage = Arc::new(MemoryStorage::new());
        let clock = Arc::new(ManualClock::default());

        let first = SessionStore::new(storage.clone(), clock.clone());
        first.dispatch(SessionAction::LoggedIn(login_response()));

        let second = SessionStore::new(storage, clock);
        assert!(second.restore().unwrap());
        assert_eq!(second.access_token().as_deref(), Some("access"));
    }

    #[test]
    fn test_logout_during_slow_write_is_what_gets_persisted() {
        let storage = Arc::new(SlowStorage::default());
        let store = SessionStore::new(storage.clone(), Arc::new(ManualClock::default()));

        let login = {
            let store = store.clone();
            std::thread::spawn(move || {
                store.dispatch(SessionAction::LoggedIn(login_response()));
            })
        };
        std::thread::sleep(Duration::from_millis(50));
        store.dispatch(SessionAction::Cleared);
        login.join().unwrap();

        let persisted = load_session(storage.as_ref()).unwrap().unwrap();
        assert_eq!(persisted, store.snapshot());
        assert!(!persisted.is_authenticated);

        let reopened = SessionStore::new(storage, Arc::new(ManualClock::default()));
        assert!(!reopened.restore().unwrap());
    }

    #[test]
    fn test_restore_with_empty_storage() {
        let store = SessionStore::default();
        assert!(!store.restore().unwrap());
        assert_eq!(store.snapshot(), SessionState::default());
    }
}
