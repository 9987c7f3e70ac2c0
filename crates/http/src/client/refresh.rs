//! Single-flight access token refresh
//!
//! The coordinator is either idle or refreshing. The first caller that needs
//! a new token while idle becomes the leader and performs the network call;
//! everyone arriving while a refresh is in flight queues a waiter and is
//! woken, in arrival order, with the leader's outcome.

use super::error::ClientError;
use agentic_core::{SessionAction, SessionStore, SessionSupervisor, TokenPair};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

type Outcome = Result<String, String>;

enum Phase {
    Idle,
    Refreshing { waiters: VecDeque<oneshot::Sender<Outcome>> },
}

enum Role {
    Done(Result<String, ClientError>),
    Leader(String),
    Waiter(oneshot::Receiver<Outcome>),
}

pub struct RefreshCoordinator {
    store: SessionStore,
    supervisor: Arc<SessionSupervisor>,
    // Only held for flag flips and queue pushes, never across an await.
    phase: Mutex<Phase>,
    refreshes: AtomicUsize,
}

impl RefreshCoordinator {
    pub fn new(store: SessionStore, supervisor: Arc<SessionSupervisor>) -> Self {
        Self {
            store,
            supervisor,
            phase: Mutex::new(Phase::Idle),
            refreshes: AtomicUsize::new(0),
        }
    }

    /// Number of refresh calls that went out over the network
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock(), Phase::Refreshing { .. })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Obtain an access token newer than `stale`.
    ///
    /// `fetch` exchanges a refresh token for a new pair and is only invoked by
    /// the leader. If the stored token already differs from `stale`, another
    /// request refreshed it in the meantime and it is returned as is.
    pub async fn refresh<F, Fut>(&self, stale: Option<&str>, fetch: F) -> Result<String, ClientError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<TokenPair, ClientError>>,
    {
        match self.join(stale) {
            Role::Done(result) => result,
            Role::Waiter(rx) => {
                debug!("Waiting on in-flight token refresh");
                match rx.await {
                    Ok(Ok(token)) => Ok(token),
                    Ok(Err(message)) => Err(ClientError::RefreshFailed(message)),
                    Err(_) => Err(ClientError::RefreshFailed("refresh abandoned".to_string())),
                }
            }
            Role::Leader(refresh_token) => self.lead(refresh_token, fetch).await,
        }
    }

    fn join(&self, stale: Option<&str>) -> Role {
        let mut phase = self.lock();
        if let Phase::Refreshing { waiters } = &mut *phase {
            let (tx, rx) = oneshot::channel();
            waiters.push_back(tx);
            return Role::Waiter(rx);
        }

        // Reading the store under the phase lock: a leader publishes the new
        // token before it flips back to idle.
        if let Some(current) = self.store.access_token() {
            if stale != Some(current.as_str()) {
                return Role::Done(Ok(current));
            }
        }

        let Some(refresh_token) = self.store.refresh_token() else {
            drop(phase);
            self.supervisor
                .force_logout(&self.store, "no refresh token available");
            return Role::Done(Err(ClientError::AuthExpired(
                "no refresh token available".to_string(),
            )));
        };

        *phase = Phase::Refreshing {
            waiters: VecDeque::new(),
        };
        Role::Leader(refresh_token)
    }

    async fn lead<F, Fut>(&self, refresh_token: String, fetch: F) -> Result<String, ClientError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<TokenPair, ClientError>>,
    {
        let mut guard = LeaderGuard {
            coordinator: self,
            settled: false,
        };
        let attempt = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(attempt, "Refreshing access token");

        let fetched = match fetch(refresh_token).await {
            Ok(pair) if pair.access_token.is_empty() => {
                Err("refresh response carried no access token".to_string())
            }
            Ok(pair) => {
                self.store.dispatch(SessionAction::TokenRefreshed(pair));
                self.store
                    .access_token()
                    .ok_or_else(|| "session ended during refresh".to_string())
            }
            Err(e) => Err(e.to_string()),
        };

        match fetched {
            Ok(token) => {
                info!("Access token refreshed");
                guard.settle(Ok(token.clone()));
                Ok(token)
            }
            Err(message) => {
                warn!("Token refresh failed: {message}");
                self.supervisor
                    .force_logout(&self.store, "token refresh failed");
                guard.settle(Err(message.clone()));
                Err(ClientError::RefreshFailed(message))
            }
        }
    }

    fn settle(&self, outcome: &Outcome) {
        let waiters = match std::mem::replace(&mut *self.lock(), Phase::Idle) {
            Phase::Refreshing { waiters } => waiters,
            Phase::Idle => VecDeque::new(),
        };
        debug!(waiters = waiters.len(), ok = outcome.is_ok(), "Settling token refresh");
        for waiter in waiters {
            // A waiter whose request was dropped no longer listens.
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// Settles the refresh even if the leader's future is dropped mid-flight
struct LeaderGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl LeaderGuard<'_> {
    fn settle(&mut self, outcome: Outcome) {
        self.settled = true;
        self.coordinator.settle(&outcome);
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.coordinator
                .settle(&Err("refresh cancelled".to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentic_core::{AuthUser, LoginResponse, Navigator};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingNavigator(AtomicUsize);

    impl Navigator for CountingNavigator {
        fn navigate(&self, _route: &str) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn must_not_refresh(_refresh_token: String) -> Result<TokenPair, ClientError> {
        panic!("refresh must not be issued")
    }

    fn pair(access: &str) -> TokenPair {
        TokenPair {
            access_token: access.to_string(),
            refresh_token: String::new(),
            access_token_expires_in: 900,
            refresh_token_expires_in: 0,
        }
    }

    fn setup() -> (SessionStore, Arc<CountingNavigator>, RefreshCoordinator) {
        let store = SessionStore::default();
        let navigator = Arc::new(CountingNavigator::default());
        let supervisor = SessionSupervisor::attach(&store, navigator.clone(), "/login");
        store.dispatch(SessionAction::LoggedIn(LoginResponse {
            user: AuthUser {
                id: "u1".to_string(),
                email: "ada@example.com".to_string(),
                name: "Ada".to_string(),
                roles: None,
            },
            tokens: TokenPair {
                access_token: "old".to_string(),
                refresh_token: "refresh".to_string(),
                access_token_expires_in: 900,
                refresh_token_expires_in: 3600,
            },
        }));
        let coordinator = RefreshCoordinator::new(store.clone(), supervisor);
        (store, navigator, coordinator)
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let (store, _, coordinator) = setup();

        let call = || {
            coordinator.refresh(Some("old"), |refresh_token| async move {
                assert_eq!(refresh_token, "refresh");
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(pair("new"))
            })
        };
        let results = futures::future::join_all((0..5).map(|_| call())).await;

        assert_eq!(coordinator.refresh_count(), 1);
        assert!(results.iter().all(|r| r.as_deref().ok() == Some("new")));
        assert_eq!(store.access_token().as_deref(), Some("new"));
        assert_eq!(store.refresh_token().as_deref(), Some("refresh"));
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_already_rotated_token_is_reused() {
        let (_, _, coordinator) = setup();
        coordinator
            .refresh(Some("old"), |_| async { Ok(pair("new")) })
            .await
            .unwrap();

        let token = coordinator
            .refresh(Some("old"), must_not_refresh)
            .await
            .unwrap();

        assert_eq!(token, "new");
        assert_eq!(coordinator.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_rejects_waiters_and_redirects_once() {
        let (store, navigator, coordinator) = setup();

        let call = || {
            coordinator.refresh(Some("old"), |_| async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Err(ClientError::AuthenticationFailed("refresh token revoked".into()))
            })
        };
        let results = futures::future::join_all((0..4).map(|_| call())).await;

        assert!(results
            .iter()
            .all(|r| matches!(r, Err(ClientError::RefreshFailed(_)))));
        assert_eq!(navigator.0.load(Ordering::SeqCst), 1);
        assert!(!store.is_authenticated());
        assert_eq!(coordinator.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_waiters_are_woken_in_arrival_order() {
        let (_, _, coordinator) = setup();
        assert!(matches!(coordinator.join(Some("old")), Role::Leader(_)));

        let mut receivers = Vec::new();
        for _ in 0..4 {
            let Role::Waiter(rx) = coordinator.join(Some("old")) else {
                panic!("expected to queue behind the leader");
            };
            receivers.push(rx);
        }

        // Spawn in reverse so task order and queue order disagree.
        let woken = Arc::new(Mutex::new(Vec::new()));
        let mut tasks = Vec::new();
        for (position, rx) in receivers.into_iter().enumerate().rev() {
            let woken = woken.clone();
            tasks.push(tokio::spawn(async move {
                let token = rx.await.unwrap().unwrap();
                woken.lock().unwrap().push(position);
                token
            }));
        }
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert!(woken.lock().unwrap().is_empty());

        coordinator.settle(&Ok("new".to_string()));
        for task in tasks {
            assert_eq!(task.await.unwrap(), "new");
        }

        assert_eq!(*woken.lock().unwrap(), vec![0, 1, 2, 3]);
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_empty_access_token_counts_as_failure() {
        let (store, _, coordinator) = setup();
        let result = coordinator
            .refresh(Some("old"), |_| async { Ok(pair("")) })
            .await;

        assert!(matches!(result, Err(ClientError::RefreshFailed(_))));
        assert!(!store.is_authenticated());
    }

    #[tokio::test]
    async fn test_missing_refresh_token_forces_logout() {
        let store = SessionStore::default();
        let navigator = Arc::new(CountingNavigator::default());
        let supervisor = SessionSupervisor::attach(&store, navigator.clone(), "/login");
        let coordinator = RefreshCoordinator::new(store, supervisor);

        let result = coordinator
            .refresh(None, must_not_refresh)
            .await;

        assert!(matches!(result, Err(ClientError::AuthExpired(_))));
        assert_eq!(coordinator.refresh_count(), 0);
        // Nobody was logged in, so there is nothing to redirect from.
        assert_eq!(navigator.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dropped_leader_releases_waiters() {
        let (_, _, coordinator) = setup();
        let coordinator = Arc::new(coordinator);

        let leader = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .refresh(Some("old"), |_| async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(pair("never"))
                    })
                    .await
            })
        };
        while !coordinator.is_refreshing() {
            tokio::task::yield_now().await;
        }

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .refresh(Some("old"), |_| async { Ok(pair("unused")) })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        leader.abort();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(ClientError::RefreshFailed(_))));
        assert!(!coordinator.is_refreshing());
    }
}
