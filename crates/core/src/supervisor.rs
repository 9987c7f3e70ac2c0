//! Session expiry supervision and forced logout

use crate::session::{SessionAction, SessionState};
use crate::store::{SessionMiddleware, SessionStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Moves the user to another screen
#[cfg_attr(test, mockall::automock)]
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

/// Navigator for headless use: records the redirect in the log
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingNavigator;

impl Navigator for LoggingNavigator {
    fn navigate(&self, route: &str) {
        info!(route, "Redirecting to login");
    }
}

/// Clears the session when it expires or becomes unrecoverable, then sends
/// the user to the login route.
pub struct SessionSupervisor {
    navigator: Arc<dyn Navigator>,
    login_route: String,
}

impl SessionSupervisor {
    pub fn new(navigator: Arc<dyn Navigator>, login_route: impl Into<String>) -> Self {
        Self {
            navigator,
            login_route: login_route.into(),
        }
    }

    /// Create a supervisor and register it as store middleware
    pub fn attach(
        store: &SessionStore,
        navigator: Arc<dyn Navigator>,
        login_route: impl Into<String>,
    ) -> Arc<Self> {
        let supervisor = Arc::new(Self::new(navigator, login_route));
        store.add_middleware(supervisor.clone());
        supervisor
    }

    pub fn login_route(&self) -> &str {
        &self.login_route
    }

    /// Force logout if the session has expired. Returns whether it did.
    pub fn check(&self, store: &SessionStore) -> bool {
        let now = store.now();
        if store.snapshot().is_session_expired(now) {
            self.force_logout(store, "session expired")
        } else {
            false
        }
    }

    /// Clear an authenticated session and redirect to login.
    ///
    /// A no-op when nobody is logged in, so concurrent callers redirect once.
    pub fn force_logout(&self, store: &SessionStore, reason: &str) -> bool {
        let cleared = store
            .dispatch_if(SessionAction::Cleared, |s| s.is_authenticated)
            .is_some();
        if cleared {
            warn!(reason, route = %self.login_route, "Forcing logout");
            self.navigator.navigate(&self.login_route);
        }
        cleared
    }

    /// Run [`check`](Self::check) on a fixed interval until the handle is aborted
    pub fn spawn_watchdog(self: Arc<Self>, store: SessionStore, every: Duration) -> JoinHandle<()> {
        info!(interval_secs = every.as_secs(), "Starting session watchdog");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.check(&store);
            }
        })
    }
}

impl SessionMiddleware for SessionSupervisor {
    fn after_dispatch(&self, store: &SessionStore, state: &SessionState) {
        if state.is_session_expired(store.now()) {
            self.force_logout(store, "session expired");
        }
    }
}
