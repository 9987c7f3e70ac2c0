//! Session state and the closed set of transitions that mutate it

use crate::types::{AuthUser, LoginResponse, TokenPair};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Progress of the last login/logout attempt
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStatus {
    #[default]
    Idle,
    Loading,
    Succeeded,
    Failed,
}

/// Authentication slice of the client state
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub user: Option<AuthUser>,
    pub tokens: Option<TokenPair>,
    pub is_authenticated: bool,
    pub status: AuthStatus,
    pub error: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub session_expires_at: Option<DateTime<Utc>>,
}

/// Every way the session can change
#[derive(Clone, Debug)]
pub enum SessionAction {
    LoginStarted,
    LoggedIn(LoginResponse),
    LoginFailed(String),
    TokenRefreshed(TokenPair),
    SetError(String),
    Cleared,
    Restored(SessionState),
}

impl SessionAction {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::LoginStarted => "login_started",
            Self::LoggedIn(_) => "logged_in",
            Self::LoginFailed(_) => "login_failed",
            Self::TokenRefreshed(_) => "token_refreshed",
            Self::SetError(_) => "set_error",
            Self::Cleared => "cleared",
            Self::Restored(_) => "restored",
        }
    }
}

/// `secs` from `now`, or no expiry when the lifetime is absent or out of range
fn expiry(now: DateTime<Utc>, secs: i64) -> Option<DateTime<Utc>> {
    if secs <= 0 {
        return None;
    }
    Duration::try_seconds(secs).and_then(|lifetime| now.checked_add_signed(lifetime))
}

impl SessionState {
    /// Apply an action, producing the next state
    #[must_use]
    pub fn reduce(self, action: SessionAction, now: DateTime<Utc>) -> Self {
        match action {
            SessionAction::LoginStarted => Self {
                status: AuthStatus::Loading,
                error: None,
                ..self
            },
            SessionAction::LoggedIn(response) => {
                if response.tokens.access_token.is_empty() {
                    return Self {
                        status: AuthStatus::Failed,
                        error: Some("login response carried no access token".to_string()),
                        ..self
                    };
                }
                let tokens = response.tokens;
                Self {
                    user: Some(response.user),
                    is_authenticated: true,
                    status: AuthStatus::Succeeded,
                    error: None,
                    last_login_at: Some(now),
                    access_token_expires_at: expiry(now, tokens.access_token_expires_in),
                    session_expires_at: expiry(now, tokens.refresh_token_expires_in),
                    tokens: Some(tokens),
                }
            }
            SessionAction::LoginFailed(message) | SessionAction::SetError(message) => Self {
                status: AuthStatus::Failed,
                error: Some(message),
                ..self
            },
            SessionAction::TokenRefreshed(pair) => self.apply_refresh(pair, now),
            SessionAction::Cleared => Self::default(),
            SessionAction::Restored(restored) => restored.sanitized(),
        }
    }

    fn apply_refresh(mut self, pair: TokenPair, now: DateTime<Utc>) -> Self {
        // A refresh settling after logout must not resurrect the session.
        if !self.is_authenticated || pair.access_token.is_empty() {
            return self;
        }
        let Some(tokens) = self.tokens.as_mut() else {
            return self;
        };

        tokens.access_token = pair.access_token;
        tokens.access_token_expires_in = pair.access_token_expires_in;
        self.access_token_expires_at = expiry(now, pair.access_token_expires_in);

        if !pair.refresh_token.is_empty() && pair.refresh_token != tokens.refresh_token {
            tokens.refresh_token = pair.refresh_token;
            if pair.refresh_token_expires_in > 0 {
                tokens.refresh_token_expires_in = pair.refresh_token_expires_in;
                self.session_expires_at = expiry(now, pair.refresh_token_expires_in);
            }
        }
        self
    }

    /// Drop transient fields and reject slices that break the token invariant
    fn sanitized(self) -> Self {
        let has_token = self
            .tokens
            .as_ref()
            .is_some_and(|t| !t.access_token.is_empty());
        if !self.is_authenticated || !has_token {
            return Self::default();
        }
        Self {
            status: AuthStatus::Idle,
            error: None,
            ..self
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        self.tokens
            .as_ref()
            .map(|t| t.access_token.as_str())
            .filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.tokens
            .as_ref()
            .map(|t| t.refresh_token.as_str())
            .filter(|t| !t.is_empty())
    }

    /// True once an authenticated session has passed its expiry
    pub fn is_session_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_authenticated && self.session_expires_at.is_some_and(|at| now >= at)
    }

    /// True when the access token expires within `buffer` of `now`
    pub fn access_token_expires_within(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        self.is_authenticated
            && self
                .access_token_expires_at
                .is_some_and(|at| at - now <= buffer)
    }
}
