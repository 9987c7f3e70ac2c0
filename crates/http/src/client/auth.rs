//! Authentication API client methods

use super::{ApiClient, ApiRequest, ClientError};
use agentic_core::{
    AuthUser, LoginRequest, LoginResponse, RefreshRequest, RegisterRequest, RegisterResponse,
    SessionAction, TokenPair,
};
use tracing::info;

impl ApiClient {
    /// Log in and store the issued tokens
    pub async fn login(&self, request: LoginRequest) -> Result<AuthUser, ClientError> {
        self.store.dispatch(SessionAction::LoginStarted);

        let result = match ApiRequest::post("/auth/login").json(&request) {
            Ok(req) => self.execute_public::<LoginResponse>(req).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(response) => {
                let user = response.user.clone();
                let state = self.store.dispatch(SessionAction::LoggedIn(response));
                if !state.is_authenticated {
                    let message = state
                        .error
                        .unwrap_or_else(|| "login did not produce a session".to_string());
                    return Err(ClientError::AuthenticationFailed(message));
                }
                info!(user_id = %user.id, "Logged in");
                Ok(user)
            }
            Err(e) => {
                self.store.dispatch(SessionAction::LoginFailed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Create an account. Does not log in.
    pub async fn register(
        &self,
        request: RegisterRequest,
    ) -> Result<RegisterResponse, ClientError> {
        request.validate().map_err(ClientError::Validation)?;
        let req = ApiRequest::post("/auth/register").json(&request)?;
        let response: RegisterResponse = self.execute_public(req).await?;
        info!(user_id = %response.id, "Registered account");
        Ok(response)
    }

    /// Revoke the session server-side, then clear it locally
    pub async fn logout(&self) -> Result<(), ClientError> {
        if !self.store.is_authenticated() {
            return Err(ClientError::NotAuthenticated);
        }

        match self.send_no_content(ApiRequest::post("/auth/logout")).await {
            Ok(()) => {
                self.store.dispatch(SessionAction::Cleared);
                info!("Logged out");
                Ok(())
            }
            Err(e) => {
                if !e.is_auth_expired() {
                    self.store.dispatch(SessionAction::SetError(e.to_string()));
                }
                Err(e)
            }
        }
    }

    /// Fetch the profile of the logged-in user
    pub async fn me(&self) -> Result<AuthUser, ClientError> {
        self.send(ApiRequest::get("/auth/me")).await
    }

    /// Refresh the access token now, sharing any refresh already in flight
    pub async fn refresh_session(&self) -> Result<(), ClientError> {
        if !self.store.is_authenticated() {
            return Err(ClientError::NotAuthenticated);
        }
        let current = self.store.access_token();
        self.refresh_token(current.as_deref()).await.map(drop)
    }

    /// Exchange a refresh token for a new pair. Public endpoint, so a 401 here
    /// is never fed back into the refresh path.
    pub(crate) async fn fetch_tokens(&self, refresh_token: String) -> Result<TokenPair, ClientError> {
        let req = ApiRequest::post("/auth/refresh").json(&RefreshRequest { refresh_token })?;
        self.execute_public(req).await
    }
}
