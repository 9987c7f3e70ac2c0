//! Agentic API client
//!
//! [`ApiClient`] is the request gateway: every authenticated call goes
//! through [`ApiClient::send`], which attaches the bearer token, refreshes it
//! ahead of expiry, and on a 401 refreshes once and retries once.

pub mod auth;
pub mod error;
pub mod refresh;

use agentic_core::{ClientConfig, LoggingNavigator, SessionStore, SessionSupervisor};
use error::ClientError;
use refresh::RefreshCoordinator;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Replayable description of an API call
#[derive(Clone, Debug)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<Value>,
    headers: HeaderMap,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Attach a JSON body
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ClientError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Attach an already-built JSON body
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub const fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Agentic API client
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    store: SessionStore,
    supervisor: Arc<SessionSupervisor>,
    coordinator: Arc<RefreshCoordinator>,
    refresh_buffer: chrono::Duration,
}

impl ApiClient {
    /// Create a new client with default configuration
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).build()
    }

    /// Create a new client builder
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Builder pre-filled from configuration
    pub fn from_config(config: &ClientConfig) -> ApiClientBuilder {
        let mut builder = Self::builder()
            .base_url(&config.api.base_url)
            .user_agent(&config.api.user_agent)
            .refresh_buffer(config.session.refresh_buffer())
            .login_route(&config.session.login_route);
        if let Some(timeout) = config.api.timeout() {
            builder = builder.timeout(timeout);
        }
        builder
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub const fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn supervisor(&self) -> &Arc<SessionSupervisor> {
        &self.supervisor
    }

    /// Number of refresh calls issued so far
    pub fn refresh_count(&self) -> usize {
        self.coordinator.refresh_count()
    }

    /// Send an authenticated request and decode the JSON response
    pub async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ClientError> {
        let response = self.send_authenticated(&request).await?;
        Self::decode(response).await
    }

    /// Send an authenticated request, discarding the response body
    pub async fn send_no_content(&self, request: ApiRequest) -> Result<(), ClientError> {
        let response = self.send_authenticated(&request).await?;
        Self::check(response).await.map(drop)
    }

    /// Send a request to a public endpoint: no bearer token, no 401 handling
    pub async fn execute_public<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<T, ClientError> {
        let response = self.dispatch(&request, None).await?;
        Self::decode(response).await
    }

    async fn send_authenticated(
        &self,
        request: &ApiRequest,
    ) -> Result<reqwest::Response, ClientError> {
        let mut token = self.store.access_token();

        if token.is_some()
            && self
                .store
                .snapshot()
                .access_token_expires_within(self.store.now(), self.refresh_buffer)
        {
            debug!(path = %request.path, "Access token near expiry, refreshing before send");
            token = Some(self.refresh_token(token.as_deref()).await?);
        }

        let response = self.dispatch(request, token.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!(path = %request.path, "Request unauthorized, refreshing token");
        let fresh = self.refresh_token(token.as_deref()).await?;

        // Exactly one retry; a second rejection ends the session.
        let retry = self.dispatch(request, Some(&fresh)).await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            let message = retry
                .text()
                .await
                .unwrap_or_else(|_| "unauthorized".to_string());
            self.supervisor
                .force_logout(&self.store, "request rejected after token refresh");
            return Err(ClientError::AuthExpired(message));
        }
        Ok(retry)
    }

    async fn refresh_token(&self, stale: Option<&str>) -> Result<String, ClientError> {
        self.coordinator
            .refresh(stale, |refresh_token| self.fetch_tokens(refresh_token))
            .await
    }

    /// Put a single request on the wire
    async fn dispatch(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ClientError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(request.headers.clone());

        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let started = Instant::now();
        let response = builder.send().await.inspect_err(|e| {
            warn!(
                method = %request.method,
                path = %request.path,
                duration_ms = started.elapsed().as_millis(),
                "API request failed to send: {e}"
            );
        })?;

        let status = response.status();
        if status.is_success() {
            debug!(method = %request.method, path = %request.path, status = status.as_u16(), "API request completed");
        } else {
            warn!(
                method = %request.method,
                path = %request.path,
                status = status.as_u16(),
                duration_ms = started.elapsed().as_millis(),
                "API request rejected"
            );
        }
        Ok(response)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            Err(ClientError::from_status(status, message))
        }
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let response = Self::check(response).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Builder for ApiClient
pub struct ApiClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
    store: Option<SessionStore>,
    supervisor: Option<Arc<SessionSupervisor>>,
    login_route: String,
    refresh_buffer: chrono::Duration,
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: None,
            user_agent: None,
            store: None,
            supervisor: None,
            login_route: "/login".to_string(),
            refresh_buffer: chrono::Duration::seconds(60),
        }
    }
}

impl ApiClientBuilder {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Share an existing session store
    pub fn store(mut self, store: SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a supervisor already attached to the store
    pub fn supervisor(mut self, supervisor: Arc<SessionSupervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    /// Route used by the default supervisor on forced logout
    pub fn login_route(mut self, route: impl Into<String>) -> Self {
        self.login_route = route.into();
        self
    }

    /// Refresh this long before the access token expires
    pub const fn refresh_buffer(mut self, buffer: chrono::Duration) -> Self {
        self.refresh_buffer = buffer;
        self
    }

    /// Build the client
    pub fn build(self) -> Result<ApiClient, ClientError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;

        // Ensure base_url ends without a trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        let mut client_builder = ClientBuilder::new();

        if let Some(timeout) = self.timeout {
            client_builder = client_builder.timeout(timeout);
        }

        client_builder = client_builder.user_agent(
            self.user_agent
                .unwrap_or_else(|| concat!("agentic-client/", env!("CARGO_PKG_VERSION")).into()),
        );

        let client = client_builder.build()?;

        let store = self.store.unwrap_or_default();
        let supervisor = self.supervisor.unwrap_or_else(|| {
            SessionSupervisor::attach(&store, Arc::new(LoggingNavigator), self.login_route)
        });
        let coordinator = Arc::new(RefreshCoordinator::new(store.clone(), supervisor.clone()));

        Ok(ApiClient {
            client,
            base_url,
            store,
            supervisor,
            coordinator,
            refresh_buffer: self.refresh_buffer,
        })
    }
}
