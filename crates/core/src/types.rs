//! Wire types shared by the session layer and the HTTP client

use serde::{Deserialize, Serialize};

/// Access/refresh credentials as issued by `/auth/login` and `/auth/refresh`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    /// Empty when the server did not rotate the refresh token
    #[serde(default)]
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub access_token_expires_in: i64,
    /// Refresh token lifetime in seconds
    #[serde(default)]
    pub refresh_token_expires_in: i64,
}

/// Authenticated user profile
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body of a successful `/auth/login`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: AuthUser,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub terms: bool,
}

impl RegisterRequest {
    /// Check the form-level rules the server would otherwise reject
    pub fn validate(&self) -> Result<(), String> {
        if self.username.trim().is_empty() {
            return Err("username is required".to_string());
        }
        if !self.email.contains('@') {
            return Err("email address is invalid".to_string());
        }
        if self.password.is_empty() {
            return Err("password is required".to_string());
        }
        if self.password != self.confirm_password {
            return Err("passwords do not match".to_string());
        }
        if !self.terms {
            return Err("terms must be accepted".to_string());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub id: String,
    pub username: String,
    pub email: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}
