//! Client error types

use thiserror::Error;

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or transport failure; never retried automatically
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server returned an error status
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Credentials rejected by a public endpoint (e.g. wrong password)
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Request still rejected after a token refresh; the session was cleared
    #[error("Session expired: {0}")]
    AuthExpired(String),

    /// The refresh endpoint failed; the session was cleared
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// Operation needs a logged-in session
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Input rejected before or by the server
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Create error from HTTP status code
    pub fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        match status.as_u16() {
            400 => Self::BadRequest(message),
            401 => Self::AuthenticationFailed(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            422 => Self::Validation(message),
            _ => Self::ServerError {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// Whether the session is gone and the user has to log in again
    pub const fn is_auth_expired(&self) -> bool {
        matches!(
            self,
            Self::AuthExpired(_) | Self::RefreshFailed(_) | Self::NotAuthenticated
        )
    }

    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Request(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_mapping() {
        let msg = || "boom".to_string();
        assert!(matches!(
            ClientError::from_status(StatusCode::BAD_REQUEST, msg()),
            ClientError::BadRequest(_)
        ));
        assert!(matches!(
            ClientError::from_status(StatusCode::UNAUTHORIZED, msg()),
            ClientError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            ClientError::from_status(StatusCode::UNPROCESSABLE_ENTITY, msg()),
            ClientError::Validation(_)
        ));
        assert!(matches!(
            ClientError::from_status(StatusCode::BAD_GATEWAY, msg()),
            ClientError::ServerError { status: 502, .. }
        ));
    }

    #[test]
    fn test_auth_expired_classification() {
        assert!(ClientError::AuthExpired("x".into()).is_auth_expired());
        assert!(ClientError::RefreshFailed("x".into()).is_auth_expired());
        assert!(!ClientError::AuthenticationFailed("x".into()).is_auth_expired());
        assert!(!ClientError::NotFound("x".into()).is_network());
    }
}
