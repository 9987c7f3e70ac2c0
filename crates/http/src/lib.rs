//! Agentic HTTP client
//!
//! Authenticated request pipeline for the Agentic API: bearer attachment,
//! proactive and reactive token refresh, and session teardown when the
//! session cannot be recovered.

pub mod client;

pub use client::error::ClientError;
pub use client::refresh::RefreshCoordinator;
pub use client::{ApiClient, ApiClientBuilder, ApiRequest};
