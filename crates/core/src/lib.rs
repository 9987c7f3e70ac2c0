//! Agentic client session layer: token store, session supervision and persistence

pub mod clock;
pub mod config;
pub mod error;
pub mod persist;
pub mod session;
pub mod store;
pub mod supervisor;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ApiConfig, ClientConfig, SessionConfig};
pub use error::{Error, Result};
pub use persist::{FileStorage, MemoryStorage, Storage};
pub use session::{AuthStatus, SessionAction, SessionState};
pub use store::{SessionMiddleware, SessionStore};
pub use supervisor::{LoggingNavigator, Navigator, SessionSupervisor};
pub use types::{
    AuthUser, LoginRequest, LoginResponse, RefreshRequest, RegisterRequest, RegisterResponse,
    TokenPair,
};
