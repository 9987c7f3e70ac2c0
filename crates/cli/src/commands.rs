//! CLI commands

use agentic_core::{
    ClientConfig, FileStorage, LoginRequest, Navigator, RegisterRequest, SessionState,
    SessionStore, SessionSupervisor, SystemClock,
};
use agentic_http::{ApiClient, ApiRequest};
use anyhow::{Context, Result, bail};
use clap::Subcommand;
use reqwest::Method;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config;

#[derive(Subcommand)]
pub enum Commands {
    /// Configuration file operations
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    #[command(flatten)]
    Session(SessionCommands),
}

/// Commands that run against the API with the stored session
#[derive(Subcommand)]
pub enum SessionCommands {
    /// Log in and store the session
    Login {
        #[arg(long)]
        email: String,

        #[arg(long, env = "AGENTIC_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Create a new account
    Register {
        #[arg(long)]
        username: String,

        #[arg(long)]
        email: String,

        #[arg(long, env = "AGENTIC_PASSWORD", hide_env_values = true)]
        password: String,

        /// Repeat the password (defaults to --password)
        #[arg(long)]
        confirm_password: Option<String>,

        /// Accept the terms of service
        #[arg(long)]
        accept_terms: bool,
    },

    /// End the session on the server and locally
    Logout,

    /// Show the stored session
    Status,

    /// Show the logged-in user
    Me,

    /// Refresh the access token now
    Refresh,

    /// Send an authenticated request and print the JSON response
    Request {
        /// HTTP method
        #[arg(value_parser = parse_method)]
        method: Method,

        /// Path relative to the API base URL, e.g. /posts
        path: String,

        /// JSON request body
        #[arg(long)]
        body: Option<String>,
    },

    /// Keep the session supervised until interrupted
    Watch,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write a default configuration file
    Init {
        /// Output file path (defaults to AGENTIC_STATE_DIR/config.json)
        output: Option<PathBuf>,
    },

    /// Print the effective configuration
    Show,
}

fn parse_method(raw: &str) -> Result<Method, String> {
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes()).map_err(|e| e.to_string())
}

/// Tells the terminal user to log in again after a forced logout
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn navigate(&self, route: &str) {
        warn!(route, "Session ended");
        eprintln!("Your session has ended. Run `agentic login` to sign in again.");
    }
}

/// Everything a command needs to talk to the API
struct Session {
    client: ApiClient,
    supervisor: Arc<SessionSupervisor>,
    store: SessionStore,
}

impl Session {
    fn open(config: &ClientConfig) -> Result<Self> {
        let storage = Arc::new(FileStorage::new(&config.session.storage_path));
        let store = SessionStore::new(storage, Arc::new(SystemClock));
        let supervisor = SessionSupervisor::attach(
            &store,
            Arc::new(TerminalNavigator),
            &config.session.login_route,
        );

        if store.restore().context("restoring session")? {
            info!("Restored session");
        }

        let client = ApiClient::from_config(config)
            .store(store.clone())
            .supervisor(supervisor.clone())
            .build()?;

        Ok(Self {
            client,
            supervisor,
            store,
        })
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn describe(state: &SessionState) -> Value {
    json!({
        "authenticated": state.is_authenticated,
        "status": state.status,
        "error": state.error,
        "user": state.user,
        "lastLoginAt": state.last_login_at,
        "accessTokenExpiresAt": state.access_token_expires_at,
        "sessionExpiresAt": state.session_expires_at,
    })
}

impl Commands {
    pub async fn execute(self, config: ClientConfig, config_path: Option<PathBuf>) -> Result<()> {
        match self {
            Self::Config { command } => command.execute(&config, config_path),
            Self::Session(command) => {
                let session = Session::open(&config)?;
                let watchdog = session
                    .supervisor
                    .clone()
                    .spawn_watchdog(session.store.clone(), config.session.check_interval());

                let result = command.run(&session).await;
                watchdog.abort();
                result
            }
        }
    }
}

impl SessionCommands {
    async fn run(self, session: &Session) -> Result<()> {
        let client = &session.client;
        match self {
            Self::Login { email, password } => {
                let user = client.login(LoginRequest { email, password }).await?;
                println!("Logged in as {} <{}>", user.name, user.email);
            }
            Self::Register {
                username,
                email,
                password,
                confirm_password,
                accept_terms,
            } => {
                let confirm_password = confirm_password.unwrap_or_else(|| password.clone());
                let created = client
                    .register(RegisterRequest {
                        username,
                        email,
                        password,
                        confirm_password,
                        terms: accept_terms,
                    })
                    .await?;
                println!("Registered {} ({}). You can now log in.", created.username, created.id);
            }
            Self::Logout => {
                client.logout().await?;
                println!("Logged out");
            }
            Self::Status => print_json(&describe(&session.store.snapshot()))?,
            Self::Me => print_json(&serde_json::to_value(client.me().await?)?)?,
            Self::Refresh => {
                client.refresh_session().await?;
                println!("Access token refreshed");
            }
            Self::Request { method, path, body } => {
                let mut request = ApiRequest::new(method, path);
                if let Some(body) = body {
                    let body: Value = serde_json::from_str(&body).context("parsing --body")?;
                    request = request.body(body);
                }
                let response: Value = client.send(request).await?;
                print_json(&response)?;
            }
            Self::Watch => {
                if !session.store.is_authenticated() {
                    bail!("not logged in");
                }
                println!("Supervising session; press Ctrl-C to stop");
                tokio::signal::ctrl_c().await?;
            }
        }
        Ok(())
    }
}

impl ConfigCommands {
    fn execute(self, config: &ClientConfig, config_path: Option<PathBuf>) -> Result<()> {
        match self {
            Self::Init { output } => {
                let path = output
                    .or(config_path)
                    .unwrap_or_else(|| agentic_core::config::default_state_dir().join("config.json"));
                config::generate_default_config(&path)?;
                println!("Generated configuration at: {}", path.display());
            }
            Self::Show => print_json(&serde_json::to_value(config)?)?,
        }
        Ok(())
    }
}
