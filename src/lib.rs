pub mod auth;
pub mod config;
pub mod document;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod model;
pub mod oracle;
pub mod server;
pub mod storage;
pub mod validate;

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use auth::{SessionStore, TokenIssuer};
use config::Config;
use oracle::Oracle;
use storage::Backend;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub backend: Backend,
    pub tokens: Arc<TokenIssuer>,
    pub sessions: Arc<SessionStore>,
    pub oracle: Arc<Oracle>,
    pub started: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config, backend: Backend) -> Self {
        let tokens = TokenIssuer::new(&config.auth.jwt_secret, config.auth.token_ttl_secs);
        let sessions = SessionStore::new(Duration::from_secs(config.auth.session_ttl_secs));
        Self {
            config: Arc::new(config),
            backend,
            tokens: Arc::new(tokens),
            sessions: Arc::new(sessions),
            oracle: Arc::new(Oracle::new()),
            started: Instant::now(),
        }
    }
}
