use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::AppState;
use crate::auth::SessionStore;
use crate::config::Config;
use crate::handlers;
use crate::storage;

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Open the configured backend and wrap it in shared state.
pub async fn build_state(cfg: Config) -> Result<AppState, Box<dyn Error + Send + Sync>> {
    let backend = storage::open(&cfg).await?;
    info!(backend = backend.kind, "storage opened");
    Ok(AppState::new(cfg, backend))
}

/// Periodically drop expired Telegram sessions.
pub fn spawn_session_sweeper(sessions: Arc<SessionStore>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let dropped = sessions.sweep();
            if dropped > 0 {
                info!(dropped, remaining = sessions.len(), "expired sessions removed");
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}

pub async fn run(cfg: Config) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = cfg.listen_addr();
    let state = build_state(cfg).await?;
    if let Err(e) = state.backend.test_connection().await {
        warn!("storage not reachable at startup: {e}");
    }
    let sweeper = spawn_session_sweeper(state.sessions.clone());
    let app = handlers::router(state);

    let listener = TcpListener::bind(&addr).await?;
    info!("listening on {addr}");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    sweeper.abort();
    info!("server stopped");
    Ok(())
}
