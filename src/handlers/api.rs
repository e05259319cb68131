use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use super::utils;
use crate::AppState;
use crate::validate::{QUOTE_AUTHOR_MAX, QUOTE_TEXT_MAX};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Liveness probe for load balancers.
pub async fn alive() -> Json<Value> {
    Json(json!({ "ok": true }))
}

pub async fn info() -> Json<Value> {
    Json(json!({
        "status": "success",
        "message": "DarlingX API Server",
        "version": VERSION,
        "endpoints": {
            "quotes": "/api/quotes",
            "auth": "/api/auth",
            "admin": "/api/admin",
            "oracle": "/api/oracle",
            "health": "/api/health",
            "config": "/api/config",
        },
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let storage = match state.backend.test_connection().await {
        Ok(()) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "storage health check failed");
            "unavailable"
        }
    };
    Json(json!({
        "status": "success",
        "message": "Server is running",
        "timestamp": utils::timestamp(),
        "uptime": state.started.elapsed().as_secs(),
        "environment": state.config.environment.as_str(),
        "storage": { "backend": state.backend.kind, "status": storage },
    }))
}

pub async fn config(State(state): State<AppState>) -> Json<Value> {
    let registration = utils::registration_open(&state).await;
    let approval = utils::require_approval(&state).await;
    Json(json!({
        "status": "success",
        "config": {
            "features": {
                "registration": registration,
                "quoteApproval": approval,
                "anonymousQuotes": !state.config.quotes.require_auth,
                "telegramLogin": state.config.telegram.bot_token.is_some(),
                "oracle": true,
            },
            "limits": {
                "quotesPerPage": state.config.quotes.default_page_size,
                "maxQuotesPerPage": state.config.quotes.max_page_size,
                "maxQuoteLength": QUOTE_TEXT_MAX,
                "maxAuthorLength": QUOTE_AUTHOR_MAX,
            },
            "version": VERSION,
        },
    }))
}
