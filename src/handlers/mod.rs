//! HTTP route handlers, grouped by area, and the router that mounts them.

pub mod admin;
pub mod api;
pub mod auth;
pub mod extract;
pub mod oracle;
pub mod quotes;
pub mod utils;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderValue, Method, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::error::{ErrorBody, ErrorReport};

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(api::info))
        .route("/health", get(api::health))
        .route("/config", get(api::config))
        .route("/quotes", get(quotes::list).post(quotes::create))
        .route("/quotes/random/one", get(quotes::random))
        .route("/quotes/stats/overview", get(quotes::stats))
        .route(
            "/quotes/:id",
            get(quotes::get_one).put(quotes::update).delete(quotes::delete),
        )
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout_token))
        .route(
            "/auth/profile",
            get(auth::profile).put(auth::update_profile),
        )
        .route("/auth/verify", get(auth::verify))
        .route("/auth/telegram", post(auth::telegram))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .route("/admin/dashboard", get(admin::dashboard))
        .route("/admin/users", get(admin::users))
        .route("/admin/users/:id/status", put(admin::set_user_status))
        .route("/admin/users/:id/role", put(admin::set_user_role))
        .route("/admin/quotes", get(admin::quotes))
        .route("/admin/quotes/:id/approve", put(admin::approve_quote))
        .route("/admin/quotes/:id", delete(admin::delete_quote))
        .route("/admin/analytics", get(admin::analytics))
        .route(
            "/admin/settings",
            get(admin::settings).put(admin::update_settings),
        )
        .route("/admin/cache", delete(admin::clear_cache))
        .route("/oracle/generate", post(oracle::generate))
        .route("/oracle/random", get(oracle::random))
        .route("/oracle/stats", get(oracle::stats))
}

fn cors(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring malformed CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Build the application router with its middleware stack.
pub fn router(state: AppState) -> Router {
    let body_limit = state
        .config
        .max_body_bytes
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(usize::MAX);
    Router::new()
        .route("/health", get(api::alive))
        .route("/webhook", post(auth::webhook))
        .nest("/api", api_routes())
        .layer(axum::middleware::map_response_with_state(
            state.clone(),
            expose_error_detail,
        ))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors(&state.config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Outside production, copy the internal error text of 5xx responses into the body.
async fn expose_error_detail(State(state): State<AppState>, mut response: Response) -> Response {
    let Some(report) = response.extensions_mut().remove::<ErrorReport>() else {
        return response;
    };
    if state.config.environment.is_production() {
        return response;
    }
    let body = ErrorBody {
        detail: Some(report.detail),
        ..report.body
    };
    (response.status(), Json(body)).into_response()
}
