//! Request extractors: credentials, client metadata and JSON-erroring wrappers.

use async_trait::async_trait;
use axum::extract::{ConnectInfo, FromRequest, FromRequestParts};
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use axum_extra::extract::CookieJar;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use std::net::SocketAddr;

use crate::AppState;
use crate::auth::{Claims, Principal};
use crate::error::{AppError, AuthError};
use crate::model::{Role, User};

/// `Json` that rejects with the common error body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct Body<T>(pub T);

/// `Query` that rejects with the common error body.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct Params<T>(pub T);

/// `Path` that rejects with the common error body.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct PathId<T>(pub T);

async fn bearer_claims(parts: &mut Parts, state: &AppState) -> Option<Result<Claims, AuthError>> {
    let TypedHeader(Authorization(bearer)) =
        TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
            .await
            .ok()?;
    Some(state.tokens.verify(bearer.token()))
}

async fn session_user(parts: &mut Parts, state: &AppState) -> Option<Principal> {
    let Ok(jar) = CookieJar::from_request_parts(parts, state).await;
    let cookie = jar.get(&state.config.auth.session_cookie)?;
    state.sessions.get(cookie.value()).map(Principal::Telegram)
}

/// Load the account a token names. Missing accounts are treated as a bad token.
async fn stored_account(claims: &Claims, state: &AppState) -> Result<User, AppError> {
    let id = claims.user_id().ok_or(AuthError::InvalidToken)?;
    let user = state
        .backend
        .users
        .get_user(id)
        .await?
        .ok_or(AuthError::InvalidToken)?;
    if !user.is_active {
        return Err(AuthError::AccountDisabled(user.username).into());
    }
    Ok(user)
}

fn account(user: &User) -> Principal {
    Principal::Account {
        id: user.id,
        username: user.username.clone(),
        role: user.role,
    }
}

/// A verified bearer token for an active account, or a live Telegram session.
/// Roles come from the store, not from the token claims.
#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(claims) = bearer_claims(parts, state).await {
            let user = stored_account(&claims?, state).await?;
            return Ok(account(&user));
        }
        session_user(parts, state)
            .await
            .ok_or(AppError::Auth(AuthError::Required))
    }
}

/// Caller identity when present. Invalid tokens count as anonymous, but a
/// disabled account is still refused.
pub struct MaybePrincipal(pub Option<Principal>);

#[async_trait]
impl FromRequestParts<AppState> for MaybePrincipal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(Ok(claims)) = bearer_claims(parts, state).await {
            match stored_account(&claims, state).await {
                Ok(user) => return Ok(MaybePrincipal(Some(account(&user)))),
                Err(AppError::Auth(AuthError::InvalidToken)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(MaybePrincipal(session_user(parts, state).await))
    }
}

/// The active account behind a bearer token, loaded from the store.
pub struct AccountUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AccountUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = bearer_claims(parts, state)
            .await
            .ok_or(AuthError::Required)??;
        Ok(AccountUser(stored_account(&claims, state).await?))
    }
}

/// An active account whose stored role is `admin`.
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AccountUser(user) = AccountUser::from_request_parts(parts, state).await?;
        if user.role != Role::Admin {
            tracing::warn!(user = %user.username, "admin route refused");
            return Err(AppError::Forbidden("Admin access required"));
        }
        Ok(AdminUser(user))
    }
}

/// Submitter address and user agent.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientMeta {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let ip = forwarded.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(ClientMeta { ip, user_agent })
    }
}
