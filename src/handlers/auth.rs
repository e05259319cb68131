//! Account registration and login, profile edits, Telegram sessions and the bot webhook.

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::extract::{AccountUser, Body, ClientMeta};
use super::utils;
use crate::AppState;
use crate::auth::{password, telegram};
use crate::error::{AppError, AppResult, AuthError, StorageError};
use crate::model::{NewUser, Role, User, UserUpdate, UserView};
use crate::validate::Checker;

const WEBHOOK_SECRET_HEADER: &str = "x-telegram-bot-secret";

#[derive(Debug, Deserialize)]
pub struct RegisterInput {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginInput {
    /// Username or email
    #[serde(default, alias = "login", alias = "email")]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileInput {
    pub email: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

fn token_response(state: &AppState, user: &User, message: &str) -> AppResult<Json<Value>> {
    let token = state.tokens.issue(user)?;
    Ok(Json(json!({
        "status": "success",
        "message": message,
        "token": token,
        "user": {
            "id": user.id,
            "username": user.username,
            "email": user.email,
            "role": user.role,
        },
    })))
}

pub async fn register(
    State(state): State<AppState>,
    meta: ClientMeta,
    Body(input): Body<RegisterInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    if !utils::registration_open(&state).await {
        return Err(AppError::Forbidden("Registration is disabled"));
    }
    let mut check = Checker::new();
    check.username(&input.username);
    check.email("email", &input.email);
    check.password("password", &input.password);
    check.finish()?;

    let password_hash = password::hash_password_blocking(input.password).await?;
    let new = NewUser {
        username: input.username.trim().to_string(),
        email: input.email.trim().to_lowercase(),
        password_hash,
        role: Role::User,
        ip: meta.ip,
        user_agent: meta.user_agent,
    };
    let user = match state.backend.users.create_user(new).await {
        Ok(user) => user,
        Err(StorageError::Duplicate(_)) => {
            return Err(AppError::BadRequest(
                "Username or email already exists".into(),
            ));
        }
        Err(e) => return Err(e.into()),
    };
    tracing::info!(id = user.id, username = %user.username, "account registered");
    let body = token_response(&state, &user, "Registration successful")?;
    Ok((StatusCode::CREATED, body))
}

pub async fn login(
    State(state): State<AppState>,
    meta: ClientMeta,
    Body(input): Body<LoginInput>,
) -> AppResult<Json<Value>> {
    let login = input.username.trim().to_string();
    if login.is_empty() || input.password.is_empty() {
        let mut check = Checker::new();
        if login.is_empty() {
            check.fail("username", "is required");
        }
        if input.password.is_empty() {
            check.fail("password", "is required");
        }
        check.finish()?;
    }

    let Some(user) = state.backend.users.find_user_by_login(&login).await? else {
        password::verify_dummy_blocking(input.password).await;
        tracing::warn!(login = %login, "login failed");
        return Err(AuthError::InvalidCredentials(login).into());
    };
    if !password::verify_password_blocking(input.password, user.password_hash.clone()).await {
        tracing::warn!(login = %login, "login failed");
        return Err(AuthError::InvalidCredentials(login).into());
    }
    if !user.is_active {
        return Err(AuthError::AccountDisabled(user.username).into());
    }

    let update = UserUpdate {
        last_login_at: Some(chrono::Utc::now()),
        last_login_ip: meta.ip,
        ..UserUpdate::default()
    };
    let user = state
        .backend
        .users
        .update_user(user.id, update)
        .await?
        .unwrap_or(user);
    tracing::info!(id = user.id, username = %user.username, "login");
    token_response(&state, &user, "Login successful")
}

pub async fn profile(AccountUser(user): AccountUser) -> Json<Value> {
    Json(json!({
        "status": "success",
        "user": UserView::from(user),
    }))
}

pub async fn update_profile(
    State(state): State<AppState>,
    AccountUser(user): AccountUser,
    Body(input): Body<ProfileInput>,
) -> AppResult<Json<Value>> {
    let mut check = Checker::new();
    if let Some(email) = &input.email {
        check.email("email", email);
    }
    if let Some(new_password) = &input.new_password {
        check.password("newPassword", new_password);
        if input.current_password.as_deref().is_none_or(str::is_empty) {
            check.fail("currentPassword", "is required to set a new password");
        }
    }
    check.finish()?;

    let mut update = UserUpdate::default();
    if let Some(email) = input.email.map(|e| e.trim().to_lowercase()) {
        if email != user.email {
            let taken = state
                .backend
                .users
                .find_user_by_login(&email)
                .await?
                .is_some_and(|other| other.id != user.id);
            if taken {
                return Err(AppError::BadRequest("Email already in use".into()));
            }
            update.email = Some(email);
        }
    }
    if let (Some(new_password), Some(current)) = (input.new_password, input.current_password) {
        if !password::verify_password_blocking(current, user.password_hash.clone()).await {
            return Err(AppError::BadRequest("Current password is incorrect".into()));
        }
        update.password_hash = Some(password::hash_password_blocking(new_password).await?);
    }

    let user = if update.email.is_none() && update.password_hash.is_none() {
        user
    } else {
        state
            .backend
            .users
            .update_user(user.id, update)
            .await?
            .ok_or(AppError::NotFound("User not found"))?
    };
    Ok(Json(json!({
        "status": "success",
        "message": "Profile updated",
        "user": UserView::from(user),
    })))
}

/// Tokens are stateless; the client drops its copy.
pub async fn logout_token() -> Json<Value> {
    Json(json!({
        "status": "success",
        "message": "Logged out",
    }))
}

/// Confirm a token still maps to an active account.
pub async fn verify(AccountUser(user): AccountUser) -> Json<Value> {
    Json(json!({
        "status": "success",
        "valid": true,
        "user": {
            "id": user.id,
            "username": user.username,
            "email": user.email,
            "role": user.role,
        },
    }))
}

fn session_cookie(state: &AppState, value: String) -> Cookie<'static> {
    Cookie::build((state.config.auth.session_cookie.clone(), value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.environment.is_production())
        .build()
}

/// Verify a login widget payload and open a cookie session.
pub async fn telegram(
    State(state): State<AppState>,
    jar: CookieJar,
    Body(payload): Body<Map<String, Value>>,
) -> AppResult<(CookieJar, Json<Value>)> {
    let bot_token = state
        .config
        .telegram
        .bot_token
        .as_deref()
        .ok_or(AuthError::NotConfigured("telegram bot token"))?;
    if ["id", "hash", "auth_date"]
        .iter()
        .any(|key| payload.get(*key).is_none_or(Value::is_null))
    {
        return Err(AppError::BadRequest("Invalid payload".into()));
    }
    let now = chrono::Utc::now().timestamp();
    let user = telegram::verify(
        &payload,
        bot_token,
        state.config.telegram.auth_max_age_secs,
        now,
    )?;
    let id = state.sessions.create(user.clone());
    tracing::info!(telegram_id = %user.id, "telegram session opened");
    let jar = jar.add(session_cookie(&state, id));
    Ok((jar, Json(json!({ "ok": true, "user": user }))))
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Json<Value>) {
    let name = state.config.auth.session_cookie.clone();
    if let Some(cookie) = jar.get(&name) {
        state.sessions.destroy(cookie.value());
    }
    let jar = jar.remove(Cookie::build((name, "")).path("/"));
    (jar, Json(json!({ "ok": true })))
}

pub async fn me(State(state): State<AppState>, jar: CookieJar) -> Json<Value> {
    let user = jar
        .get(&state.config.auth.session_cookie)
        .and_then(|cookie| state.sessions.get(cookie.value()));
    Json(json!({ "user": user }))
}

/// Telegram bot updates. The shared secret header must match.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Body(update): Body<Value>,
) -> AppResult<Json<Value>> {
    let presented = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    let expected = state.config.telegram.webhook_secret.as_deref();
    match (presented, expected) {
        (Some(presented), Some(expected))
            if telegram::webhook_secret_matches(presented, expected) => {}
        _ => {
            tracing::warn!("webhook call with a bad secret");
            return Err(AppError::Auth(AuthError::InvalidToken));
        }
    }
    let update_id = update.get("update_id").and_then(Value::as_i64);
    tracing::info!(?update_id, "telegram update received");
    Ok(Json(json!({ "ok": true })))
}
