use axum::Json;
use axum::extract::State;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;

use super::extract::{AdminUser, Body, Params, PathId};
use super::utils::{self, PageQuery};
use crate::AppState;
use crate::document::DocumentStore;
use crate::error::{AppError, AppResult, StorageError};
use crate::model::{Id, PageRequest, Quote, QuoteFilter, QuoteUpdate, Role, UserFilter, UserUpdate, UserView};

const RECENT: u32 = 10;
const ADMIN_PAGE: u32 = 20;

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    /// `pending`, `approved` or anything else for all
    pub status: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub period: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusInput {
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct RoleInput {
    pub role: Option<String>,
}

fn document(state: &AppState) -> AppResult<&Arc<DocumentStore>> {
    state
        .backend
        .document
        .as_ref()
        .ok_or(AppError::Storage(StorageError::Unsupported("Settings")))
}

pub async fn dashboard(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
) -> AppResult<Json<Value>> {
    let quote_stats = state.backend.quotes.quote_stats().await?;
    let user_stats = state.backend.users.user_stats().await?;
    let recent = PageRequest { page: 1, limit: RECENT };
    let quotes = state
        .backend
        .quotes
        .list_quotes(&QuoteFilter::default(), recent)
        .await?;
    let users = state
        .backend
        .users
        .list_users(&UserFilter::default(), recent)
        .await?;

    let recent_quotes: Vec<Value> = quotes
        .items
        .iter()
        .map(|q| {
            json!({
                "id": q.id,
                "text": q.text,
                "author": q.author,
                "createdAt": q.created_at,
                "ip": q.ip,
            })
        })
        .collect();
    let recent_users: Vec<Value> = users
        .items
        .iter()
        .map(|u| {
            json!({
                "id": u.id,
                "username": u.username,
                "email": u.email,
                "createdAt": u.created_at,
                "lastLoginAt": u.last_login_at,
            })
        })
        .collect();

    Ok(Json(json!({
        "status": "success",
        "dashboard": {
            "quotes": { "total": quote_stats.total_quotes, "today": quote_stats.today_quotes },
            "users": { "total": user_stats.total_users, "today": user_stats.today_users },
            "recentQuotes": recent_quotes,
            "recentUsers": recent_users,
        },
    })))
}

pub async fn users(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Params(query): Params<UserQuery>,
) -> AppResult<Json<Value>> {
    let role = match utils::non_empty(query.role) {
        Some(role) => Some(
            role.parse::<Role>()
                .map_err(AppError::BadRequest)?,
        ),
        None => None,
    };
    let filter = UserFilter {
        search: utils::non_empty(query.search),
        role,
    };
    let request = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .request(ADMIN_PAGE, &state);
    let page = state.backend.users.list_users(&filter, request).await?;
    let pagination = page.pagination();
    let users: Vec<UserView> = page.items.into_iter().map(UserView::from).collect();
    Ok(Json(json!({
        "status": "success",
        "users": users,
        "pagination": pagination,
    })))
}

pub async fn set_user_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    PathId(id): PathId<Id>,
    Body(input): Body<StatusInput>,
) -> AppResult<Json<Value>> {
    let is_active = input.is_active.ok_or_else(|| {
        AppError::Validation(vec![crate::error::FieldError::new(
            "isActive",
            "must be a boolean",
        )])
    })?;
    if id == admin.id && !is_active {
        return Err(AppError::BadRequest("You cannot deactivate your own account".into()));
    }
    let update = UserUpdate {
        is_active: Some(is_active),
        ..UserUpdate::default()
    };
    let user = state
        .backend
        .users
        .update_user(id, update)
        .await?
        .ok_or(AppError::NotFound("User not found"))?;
    tracing::info!(id, is_active, by = %admin.username, "account status changed");
    Ok(Json(json!({
        "status": "success",
        "message": if is_active { "User activated" } else { "User deactivated" },
        "user": UserView::from(user),
    })))
}

pub async fn set_user_role(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    PathId(id): PathId<Id>,
    Body(input): Body<RoleInput>,
) -> AppResult<Json<Value>> {
    let role = input
        .role
        .as_deref()
        .map(str::parse::<Role>)
        .and_then(Result::ok)
        .ok_or_else(|| {
            AppError::Validation(vec![crate::error::FieldError::new(
                "role",
                "must be one of user, admin, moderator",
            )])
        })?;
    if id == admin.id && role != Role::Admin {
        return Err(AppError::BadRequest("You cannot remove your own admin role".into()));
    }
    let update = UserUpdate {
        role: Some(role),
        ..UserUpdate::default()
    };
    let user = state
        .backend
        .users
        .update_user(id, update)
        .await?
        .ok_or(AppError::NotFound("User not found"))?;
    tracing::info!(id, role = %role, by = %admin.username, "account role changed");
    Ok(Json(json!({
        "status": "success",
        "message": "Role updated",
        "user": UserView::from(user),
    })))
}

pub async fn quotes(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Params(query): Params<QuoteQuery>,
) -> AppResult<Json<Value>> {
    let approved = match query.status.as_deref() {
        Some("pending") => Some(false),
        Some("approved") => Some(true),
        _ => None,
    };
    let filter = QuoteFilter {
        search: utils::non_empty(query.search),
        approved,
        ..QuoteFilter::default()
    };
    let request = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .request(ADMIN_PAGE, &state);
    let page = state.backend.quotes.list_quotes(&filter, request).await?;
    let pagination = page.pagination();
    Ok(Json(json!({
        "status": "success",
        "quotes": page.items,
        "pagination": pagination,
    })))
}

pub async fn approve_quote(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    PathId(id): PathId<Id>,
) -> AppResult<Json<Value>> {
    let update = QuoteUpdate {
        is_approved: Some(true),
        ..QuoteUpdate::default()
    };
    let quote: Quote = state
        .backend
        .quotes
        .update_quote(id, update)
        .await?
        .ok_or(AppError::NotFound("Quote not found"))?;
    tracing::info!(id, by = %admin.username, "quote approved");
    Ok(Json(json!({
        "status": "success",
        "message": "Quote approved",
        "quote": quote,
    })))
}

pub async fn delete_quote(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    PathId(id): PathId<Id>,
) -> AppResult<Json<Value>> {
    if !state.backend.quotes.delete_quote(id).await? {
        return Err(AppError::NotFound("Quote not found"));
    }
    tracing::info!(id, by = %admin.username, "quote removed by admin");
    Ok(Json(json!({
        "status": "success",
        "message": "Quote deleted",
    })))
}

/// Period length in days. Unknown values fall back to a week.
fn period_days(period: Option<&str>) -> (&'static str, i64) {
    match period {
        Some("1d") => ("1d", 1),
        Some("30d") => ("30d", 30),
        _ => ("7d", 7),
    }
}

pub async fn analytics(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Params(query): Params<AnalyticsQuery>,
) -> AppResult<Json<Value>> {
    let (period, days) = period_days(query.period.as_deref());
    let since = Utc::now() - Duration::days(days);
    let per_day = state.backend.quotes.quotes_per_day(since).await?;
    let quote_stats = state.backend.quotes.quote_stats().await?;
    let user_stats = state.backend.users.user_stats().await?;
    let mut body = json!({
        "status": "success",
        "analytics": {
            "period": period,
            "quotesStats": per_day,
            "topAuthors": quote_stats.top_authors,
            "userStats": user_stats,
            "quoteStats": quote_stats,
        },
    });
    if let Some(doc) = &state.backend.document {
        body["analytics"]["document"] = doc.analytics().await;
    }
    Ok(Json(body))
}

pub async fn settings(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
) -> AppResult<Json<Value>> {
    let settings = document(&state)?.settings().await;
    Ok(Json(json!({
        "status": "success",
        "settings": settings,
    })))
}

pub async fn update_settings(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Body(updates): Body<Map<String, Value>>,
) -> AppResult<Json<Value>> {
    let doc = document(&state)?;
    if updates.is_empty() {
        return Err(AppError::BadRequest("No settings to update".into()));
    }
    let settings = doc
        .update_settings(updates)
        .await
        .map_err(StorageError::from)?;
    tracing::info!(by = %admin.username, "settings updated");
    Ok(Json(json!({
        "status": "success",
        "message": "Settings updated",
        "settings": settings,
    })))
}

pub async fn clear_cache(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> AppResult<Json<Value>> {
    document(&state)?.clear_cache().await;
    tracing::info!(by = %admin.username, "document cache cleared");
    Ok(Json(json!({
        "status": "success",
        "message": "Cache cleared",
    })))
}
