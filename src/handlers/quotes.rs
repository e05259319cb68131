use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use super::extract::{Body, ClientMeta, MaybePrincipal, Params, PathId};
use super::utils::{self, PageQuery};
use crate::AppState;
use crate::auth::Principal;
use crate::error::{AppError, AppResult, AuthError};
use crate::model::{DEFAULT_CATEGORY, Id, NewQuote, Quote, QuoteFilter, QuoteUpdate, Role};
use crate::validate::{self, CATEGORY_MAX, Checker, QUOTE_AUTHOR_MAX, QUOTE_TEXT_MAX};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub author: Option<String>,
    pub search: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct QuoteInput {
    pub text: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl QuoteInput {
    /// Check the fields that are present; `creating` makes text and author mandatory.
    fn check(&self, creating: bool) -> AppResult<()> {
        let mut check = Checker::new();
        match &self.text {
            Some(text) => check.length("text", text, 1, QUOTE_TEXT_MAX),
            None if creating => check.fail("text", "is required"),
            None => {}
        }
        match &self.author {
            Some(author) => check.length("author", author, 1, QUOTE_AUTHOR_MAX),
            None if creating => check.fail("author", "is required"),
            None => {}
        }
        if let Some(category) = &self.category {
            check.length("category", category, 1, CATEGORY_MAX);
        }
        if let Some(tags) = &self.tags {
            check.tags(&validate::normalize_tags(tags.clone()));
        }
        check.finish()
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string())
}

/// Admins see submitter metadata.
fn view(quote: Quote, viewer: Option<&Principal>) -> Quote {
    if viewer.is_some_and(|p| p.role() == Role::Admin) {
        quote
    } else {
        quote.public()
    }
}

pub async fn list(
    State(state): State<AppState>,
    Params(query): Params<ListQuery>,
) -> AppResult<Json<Value>> {
    let request = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .request(state.config.quotes.default_page_size, &state);
    let filter = QuoteFilter {
        author: utils::non_empty(query.author),
        search: utils::non_empty(query.search),
        category: utils::non_empty(query.category),
        approved: Some(true),
    };
    let page = state.backend.quotes.list_quotes(&filter, request).await?;
    let pagination = page.pagination();
    let quotes: Vec<Quote> = page.items.into_iter().map(Quote::public).collect();
    Ok(Json(json!({
        "status": "success",
        "quotes": quotes,
        "pagination": pagination,
    })))
}

pub async fn create(
    State(state): State<AppState>,
    MaybePrincipal(principal): MaybePrincipal,
    meta: ClientMeta,
    Body(input): Body<QuoteInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    if state.config.quotes.require_auth && principal.is_none() {
        return Err(AuthError::Required.into());
    }
    input.check(true)?;
    let moderator = principal.as_ref().is_some_and(|p| p.role().can_moderate());
    let is_approved = moderator || !utils::require_approval(&state).await;
    let new = NewQuote {
        text: trimmed(input.text).unwrap_or_default(),
        author: trimmed(input.author).unwrap_or_default(),
        user_id: principal.as_ref().map(Principal::user_ref),
        username: principal.as_ref().map(Principal::display_name),
        category: utils::non_empty(input.category).unwrap_or_else(|| DEFAULT_CATEGORY.into()),
        tags: validate::normalize_tags(input.tags.unwrap_or_default()),
        is_approved,
        ip: meta.ip,
        user_agent: meta.user_agent,
    };
    let quote = state.backend.quotes.create_quote(new).await?;
    tracing::info!(id = quote.id, approved = quote.is_approved, "quote created");
    let message = if quote.is_approved {
        "Quote created"
    } else {
        "Quote submitted for moderation"
    };
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": message,
            "quote": view(quote, principal.as_ref()),
        })),
    ))
}

pub async fn get_one(
    State(state): State<AppState>,
    MaybePrincipal(principal): MaybePrincipal,
    PathId(id): PathId<Id>,
) -> AppResult<Json<Value>> {
    let quote = state
        .backend
        .quotes
        .get_quote(id)
        .await?
        .filter(|q| q.is_approved || principal.as_ref().is_some_and(|p| p.may_modify(q)))
        .ok_or(AppError::NotFound("Quote not found"))?;
    Ok(Json(json!({
        "status": "success",
        "quote": view(quote, principal.as_ref()),
    })))
}

async fn owned_quote(state: &AppState, principal: &Principal, id: Id) -> AppResult<Quote> {
    let quote = state
        .backend
        .quotes
        .get_quote(id)
        .await?
        .ok_or(AppError::NotFound("Quote not found"))?;
    if !principal.may_modify(&quote) {
        tracing::warn!(id, caller = %principal.user_ref(), "quote change refused");
        return Err(AppError::Forbidden("You can only change your own quotes"));
    }
    Ok(quote)
}

pub async fn update(
    State(state): State<AppState>,
    principal: Principal,
    PathId(id): PathId<Id>,
    Body(input): Body<QuoteInput>,
) -> AppResult<Json<Value>> {
    input.check(false)?;
    let update = QuoteUpdate {
        text: trimmed(input.text),
        author: trimmed(input.author),
        category: trimmed(input.category),
        tags: input.tags.map(validate::normalize_tags),
        is_approved: None,
    };
    if update.is_empty() {
        return Err(AppError::BadRequest("No fields to update".into()));
    }
    owned_quote(&state, &principal, id).await?;
    let quote = state
        .backend
        .quotes
        .update_quote(id, update)
        .await?
        .ok_or(AppError::NotFound("Quote not found"))?;
    tracing::info!(id, "quote updated");
    Ok(Json(json!({
        "status": "success",
        "message": "Quote updated",
        "quote": view(quote, Some(&principal)),
    })))
}

pub async fn delete(
    State(state): State<AppState>,
    principal: Principal,
    PathId(id): PathId<Id>,
) -> AppResult<Json<Value>> {
    owned_quote(&state, &principal, id).await?;
    if !state.backend.quotes.delete_quote(id).await? {
        return Err(AppError::NotFound("Quote not found"));
    }
    tracing::info!(id, "quote deleted");
    Ok(Json(json!({
        "status": "success",
        "message": "Quote deleted",
    })))
}

pub async fn random(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let quote = state
        .backend
        .quotes
        .random_quote()
        .await?
        .ok_or(AppError::NotFound("No quotes found"))?;
    Ok(Json(json!({
        "status": "success",
        "quote": quote.public(),
    })))
}

pub async fn stats(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let stats = state.backend.quotes.quote_stats().await?;
    Ok(Json(json!({
        "status": "success",
        "stats": stats,
    })))
}
