//! Quote and user stores over the JSON document.

use super::{Backend, QuoteStore, StorageResult, UserStore, common};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::document::{Collection, Document, DocumentError, DocumentStore};
use crate::error::StorageError;
use crate::model::{
    DayCount, Id, NewQuote, NewUser, Page, PageRequest, Quote, QuoteFilter, QuoteStats,
    QuoteUpdate, Role, User, UserFilter, UserStats, UserUpdate,
};

#[derive(Clone)]
pub struct GithubStore {
    doc: Arc<DocumentStore>,
}

/// Wrap `doc` as the active backend.
pub fn backend(doc: Arc<DocumentStore>) -> Backend {
    let store = Arc::new(GithubStore { doc: doc.clone() });
    Backend {
        quotes: store.clone(),
        users: store,
        document: Some(doc),
        kind: "github",
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QuoteFields<'a> {
    text: &'a str,
    author: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    category: &'a str,
    tags: &'a [String],
    likes: i64,
    is_approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    ip: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_agent: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserFields<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
    role: Role,
    is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    ip: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_agent: Option<&'a str>,
    last_login_at: Option<DateTime<Utc>>,
    last_login_ip: Option<&'a str>,
}

fn to_fields<T: Serialize>(value: &T) -> StorageResult<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Err(StorageError::Remote("record did not serialize to an object".into())),
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> StorageResult<T> {
    Ok(serde_json::from_value(value)?)
}

/// Typed view of a collection. Records that do not decode are skipped.
fn records<T: DeserializeOwned>(doc: &Document, collection: Collection) -> Vec<T> {
    doc.items(collection)
        .iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(
                    collection = collection.key(),
                    id = ?item.get("id"),
                    error = %e,
                    "skipping malformed record"
                );
                None
            }
        })
        .collect()
}

fn field_eq(item: &Value, key: &str, wanted: &str) -> bool {
    item.get(key)
        .and_then(Value::as_str)
        .is_some_and(|v| v.eq_ignore_ascii_case(wanted))
}

impl GithubStore {
    async fn quotes(&self) -> Vec<Quote> {
        records(&self.doc.fetch().await, Collection::Quotes)
    }

    async fn users(&self) -> Vec<User> {
        records(&self.doc.fetch().await, Collection::Users)
    }
}

#[async_trait]
impl QuoteStore for GithubStore {
    #[tracing::instrument(skip_all)]
    async fn create_quote(&self, quote: NewQuote) -> StorageResult<Quote> {
        let fields = to_fields(&QuoteFields {
            text: &quote.text,
            author: &quote.author,
            user_id: quote.user_id.as_deref(),
            username: quote.username.as_deref(),
            category: &quote.category,
            tags: &quote.tags,
            likes: 0,
            is_approved: quote.is_approved,
            ip: quote.ip.as_deref(),
            user_agent: quote.user_agent.as_deref(),
        })?;
        let stored = self
            .doc
            .add_to_collection(Collection::Quotes, Value::Object(fields))
            .await?;
        decode(stored)
    }

    #[tracing::instrument(skip_all)]
    async fn get_quote(&self, id: Id) -> StorageResult<Option<Quote>> {
        self.doc
            .find_by_id(Collection::Quotes, id)
            .await
            .map(decode)
            .transpose()
    }

    #[tracing::instrument(skip_all)]
    async fn list_quotes(
        &self,
        filter: &QuoteFilter,
        page: PageRequest,
    ) -> StorageResult<Page<Quote>> {
        let mut quotes: Vec<Quote> = self
            .quotes()
            .await
            .into_iter()
            .filter(|q| filter.matches(q))
            .collect();
        common::sort_newest(&mut quotes, |q| (q.created_at, q.id));
        Ok(Page::slice(quotes, page))
    }

    #[tracing::instrument(skip_all)]
    async fn update_quote(&self, id: Id, update: QuoteUpdate) -> StorageResult<Option<Quote>> {
        let fields = to_fields(&update)?;
        match self
            .doc
            .update_in_collection(Collection::Quotes, id, fields)
            .await
        {
            Ok(stored) => decode(stored).map(Some),
            Err(DocumentError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip_all)]
    async fn delete_quote(&self, id: Id) -> StorageResult<bool> {
        match self
            .doc
            .remove_from_collection(Collection::Quotes, id)
            .await
        {
            Ok(()) => Ok(true),
            Err(DocumentError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip_all)]
    async fn random_quote(&self) -> StorageResult<Option<Quote>> {
        let approved: Vec<Quote> = self
            .quotes()
            .await
            .into_iter()
            .filter(|q| q.is_approved)
            .collect();
        Ok(approved.choose(&mut rand::thread_rng()).cloned())
    }

    #[tracing::instrument(skip_all)]
    async fn quote_stats(&self) -> StorageResult<QuoteStats> {
        Ok(common::quote_stats(&self.quotes().await, Utc::now()))
    }

    #[tracing::instrument(skip_all)]
    async fn quotes_per_day(&self, since: DateTime<Utc>) -> StorageResult<Vec<DayCount>> {
        Ok(common::per_day(
            self.quotes()
                .await
                .into_iter()
                .map(|q| q.created_at)
                .filter(|at| *at >= since),
        ))
    }
}

#[async_trait]
impl UserStore for GithubStore {
    #[tracing::instrument(skip_all)]
    async fn create_user(&self, user: NewUser) -> StorageResult<User> {
        let username = common::normalize_login(&user.username);
        let email = common::normalize_login(&user.email);
        let fields = Value::Object(to_fields(&UserFields {
            username: &username,
            email: &email,
            password: &user.password_hash,
            role: user.role,
            is_active: true,
            ip: user.ip.as_deref(),
            user_agent: user.user_agent.as_deref(),
            last_login_at: None,
            last_login_ip: None,
        })?);
        let stored = self
            .doc
            .mutate(|doc| {
                let taken = doc.items(Collection::Users).iter().any(|u| {
                    field_eq(u, "username", &username) || field_eq(u, "email", &email)
                });
                if taken {
                    return Err(DocumentError::Duplicate("username or email".into()));
                }
                doc.add(Collection::Users, fields.clone())
            })
            .await?;
        decode(stored)
    }

    #[tracing::instrument(skip_all)]
    async fn get_user(&self, id: Id) -> StorageResult<Option<User>> {
        self.doc
            .find_by_id(Collection::Users, id)
            .await
            .map(decode)
            .transpose()
    }

    #[tracing::instrument(skip_all)]
    async fn find_user_by_login(&self, login: &str) -> StorageResult<Option<User>> {
        let login = common::normalize_login(login);
        Ok(self
            .users()
            .await
            .into_iter()
            .find(|u| u.username == login || u.email == login))
    }

    #[tracing::instrument(skip_all)]
    async fn list_users(&self, filter: &UserFilter, page: PageRequest) -> StorageResult<Page<User>> {
        let mut users: Vec<User> = self
            .users()
            .await
            .into_iter()
            .filter(|u| filter.matches(u))
            .collect();
        common::sort_newest(&mut users, |u| (u.created_at, u.id));
        Ok(Page::slice(users, page))
    }

    #[tracing::instrument(skip_all)]
    async fn update_user(&self, id: Id, update: UserUpdate) -> StorageResult<Option<User>> {
        let update = UserUpdate {
            email: update.email.map(|e| common::normalize_login(&e)),
            ..update
        };
        let new_email = update.email.clone();
        let fields = to_fields(&update)?;
        let result = self
            .doc
            .mutate(|doc| {
                if let Some(email) = &new_email {
                    let taken = doc.items(Collection::Users).iter().any(|u| {
                        field_eq(u, "email", email)
                            && u.get("id").and_then(Value::as_i64) != Some(id)
                    });
                    if taken {
                        return Err(DocumentError::Duplicate("email".into()));
                    }
                }
                doc.update(Collection::Users, id, fields.clone())
            })
            .await;
        match result {
            Ok(stored) => decode(stored).map(Some),
            Err(DocumentError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip_all)]
    async fn user_stats(&self) -> StorageResult<UserStats> {
        Ok(common::user_stats(&self.users().await, Utc::now()))
    }
}
