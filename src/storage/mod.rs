use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::Config;
use crate::document::DocumentStore;
use crate::error::StorageError;
use crate::model::{
    DayCount, Id, NewQuote, NewUser, Page, PageRequest, Quote, QuoteFilter, QuoteStats,
    QuoteUpdate, User, UserFilter, UserStats, UserUpdate,
};

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait QuoteStore: Send + Sync {
    /// Insert a quote and return it with its assigned id and timestamps
    async fn create_quote(&self, quote: NewQuote) -> StorageResult<Quote>;

    /// Retrieve a quote by id
    async fn get_quote(&self, id: Id) -> StorageResult<Option<Quote>>;

    /// Page through quotes matching `filter`, newest first
    async fn list_quotes(&self, filter: &QuoteFilter, page: PageRequest)
    -> StorageResult<Page<Quote>>;

    /// Apply a partial update. Returns `None` if the quote does not exist
    async fn update_quote(&self, id: Id, update: QuoteUpdate) -> StorageResult<Option<Quote>>;

    /// Delete a quote. Returns `false` if it did not exist
    async fn delete_quote(&self, id: Id) -> StorageResult<bool>;

    /// Pick a uniformly random approved quote
    async fn random_quote(&self) -> StorageResult<Option<Quote>>;

    /// Totals, today's count, top authors and per-category counts
    async fn quote_stats(&self) -> StorageResult<QuoteStats>;

    /// Quotes created at or after `since`, bucketed by UTC day
    async fn quotes_per_day(&self, since: DateTime<Utc>) -> StorageResult<Vec<DayCount>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert an account. Fails with [`StorageError::Duplicate`] if the
    /// username or email is taken
    async fn create_user(&self, user: NewUser) -> StorageResult<User>;

    async fn get_user(&self, id: Id) -> StorageResult<Option<User>>;

    /// Find an account by username or email, both compared lowercase
    async fn find_user_by_login(&self, login: &str) -> StorageResult<Option<User>>;

    async fn list_users(&self, filter: &UserFilter, page: PageRequest)
    -> StorageResult<Page<User>>;

    /// Apply a partial update. Returns `None` if the account does not exist
    async fn update_user(&self, id: Id, update: UserUpdate) -> StorageResult<Option<User>>;

    async fn user_stats(&self) -> StorageResult<UserStats>;
}

pub type DynQuotes = Arc<dyn QuoteStore>;
pub type DynUsers = Arc<dyn UserStore>;

/// The active storage backend.
#[derive(Clone)]
pub struct Backend {
    pub quotes: DynQuotes,
    pub users: DynUsers,
    /// Set only for the document backend, which also exposes settings and cache control.
    pub document: Option<Arc<DocumentStore>>,
    pub kind: &'static str,
}

impl Backend {
    /// Verify the backend is reachable.
    pub async fn test_connection(&self) -> StorageResult<()> {
        match &self.document {
            Some(doc) => Ok(doc.test_connection().await?),
            None => self.quotes.quote_stats().await.map(|_| ()),
        }
    }
}

pub mod common;
pub mod github;
#[cfg(feature = "mysql")]
pub mod mysql;
pub mod sqlite;

/// Create the storage backend named by `cfg.storage`.
pub async fn open(cfg: &Config) -> Result<Backend, Box<dyn std::error::Error + Send + Sync>> {
    let uri = cfg.storage.as_str();
    if uri.starts_with("sqlite:") {
        let store = Arc::new(sqlite::SqliteStore::new(uri).await?);
        Ok(Backend {
            quotes: store.clone(),
            users: store,
            document: None,
            kind: "sqlite",
        })
    } else if uri.starts_with("mysql:") {
        #[cfg(feature = "mysql")]
        {
            let store = Arc::new(mysql::MySqlStore::new(uri).await?);
            Ok(Backend {
                quotes: store.clone(),
                users: store,
                document: None,
                kind: "mysql",
            })
        }
        #[cfg(not(feature = "mysql"))]
        {
            Err("mysql backend not enabled".into())
        }
    } else if uri == "github" {
        let doc = Arc::new(DocumentStore::from_config(&cfg.github)?);
        Ok(github::backend(doc))
    } else {
        Err("unknown storage backend".into())
    }
}
