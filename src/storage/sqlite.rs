use super::{
    QuoteStore, StorageResult, UserStore,
    common::{self, Param, QuoteRow, UserRow, sql},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use sqlx::{
    Sqlite, SqlitePool,
    query::QueryAs,
    sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions},
};
use std::{error::Error, str::FromStr};

use crate::model::{
    DayCount, Id, NewQuote, NewUser, Page, PageRequest, Quote, QuoteFilter, QuoteStats,
    QuoteUpdate, User, UserFilter, UserStats, UserUpdate,
};

type Query<'q, O> = QueryAs<'q, Sqlite, O, SqliteArguments<'q>>;

fn bind_params<'q, O>(mut query: Query<'q, O>, params: &[Param]) -> Query<'q, O> {
    for param in params {
        query = match param {
            Param::Text(s) => query.bind(s.clone()),
            Param::Bool(b) => query.bind(*b),
        };
    }
    query
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    #[tracing::instrument(skip_all)]
    /// Open (creating if missing) the SQLite database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(path: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| {
                format!(
                    "Invalid SQLite database URI '{path}': {e}

Please ensure the URI is in the correct format:
- File database: sqlite:///path/to/quotes.db
- In-memory database: sqlite::memory:"
                )
            })?
            .create_if_missing(true);

        // Every connection to an in-memory URI is a separate database, so keep one alive.
        let memory = path.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new().max_connections(if memory { 1 } else { 5 });
        if memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| format!("Failed to connect to SQLite database '{path}': {e}"))?;

        sqlx::query(sql::QUOTES_TABLE_SQLITE).execute(&pool).await?;
        sqlx::query(sql::USERS_TABLE_SQLITE).execute(&pool).await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS quotes_created ON quotes (created_at)")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl QuoteStore for SqliteStore {
    #[tracing::instrument(skip_all)]
    async fn create_quote(&self, quote: NewQuote) -> StorageResult<Quote> {
        let (ms, now) = common::now_millis();
        let tags = serde_json::to_string(&quote.tags)?;
        let result = sqlx::query(sql::INSERT_QUOTE)
            .bind(&quote.text)
            .bind(&quote.author)
            .bind(&quote.user_id)
            .bind(&quote.username)
            .bind(&quote.category)
            .bind(tags)
            .bind(quote.is_approved)
            .bind(&quote.ip)
            .bind(&quote.user_agent)
            .bind(ms)
            .bind(ms)
            .execute(&self.pool)
            .await?;
        Ok(common::quote_from_new(result.last_insert_rowid(), quote, now))
    }

    #[tracing::instrument(skip_all)]
    async fn get_quote(&self, id: Id) -> StorageResult<Option<Quote>> {
        let row: Option<QuoteRow> = sqlx::query_as(&format!(
            "SELECT {} FROM quotes WHERE id = ?",
            sql::QUOTE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Quote::try_from).transpose()
    }

    #[tracing::instrument(skip_all)]
    async fn list_quotes(
        &self,
        filter: &QuoteFilter,
        page: PageRequest,
    ) -> StorageResult<Page<Quote>> {
        let (clause, params) = common::quote_where(filter);
        let count_sql = format!("SELECT COUNT(*) FROM quotes{clause}");
        let (total,): (i64,) = bind_params(sqlx::query_as(&count_sql), &params)
            .fetch_one(&self.pool)
            .await?;
        let list_sql = format!(
            "SELECT {} FROM quotes{clause}{} LIMIT ? OFFSET ?",
            sql::QUOTE_COLUMNS,
            sql::ORDER_NEWEST
        );
        let rows: Vec<QuoteRow> = bind_params(sqlx::query_as(&list_sql), &params)
            .bind(i64::from(page.limit))
            .bind(i64::try_from(page.offset()).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        Ok(Page {
            items: rows
                .into_iter()
                .map(Quote::try_from)
                .collect::<StorageResult<_>>()?,
            total: common::count(total),
            request: page,
        })
    }

    #[tracing::instrument(skip_all)]
    async fn update_quote(&self, id: Id, update: QuoteUpdate) -> StorageResult<Option<Quote>> {
        let mut tx = self.pool.begin().await?;
        let row: Option<QuoteRow> = sqlx::query_as(&format!(
            "SELECT {} FROM quotes WHERE id = ?",
            sql::QUOTE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut quote = Quote::try_from(row)?;
        let (ms, now) = common::now_millis();
        common::apply_quote_update(&mut quote, update, now);
        sqlx::query(sql::UPDATE_QUOTE)
            .bind(&quote.text)
            .bind(&quote.author)
            .bind(&quote.category)
            .bind(serde_json::to_string(&quote.tags)?)
            .bind(quote.is_approved)
            .bind(ms)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(quote))
    }

    #[tracing::instrument(skip_all)]
    async fn delete_quote(&self, id: Id) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM quotes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip_all)]
    async fn random_quote(&self) -> StorageResult<Option<Quote>> {
        let (approved,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM quotes WHERE is_approved = ?")
            .bind(true)
            .fetch_one(&self.pool)
            .await?;
        if approved <= 0 {
            return Ok(None);
        }
        let offset = rand::thread_rng().gen_range(0..approved);
        let row: Option<QuoteRow> = sqlx::query_as(&format!(
            "SELECT {} FROM quotes WHERE is_approved = ? ORDER BY id LIMIT 1 OFFSET ?",
            sql::QUOTE_COLUMNS
        ))
        .bind(true)
        .bind(offset)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Quote::try_from).transpose()
    }

    #[tracing::instrument(skip_all)]
    async fn quote_stats(&self) -> StorageResult<QuoteStats> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM quotes")
            .fetch_one(&self.pool)
            .await?;
        let midnight = common::start_of_day(Utc::now()).timestamp_millis();
        let (today,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM quotes WHERE created_at >= ?")
            .bind(midnight)
            .fetch_one(&self.pool)
            .await?;
        let authors: Vec<(String, i64)> = sqlx::query_as(sql::TOP_AUTHORS)
            .fetch_all(&self.pool)
            .await?;
        let categories: Vec<(String, i64)> = sqlx::query_as(sql::CATEGORY_COUNTS)
            .fetch_all(&self.pool)
            .await?;
        Ok(QuoteStats {
            total_quotes: common::count(total),
            today_quotes: common::count(today),
            top_authors: common::top_authors(
                authors
                    .into_iter()
                    .map(|(a, n)| (a, common::count(n)))
                    .collect(),
            ),
            category_stats: common::counts(categories),
        })
    }

    #[tracing::instrument(skip_all)]
    async fn quotes_per_day(&self, since: DateTime<Utc>) -> StorageResult<Vec<DayCount>> {
        let stamps: Vec<(i64,)> = sqlx::query_as("SELECT created_at FROM quotes WHERE created_at >= ?")
            .bind(since.timestamp_millis())
            .fetch_all(&self.pool)
            .await?;
        Ok(common::per_day(
            stamps.into_iter().map(|(ms,)| common::from_millis(ms)),
        ))
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    #[tracing::instrument(skip_all)]
    async fn create_user(&self, user: NewUser) -> StorageResult<User> {
        let (ms, now) = common::now_millis();
        let username = common::normalize_login(&user.username);
        let email = common::normalize_login(&user.email);
        let result = sqlx::query(sql::INSERT_USER)
            .bind(&username)
            .bind(&email)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(true)
            .bind(&user.ip)
            .bind(&user.user_agent)
            .bind(ms)
            .bind(ms)
            .execute(&self.pool)
            .await?;
        Ok(User {
            id: result.last_insert_rowid(),
            username,
            email,
            password_hash: user.password_hash,
            role: user.role,
            is_active: true,
            ip: user.ip,
            user_agent: user.user_agent,
            last_login_at: None,
            last_login_ip: None,
            created_at: now,
            updated_at: now,
        })
    }

    #[tracing::instrument(skip_all)]
    async fn get_user(&self, id: Id) -> StorageResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE id = ?",
            sql::USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    #[tracing::instrument(skip_all)]
    async fn find_user_by_login(&self, login: &str) -> StorageResult<Option<User>> {
        let login = common::normalize_login(login);
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE username = ? OR email = ?",
            sql::USER_COLUMNS
        ))
        .bind(&login)
        .bind(&login)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    #[tracing::instrument(skip_all)]
    async fn list_users(&self, filter: &UserFilter, page: PageRequest) -> StorageResult<Page<User>> {
        let (clause, params) = common::user_where(filter);
        let count_sql = format!("SELECT COUNT(*) FROM users{clause}");
        let (total,): (i64,) = bind_params(sqlx::query_as(&count_sql), &params)
            .fetch_one(&self.pool)
            .await?;
        let list_sql = format!(
            "SELECT {} FROM users{clause}{} LIMIT ? OFFSET ?",
            sql::USER_COLUMNS,
            sql::ORDER_NEWEST
        );
        let rows: Vec<UserRow> = bind_params(sqlx::query_as(&list_sql), &params)
            .bind(i64::from(page.limit))
            .bind(i64::try_from(page.offset()).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        Ok(Page {
            items: rows
                .into_iter()
                .map(User::try_from)
                .collect::<StorageResult<_>>()?,
            total: common::count(total),
            request: page,
        })
    }

    #[tracing::instrument(skip_all)]
    async fn update_user(&self, id: Id, update: UserUpdate) -> StorageResult<Option<User>> {
        let mut tx = self.pool.begin().await?;
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE id = ?",
            sql::USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut user = User::try_from(row)?;
        let (ms, now) = common::now_millis();
        let update = UserUpdate {
            email: update.email.map(|e| common::normalize_login(&e)),
            ..update
        };
        common::apply_user_update(&mut user, update, now);
        sqlx::query(sql::UPDATE_USER)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(user.is_active)
            .bind(user.last_login_at.map(|t| t.timestamp_millis()))
            .bind(&user.last_login_ip)
            .bind(ms)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(user))
    }

    #[tracing::instrument(skip_all)]
    async fn user_stats(&self) -> StorageResult<UserStats> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        let (active,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE is_active = ?")
            .bind(true)
            .fetch_one(&self.pool)
            .await?;
        let midnight = common::start_of_day(Utc::now()).timestamp_millis();
        let (today,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE created_at >= ?")
            .bind(midnight)
            .fetch_one(&self.pool)
            .await?;
        let roles: Vec<(String, i64)> = sqlx::query_as(sql::ROLE_COUNTS)
            .fetch_all(&self.pool)
            .await?;
        Ok(UserStats {
            total_users: common::count(total),
            active_users: common::count(active),
            today_users: common::count(today),
            role_stats: common::counts(roles),
        })
    }
}
