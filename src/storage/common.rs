//! Pieces shared by the storage backends.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};

use crate::error::StorageError;
use crate::model::{
    AuthorCount, DayCount, Id, NewQuote, Quote, QuoteFilter, QuoteStats, QuoteUpdate, User,
    UserFilter, UserStats, UserUpdate,
};

pub const TOP_AUTHORS: usize = 10;

/// SQL shared between the SQLite and MySQL backends. Both use `?` placeholders.
pub mod sql {
    pub const QUOTES_TABLE_SQLITE: &str = "CREATE TABLE IF NOT EXISTS quotes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            text TEXT NOT NULL,
            author TEXT NOT NULL,
            user_id TEXT,
            username TEXT,
            category TEXT NOT NULL DEFAULT 'general',
            tags TEXT NOT NULL DEFAULT '[]',
            likes INTEGER NOT NULL DEFAULT 0,
            is_approved BOOLEAN NOT NULL DEFAULT 1,
            ip TEXT,
            user_agent TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )";

    pub const USERS_TABLE_SQLITE: &str = "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'user',
            is_active BOOLEAN NOT NULL DEFAULT 1,
            ip TEXT,
            user_agent TEXT,
            last_login_at INTEGER,
            last_login_ip TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )";

    pub const QUOTES_TABLE_MYSQL: &str = "CREATE TABLE IF NOT EXISTS quotes (
            id BIGINT PRIMARY KEY AUTO_INCREMENT,
            text VARCHAR(1000) NOT NULL,
            author VARCHAR(100) NOT NULL,
            user_id VARCHAR(64),
            username VARCHAR(100),
            category VARCHAR(50) NOT NULL DEFAULT 'general',
            tags TEXT NOT NULL,
            likes BIGINT NOT NULL DEFAULT 0,
            is_approved BOOLEAN NOT NULL DEFAULT TRUE,
            ip VARCHAR(64),
            user_agent VARCHAR(512),
            created_at BIGINT NOT NULL,
            updated_at BIGINT NOT NULL,
            INDEX quotes_created (created_at)
        ) CHARACTER SET utf8mb4";

    pub const USERS_TABLE_MYSQL: &str = "CREATE TABLE IF NOT EXISTS users (
            id BIGINT PRIMARY KEY AUTO_INCREMENT,
            username VARCHAR(30) NOT NULL UNIQUE,
            email VARCHAR(255) NOT NULL UNIQUE,
            password_hash VARCHAR(255) NOT NULL,
            role VARCHAR(16) NOT NULL DEFAULT 'user',
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            ip VARCHAR(64),
            user_agent VARCHAR(512),
            last_login_at BIGINT,
            last_login_ip VARCHAR(64),
            created_at BIGINT NOT NULL,
            updated_at BIGINT NOT NULL
        ) CHARACTER SET utf8mb4";

    pub const QUOTE_COLUMNS: &str = "id, text, author, user_id, username, category, tags, \
        likes, is_approved, ip, user_agent, created_at, updated_at";

    pub const USER_COLUMNS: &str = "id, username, email, password_hash, role, is_active, ip, \
        user_agent, last_login_at, last_login_ip, created_at, updated_at";

    pub const INSERT_QUOTE: &str = "INSERT INTO quotes (text, author, user_id, username, \
        category, tags, likes, is_approved, ip, user_agent, created_at, updated_at) \
        VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?)";

    pub const UPDATE_QUOTE: &str = "UPDATE quotes SET text = ?, author = ?, category = ?, \
        tags = ?, is_approved = ?, updated_at = ? WHERE id = ?";

    pub const INSERT_USER: &str = "INSERT INTO users (username, email, password_hash, role, \
        is_active, ip, user_agent, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)";

    pub const UPDATE_USER: &str = "UPDATE users SET email = ?, password_hash = ?, role = ?, \
        is_active = ?, last_login_at = ?, last_login_ip = ?, updated_at = ? WHERE id = ?";

    pub const ORDER_NEWEST: &str = " ORDER BY created_at DESC, id DESC";

    pub const TOP_AUTHORS: &str = "SELECT author, COUNT(*) AS n FROM quotes \
        GROUP BY author ORDER BY n DESC, author ASC LIMIT 10";

    pub const CATEGORY_COUNTS: &str = "SELECT category, COUNT(*) FROM quotes GROUP BY category";

    pub const ROLE_COUNTS: &str = "SELECT role, COUNT(*) FROM users GROUP BY role";
}

/// A bound value for a dynamically built `WHERE` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Text(String),
    Bool(bool),
}

/// Escape character for `LIKE`, written the same in SQLite and MySQL literals.
const LIKE_ESCAPE: char = '!';

/// Substring pattern for `LIKE ... ESCAPE '!'` that matches `needle` literally.
fn like_pattern(needle: &str) -> Param {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.to_lowercase().chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(c);
    }
    pattern.push('%');
    Param::Text(pattern)
}

/// `WHERE` clause (possibly empty) and its parameters for a quote filter.
#[must_use]
pub fn quote_where(filter: &QuoteFilter) -> (String, Vec<Param>) {
    let mut clauses = Vec::new();
    let mut params = Vec::new();
    if let Some(approved) = filter.approved {
        clauses.push("is_approved = ?");
        params.push(Param::Bool(approved));
    }
    if let Some(author) = &filter.author {
        clauses.push("LOWER(author) LIKE ? ESCAPE '!'");
        params.push(like_pattern(author));
    }
    if let Some(category) = &filter.category {
        clauses.push("LOWER(category) = ?");
        params.push(Param::Text(category.to_lowercase()));
    }
    if let Some(search) = &filter.search {
        clauses.push("(LOWER(text) LIKE ? ESCAPE '!' OR LOWER(author) LIKE ? ESCAPE '!')");
        params.push(like_pattern(search));
        params.push(like_pattern(search));
    }
    (where_clause(&clauses), params)
}

#[must_use]
pub fn user_where(filter: &UserFilter) -> (String, Vec<Param>) {
    let mut clauses = Vec::new();
    let mut params = Vec::new();
    if let Some(role) = filter.role {
        clauses.push("role = ?");
        params.push(Param::Text(role.as_str().into()));
    }
    if let Some(search) = &filter.search {
        clauses.push("(LOWER(username) LIKE ? ESCAPE '!' OR LOWER(email) LIKE ? ESCAPE '!')");
        params.push(like_pattern(search));
        params.push(like_pattern(search));
    }
    (where_clause(&clauses), params)
}

fn where_clause(clauses: &[&str]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct QuoteRow {
    pub id: i64,
    pub text: String,
    pub author: String,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub category: String,
    pub tags: String,
    pub likes: i64,
    pub is_approved: bool,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<QuoteRow> for Quote {
    type Error = StorageError;

    fn try_from(row: QuoteRow) -> Result<Self, Self::Error> {
        Ok(Quote {
            id: row.id,
            text: row.text,
            author: row.author,
            user_id: row.user_id,
            username: row.username,
            category: row.category,
            tags: serde_json::from_str(&row.tags)?,
            likes: row.likes,
            is_approved: row.is_approved,
            ip: row.ip,
            user_agent: row.user_agent,
            created_at: from_millis(row.created_at),
            updated_at: from_millis(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub last_login_at: Option<i64>,
    pub last_login_ip: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<UserRow> for User {
    type Error = StorageError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            role: row
                .role
                .parse()
                .map_err(|e: String| StorageError::Database(e.into()))?,
            is_active: row.is_active,
            ip: row.ip,
            user_agent: row.user_agent,
            last_login_at: row.last_login_at.map(from_millis),
            last_login_ip: row.last_login_ip,
            created_at: from_millis(row.created_at),
            updated_at: from_millis(row.updated_at),
        })
    }
}

#[must_use]
pub fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Current time truncated to the millisecond precision the SQL tables keep.
#[must_use]
pub fn now_millis() -> (i64, DateTime<Utc>) {
    let ms = Utc::now().timestamp_millis();
    (ms, from_millis(ms))
}

/// Midnight UTC of the day containing `now`.
#[must_use]
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map_or(now, |midnight| midnight.and_utc())
}

/// Build a quote record from input; shared by backends that stamp in-process.
#[must_use]
pub fn quote_from_new(id: Id, new: NewQuote, now: DateTime<Utc>) -> Quote {
    Quote {
        id,
        text: new.text,
        author: new.author,
        user_id: new.user_id,
        username: new.username,
        category: new.category,
        tags: new.tags,
        likes: 0,
        is_approved: new.is_approved,
        ip: new.ip,
        user_agent: new.user_agent,
        created_at: now,
        updated_at: now,
    }
}

pub fn apply_quote_update(quote: &mut Quote, update: QuoteUpdate, now: DateTime<Utc>) {
    if let Some(text) = update.text {
        quote.text = text;
    }
    if let Some(author) = update.author {
        quote.author = author;
    }
    if let Some(category) = update.category {
        quote.category = category;
    }
    if let Some(tags) = update.tags {
        quote.tags = tags;
    }
    if let Some(approved) = update.is_approved {
        quote.is_approved = approved;
    }
    quote.updated_at = now;
}

pub fn apply_user_update(user: &mut User, update: UserUpdate, now: DateTime<Utc>) {
    if let Some(email) = update.email {
        user.email = email;
    }
    if let Some(hash) = update.password_hash {
        user.password_hash = hash;
    }
    if let Some(role) = update.role {
        user.role = role;
    }
    if let Some(active) = update.is_active {
        user.is_active = active;
    }
    if let Some(at) = update.last_login_at {
        user.last_login_at = Some(at);
    }
    if let Some(ip) = update.last_login_ip {
        user.last_login_ip = Some(ip);
    }
    user.updated_at = now;
}

/// Newest first, ties broken by higher id.
pub fn sort_newest<T>(items: &mut [T], key: impl Fn(&T) -> (DateTime<Utc>, Id)) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

/// Order author counts by count descending then name, keeping the top entries.
#[must_use]
pub fn top_authors(counts: HashMap<String, u64>) -> Vec<AuthorCount> {
    let mut authors: Vec<AuthorCount> = counts
        .into_iter()
        .map(|(author, count)| AuthorCount { author, count })
        .collect();
    authors.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.author.cmp(&b.author)));
    authors.truncate(TOP_AUTHORS);
    authors
}

#[must_use]
pub fn quote_stats(quotes: &[Quote], now: DateTime<Utc>) -> QuoteStats {
    let today = now.date_naive();
    let mut authors: HashMap<String, u64> = HashMap::new();
    let mut categories: BTreeMap<String, u64> = BTreeMap::new();
    for quote in quotes {
        *authors.entry(quote.author.clone()).or_default() += 1;
        *categories.entry(quote.category.clone()).or_default() += 1;
    }
    QuoteStats {
        total_quotes: quotes.len() as u64,
        today_quotes: quotes
            .iter()
            .filter(|q| q.created_at.date_naive() == today)
            .count() as u64,
        top_authors: top_authors(authors),
        category_stats: categories,
    }
}

#[must_use]
pub fn user_stats(users: &[User], now: DateTime<Utc>) -> UserStats {
    let today = now.date_naive();
    let mut roles: BTreeMap<String, u64> = BTreeMap::new();
    for user in users {
        *roles.entry(user.role.as_str().to_string()).or_default() += 1;
    }
    UserStats {
        total_users: users.len() as u64,
        active_users: users.iter().filter(|u| u.is_active).count() as u64,
        today_users: users
            .iter()
            .filter(|u| u.created_at.date_naive() == today)
            .count() as u64,
        role_stats: roles,
    }
}

/// Count timestamps per UTC day, ascending by date.
pub fn per_day(stamps: impl IntoIterator<Item = DateTime<Utc>>) -> Vec<DayCount> {
    let mut days: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for stamp in stamps {
        *days.entry(stamp.date_naive()).or_default() += 1;
    }
    days.into_iter()
        .map(|(date, count)| DayCount { date, count })
        .collect()
}

/// Lowercased login used for username and email lookups.
#[must_use]
pub fn normalize_login(login: &str) -> String {
    login.trim().to_lowercase()
}

pub(crate) fn counts(rows: Vec<(String, i64)>) -> BTreeMap<String, u64> {
    rows.into_iter()
        .map(|(k, n)| (k, u64::try_from(n).unwrap_or(0)))
        .collect()
}

pub(crate) fn count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}
