use crate::error::ConfigError;
use regex::Regex;
use serde::Deserialize;
use serde::de::{self, Deserializer, Visitor};
use std::error::Error;
use std::fmt;

fn default_addr() -> String {
    ":3000".into()
}

fn default_storage() -> String {
    "sqlite:///var/quoteboard/quotes.db".into()
}

fn default_max_body_bytes() -> Option<u64> {
    Some(10 * 1024 * 1024)
}

fn default_log_level() -> String {
    "info".into()
}

fn default_token_ttl_secs() -> u64 {
    7 * 24 * 3600
}

fn default_session_ttl_secs() -> u64 {
    7 * 24 * 3600
}

fn default_session_cookie() -> String {
    "dxsess".into()
}

fn default_true() -> bool {
    true
}

fn default_page_size() -> u32 {
    50
}

fn default_max_page_size() -> u32 {
    100
}

fn default_api_base() -> String {
    "https://api.github.com".into()
}

fn default_owner() -> String {
    "darlingx1x".into()
}

fn default_repo() -> String {
    "bd".into()
}

fn default_branch() -> String {
    "main".into()
}

fn default_path() -> String {
    "db.json".into()
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_max_write_attempts() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_auth_max_age_secs() -> i64 {
    86_400
}

fn substitute(
    line: &str,
    re: &Regex,
    resolve: impl Fn(&str) -> Result<String, String>,
) -> Result<String, String> {
    let mut out = String::new();
    let mut last = 0;
    for caps in re.captures_iter(line) {
        let Some(m) = caps.get(0) else { continue };
        out.push_str(&line[last..m.start()]);
        out.push_str(&resolve(&caps[1])?);
        last = m.end();
    }
    out.push_str(&line[last..]);
    Ok(out)
}

/// Expand `$ENV{..}` then `$FILE{..}`. Comment lines are copied untouched.
fn expand_placeholders(text: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
    let env_re = Regex::new(r"\$ENV\{([^}]+)\}")?;
    let file_re = Regex::new(r"\$FILE\{([^}]+)\}")?;
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        if line.trim_start().starts_with('#') {
            out.push_str(line);
            continue;
        }
        let line = substitute(line, &env_re, |var| {
            std::env::var(var).map_err(|_| format!("environment variable {var} is not set"))
        })?;
        let line = substitute(&line, &file_re, |path| {
            std::fs::read_to_string(path)
                .map(|contents| contents.trim_end().to_string())
                .map_err(|e| format!("cannot read {path}: {e}"))
        })?;
        out.push_str(&line);
    }
    Ok(out)
}

fn parse_size(input: &str) -> Option<u64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let (digits, factor) = match trimmed.chars().last()? {
        'K' | 'k' => (&trimmed[..trimmed.len() - 1], 1024u64),
        'M' | 'm' => (&trimmed[..trimmed.len() - 1], 1024u64 * 1024),
        'G' | 'g' => (&trimmed[..trimmed.len() - 1], 1024u64 * 1024 * 1024),
        '0'..='9' => (trimmed, 1u64),
        _ => return None,
    };
    digits
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(factor))
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    struct SizeVisitor;

    impl Visitor<'_> for SizeVisitor {
        type Value = Option<u64>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("an integer or string with optional K, M, G suffix")
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                Err(de::Error::custom("size must be positive"))
            } else {
                Ok(Some(u64::try_from(v).map_err(de::Error::custom)?))
            }
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            parse_size(v)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid size: {v}")))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
    }

    deserializer.deserialize_any(SizeVisitor)
}

#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// How the document backend writes when another writer got there first.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum WritePolicy {
    /// Send the revision token of the snapshot that was modified; on rejection
    /// re-read the document and re-apply the change.
    #[default]
    CheckRevision,
    /// Re-read the current revision token right before writing. Last writer
    /// wins and concurrent additions are lost.
    Overwrite,
}

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default = "default_storage")]
    pub storage: String,
    #[serde(
        default = "default_max_body_bytes",
        deserialize_with = "deserialize_size"
    )]
    pub max_body_bytes: Option<u64>,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub quotes: QuoteConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Deserialize, Clone, Debug)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
    #[serde(default = "default_true")]
    pub allow_registration: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_secs: default_token_ttl_secs(),
            session_ttl_secs: default_session_ttl_secs(),
            session_cookie: default_session_cookie(),
            allow_registration: true,
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct QuoteConfig {
    /// New quotes start unapproved and stay hidden until an admin approves them.
    #[serde(default)]
    pub require_approval: bool,
    /// Anonymous submissions are rejected.
    #[serde(default)]
    pub require_auth: bool,
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            require_approval: false,
            require_auth: false,
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct GithubConfig {
    /// Without a token the document lives only in process memory.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default = "default_repo")]
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default)]
    pub write_policy: WritePolicy,
    #[serde(default = "default_max_write_attempts")]
    pub max_write_attempts: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: default_api_base(),
            owner: default_owner(),
            repo: default_repo(),
            branch: default_branch(),
            path: default_path(),
            cache_ttl_secs: default_cache_ttl_secs(),
            write_policy: WritePolicy::default(),
            max_write_attempts: default_max_write_attempts(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default = "default_auth_max_age_secs")]
    pub auth_max_age_secs: i64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            webhook_secret: None,
            auth_max_age_secs: default_auth_max_age_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if
    /// [`Config::validate`] rejects the result.
    pub fn from_file(path: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let text = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.to_string()))?;
        Self::from_toml(&text)
    }

    /// Parse configuration text, expanding `$ENV{..}` and `$FILE{..}` first.
    pub fn from_toml(text: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let text = expand_placeholders(text)?;
        let cfg: Config = toml::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check requirements that span several fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.is_empty() {
            return Err(ConfigError::MissingField("auth.jwt_secret"));
        }
        if self.auth.jwt_secret.len() < 16 {
            return Err(ConfigError::Invalid(
                "auth.jwt_secret must be at least 16 bytes".into(),
            ));
        }
        if self.quotes.default_page_size == 0
            || self.quotes.default_page_size > self.quotes.max_page_size
        {
            return Err(ConfigError::Invalid(
                "quotes.default_page_size must be between 1 and quotes.max_page_size".into(),
            ));
        }
        if self.github.max_write_attempts == 0 {
            return Err(ConfigError::Invalid(
                "github.max_write_attempts must be at least 1".into(),
            ));
        }
        if !(self.storage == "github"
            || self.storage.starts_with("sqlite:")
            || self.storage.starts_with("mysql:"))
        {
            return Err(ConfigError::Invalid(format!(
                "unknown storage backend '{}'",
                self.storage
            )));
        }
        Ok(())
    }

    /// Address to bind, accepting `host:port`, `:port` or a bare port.
    #[must_use]
    pub fn listen_addr(&self) -> String {
        listen_addr(&self.addr)
    }
}

fn listen_addr(raw: &str) -> String {
    if raw.parse::<std::net::SocketAddr>().is_ok() {
        raw.to_string()
    } else if let Some(port) = raw.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        format!("0.0.0.0:{raw}")
    }
}
