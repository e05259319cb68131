use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use quoteboard::AppState;
use quoteboard::auth::password;
use quoteboard::config::Config;
use quoteboard::document::DocumentStore;
use quoteboard::document::MemoryContents;
use quoteboard::handlers;
use quoteboard::model::{NewUser, Role, User};
use quoteboard::storage::{self, github};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "test-secret-with-enough-bytes";
pub const TEST_PASSWORD: &str = "Secret123";

/// Configuration for tests. `extra` is TOML placed after `storage` and may
/// add sections, including `[auth]`.
pub fn test_config(storage: &str, extra: &str) -> Config {
    let secret = format!("[auth]\njwt_secret = \"{TEST_SECRET}\"");
    let extra = if extra.contains("[auth]") {
        extra.replacen("[auth]", &secret, 1)
    } else {
        format!("{extra}\n{secret}")
    };
    Config::from_toml(&format!("storage = \"{storage}\"\n{extra}\n")).unwrap()
}

/// An application wired to an in-process backend.
pub struct TestApp {
    pub state: AppState,
    /// Remote behind the document backend, when that backend is used.
    pub remote: Option<Arc<MemoryContents>>,
}

impl TestApp {
    pub async fn sqlite() -> Self {
        Self::sqlite_with("").await
    }

    pub async fn sqlite_with(extra: &str) -> Self {
        let cfg = test_config("sqlite::memory:", extra);
        let backend = storage::open(&cfg).await.unwrap();
        Self {
            state: AppState::new(cfg, backend),
            remote: None,
        }
    }

    pub fn github() -> Self {
        Self::github_with("")
    }

    pub fn github_with(extra: &str) -> Self {
        let cfg = test_config("github", extra);
        let remote = Arc::new(MemoryContents::new());
        let doc = Arc::new(DocumentStore::new(remote.clone(), &cfg.github));
        Self {
            state: AppState::new(cfg, github::backend(doc)),
            remote: Some(remote),
        }
    }

    pub fn router(&self) -> Router {
        handlers::router(self.state.clone())
    }

    /// Store an account with [`TEST_PASSWORD`] and return it with a bearer token.
    pub async fn account(&self, username: &str, role: Role) -> (User, String) {
        let user = self
            .state
            .backend
            .users
            .create_user(NewUser {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                password_hash: password::hash_password(TEST_PASSWORD).unwrap(),
                role,
                ip: None,
                user_agent: None,
            })
            .await
            .unwrap();
        let token = self.state.tokens.issue(&user).unwrap();
        (user, token)
    }
}

/// Request builder executed with `oneshot` against a router.
pub struct TestRequest {
    method: Method,
    uri: String,
    headers: Vec<(String, String)>,
    body: Option<String>,
}

impl TestRequest {
    fn new(method: Method, uri: &str) -> Self {
        Self {
            method,
            uri: uri.to_owned(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(uri: &str) -> Self {
        Self::new(Method::GET, uri)
    }

    pub fn post(uri: &str) -> Self {
        Self::new(Method::POST, uri)
    }

    pub fn put(uri: &str) -> Self {
        Self::new(Method::PUT, uri)
    }

    pub fn delete(uri: &str) -> Self {
        Self::new(Method::DELETE, uri)
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_owned(), value.to_owned()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header(header::AUTHORIZATION.as_str(), &format!("Bearer {token}"))
    }

    pub fn cookie(self, name: &str, value: &str) -> Self {
        self.header(header::COOKIE.as_str(), &format!("{name}={value}"))
    }

    pub fn json<T: Serialize>(mut self, data: &T) -> Self {
        self.body = Some(serde_json::to_string(data).unwrap());
        self.header(header::CONTENT_TYPE.as_str(), "application/json")
    }

    pub async fn send(self, app: &Router) -> TestResponse {
        let mut builder = Request::builder().method(self.method).uri(self.uri);
        for (key, value) in self.headers {
            builder = builder.header(key, value);
        }
        let request = builder
            .body(Body::from(self.body.unwrap_or_default()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        TestResponse {
            status,
            headers,
            body,
        }
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    /// Value of a cookie set by the response.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    }
}
