//! Access to the file that holds the JSON document.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;

use crate::config::GithubConfig;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("remote file does not exist")]
    NotFound,

    #[error("revision token is stale")]
    Conflict,

    #[error("remote returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed remote response: {0}")]
    Decode(String),

    #[error("remote unavailable")]
    Unavailable,
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        RemoteError::Transport(err.to_string())
    }
}

/// Raw file content plus the revision token that identifies it.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub content: Vec<u8>,
    pub sha: String,
}

#[async_trait]
pub trait ContentsApi: Send + Sync {
    /// Read the current file.
    async fn get(&self) -> Result<RemoteFile, RemoteError>;

    /// Replace the file. `sha` names the revision being replaced and is `None`
    /// when creating the file. Returns the new revision token.
    async fn put(
        &self,
        content: &[u8],
        sha: Option<&str>,
        message: &str,
    ) -> Result<String, RemoteError>;
}

/// GitHub repository contents API.
pub struct GithubContents {
    client: reqwest::Client,
    url: String,
    token: String,
    branch: String,
}

#[derive(Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
}

#[derive(Serialize)]
struct PutRequest<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    branch: &'a str,
}

#[derive(Deserialize)]
struct PutResponse {
    content: ContentsResponse,
}

impl GithubContents {
    /// Build a client for `cfg`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(cfg: &GithubConfig, token: &str) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(concat!("quoteboard/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: format!(
                "{}/repos/{}/{}/contents/{}",
                cfg.api_base.trim_end_matches('/'),
                cfg.owner,
                cfg.repo,
                cfg.path
            ),
            token: token.to_string(),
            branch: cfg.branch.clone(),
        })
    }

    fn auth(&self) -> String {
        format!("token {}", self.token)
    }
}

async fn status_error(resp: reqwest::Response) -> RemoteError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    RemoteError::Status { status, body }
}

#[async_trait]
impl ContentsApi for GithubContents {
    #[tracing::instrument(skip_all)]
    async fn get(&self) -> Result<RemoteFile, RemoteError> {
        let resp = self
            .client
            .get(&self.url)
            .query(&[("ref", self.branch.as_str())])
            .header(reqwest::header::AUTHORIZATION, self.auth())
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?;
        match resp.status() {
            reqwest::StatusCode::NOT_FOUND => return Err(RemoteError::NotFound),
            s if !s.is_success() => return Err(status_error(resp).await),
            _ => {}
        }
        let body: ContentsResponse = resp
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        // GitHub wraps the base64 payload at 60 columns.
        let packed: String = body
            .content
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let content = STANDARD
            .decode(packed)
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(RemoteFile {
            content,
            sha: body.sha,
        })
    }

    #[tracing::instrument(skip_all)]
    async fn put(
        &self,
        content: &[u8],
        sha: Option<&str>,
        message: &str,
    ) -> Result<String, RemoteError> {
        let request = PutRequest {
            message,
            content: STANDARD.encode(content),
            sha,
            branch: &self.branch,
        };
        let resp = self
            .client
            .put(&self.url)
            .header(reqwest::header::AUTHORIZATION, self.auth())
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .json(&request)
            .send()
            .await?;
        match resp.status().as_u16() {
            409 | 422 => return Err(RemoteError::Conflict),
            404 => return Err(RemoteError::NotFound),
            _ if !resp.status().is_success() => return Err(status_error(resp).await),
            _ => {}
        }
        let body: PutResponse = resp
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(body.content.sha)
    }
}

/// In-process file used when no GitHub token is configured, and by tests.
#[derive(Default)]
pub struct MemoryContents {
    file: Mutex<Option<RemoteFile>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryContents {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `content` already stored.
    #[must_use]
    pub fn with_content(content: &[u8]) -> Self {
        let store = Self::new();
        if let Ok(mut file) = store.file.lock() {
            *file = Some(RemoteFile {
                content: content.to_vec(),
                sha: revision_of(content),
            });
        }
        store
    }

    /// Successful and failed `get` calls so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Accepted `put` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every subsequent call fail with [`RemoteError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Current stored bytes, if any.
    pub fn content(&self) -> Option<Vec<u8>> {
        self.file
            .lock()
            .ok()
            .and_then(|f| f.as_ref().map(|f| f.content.clone()))
    }
}

fn revision_of(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

#[async_trait]
impl ContentsApi for MemoryContents {
    async fn get(&self) -> Result<RemoteFile, RemoteError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable);
        }
        let file = self.file.lock().map_err(|_| RemoteError::Unavailable)?;
        file.clone().ok_or(RemoteError::NotFound)
    }

    async fn put(
        &self,
        content: &[u8],
        sha: Option<&str>,
        _message: &str,
    ) -> Result<String, RemoteError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable);
        }
        let mut file = self.file.lock().map_err(|_| RemoteError::Unavailable)?;
        let current = file.as_ref().map(|f| f.sha.as_str());
        if current != sha {
            return Err(RemoteError::Conflict);
        }
        let sha = revision_of(content);
        *file = Some(RemoteFile {
            content: content.to_vec(),
            sha: sha.clone(),
        });
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(sha)
    }
}
