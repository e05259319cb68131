use serde::Deserialize;
use serde_json::Value;

use crate::AppState;
use crate::model::PageRequest;

/// `page` and `limit` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageQuery {
    #[must_use]
    pub fn request(&self, default_limit: u32, state: &AppState) -> PageRequest {
        PageRequest::clamped(
            self.page,
            self.limit,
            default_limit,
            state.config.quotes.max_page_size,
        )
    }
}

/// Trimmed value, `None` when blank.
#[must_use]
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn document_flag(state: &AppState, key: &str) -> Option<bool> {
    let doc = state.backend.document.as_ref()?;
    doc.settings().await.get(key).and_then(Value::as_bool)
}

/// Whether new quotes wait for moderation. Either the configuration or the
/// document settings can switch it on.
pub async fn require_approval(state: &AppState) -> bool {
    state.config.quotes.require_approval
        || document_flag(state, "require_approval").await.unwrap_or(false)
}

/// Registration is open unless the configuration or the document settings close it.
pub async fn registration_open(state: &AppState) -> bool {
    state.config.auth.allow_registration
        && document_flag(state, "allow_registration").await.unwrap_or(true)
}

#[must_use]
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
