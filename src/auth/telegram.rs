//! Telegram login widget verification.
//!
//! The widget posts the user's fields together with `hash`, an HMAC-SHA256
//! over the data-check-string (every other field as `key=value`, sorted by
//! key, joined by newlines) keyed with the SHA-256 digest of the bot token.

use ring::{digest, hmac};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::AuthError;

/// Identity carried by a verified widget payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelegramUser {
    pub id: String,
    pub name: String,
    pub username: Option<String>,
    pub photo_url: Option<String>,
}

fn field_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Sorted `key=value` lines of every non-null field except `hash`.
#[must_use]
pub fn data_check_string(payload: &Map<String, Value>) -> String {
    let mut lines: Vec<(String, String)> = payload
        .iter()
        .filter(|(k, _)| k.as_str() != "hash")
        .filter_map(|(k, v)| field_text(v).map(|v| (k.clone(), v)))
        .collect();
    lines.sort_by(|a, b| a.0.cmp(&b.0));
    lines
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn signing_key(bot_token: &str) -> hmac::Key {
    let secret = digest::digest(&digest::SHA256, bot_token.as_bytes());
    hmac::Key::new(hmac::HMAC_SHA256, secret.as_ref())
}

/// Hex `hash` the widget would send for `payload` under `bot_token`.
#[must_use]
pub fn sign(payload: &Map<String, Value>, bot_token: &str) -> String {
    let tag = hmac::sign(&signing_key(bot_token), data_check_string(payload).as_bytes());
    hex::encode(tag.as_ref())
}

/// Verify a widget payload at unix time `now`.
///
/// `auth_date` must be at most `max_age_secs` old and no more than a minute
/// in the future.
pub fn verify(
    payload: &Map<String, Value>,
    bot_token: &str,
    max_age_secs: i64,
    now: i64,
) -> Result<TelegramUser, AuthError> {
    let id = payload
        .get("id")
        .and_then(field_text)
        .filter(|s| !s.is_empty())
        .ok_or(AuthError::Telegram("missing id"))?;
    let hash = payload
        .get("hash")
        .and_then(Value::as_str)
        .ok_or(AuthError::Telegram("missing hash"))?;
    let auth_date = payload
        .get("auth_date")
        .and_then(field_text)
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(AuthError::Telegram("missing auth_date"))?;

    let expected = hex::decode(hash).map_err(|_| AuthError::Telegram("malformed hash"))?;
    hmac::verify(
        &signing_key(bot_token),
        data_check_string(payload).as_bytes(),
        &expected,
    )
    .map_err(|_| AuthError::Telegram("hash mismatch"))?;

    let age = now - auth_date;
    if age >= max_age_secs || age < -60 {
        return Err(AuthError::Telegram("stale auth_date"));
    }

    let text = |key: &str| payload.get(key).and_then(field_text).filter(|s| !s.is_empty());
    let name = [text("first_name"), text("last_name")]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    Ok(TelegramUser {
        id,
        name,
        username: text("username"),
        photo_url: text("photo_url"),
    })
}

/// Constant-time check of the bot webhook secret header.
#[must_use]
pub fn webhook_secret_matches(presented: &str, expected: &str) -> bool {
    let key = hmac::Key::new(hmac::HMAC_SHA256, expected.as_bytes());
    let tag = hmac::sign(&key, expected.as_bytes());
    hmac::verify(&key, presented.as_bytes(), tag.as_ref()).is_ok()
}
