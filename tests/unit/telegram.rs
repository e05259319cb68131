use quoteboard::auth::telegram::{self, data_check_string};
use serde_json::{Map, Value, json};

const BOT_TOKEN: &str = "123456:test-bot-token";
const NOW: i64 = 1_700_000_000;

fn payload(auth_date: i64) -> Map<String, Value> {
    let mut map = json!({
        "id": 42,
        "first_name": "Ada",
        "last_name": "Lovelace",
        "username": "ada",
        "photo_url": null,
        "auth_date": auth_date,
    })
    .as_object()
    .cloned()
    .unwrap();
    let hash = telegram::sign(&map, BOT_TOKEN);
    map.insert("hash".into(), Value::String(hash));
    map
}

#[test]
fn data_check_string_is_sorted_and_skips_hash_and_nulls() {
    let map = payload(NOW);
    assert_eq!(
        data_check_string(&map),
        format!("auth_date={NOW}\nfirst_name=Ada\nid=42\nlast_name=Lovelace\nusername=ada")
    );
}

#[test]
fn valid_payload_yields_user() {
    let user = telegram::verify(&payload(NOW - 10), BOT_TOKEN, 86400, NOW).unwrap();
    assert_eq!(user.id, "42");
    assert_eq!(user.name, "Ada Lovelace");
    assert_eq!(user.username.as_deref(), Some("ada"));
    assert_eq!(user.photo_url, None);
}

#[test]
fn tampered_payload_is_rejected() {
    let mut map = payload(NOW);
    map.insert("username".into(), json!("mallory"));
    assert!(telegram::verify(&map, BOT_TOKEN, 86400, NOW).is_err());
    assert!(telegram::verify(&payload(NOW), "other:token", 86400, NOW).is_err());
}

#[test]
fn freshness_window() {
    assert!(telegram::verify(&payload(NOW - 86399), BOT_TOKEN, 86400, NOW).is_ok());
    assert!(telegram::verify(&payload(NOW - 86400), BOT_TOKEN, 86400, NOW).is_err());
    assert!(telegram::verify(&payload(NOW + 30), BOT_TOKEN, 86400, NOW).is_ok());
    assert!(telegram::verify(&payload(NOW + 120), BOT_TOKEN, 86400, NOW).is_err());
}

#[test]
fn missing_fields_are_rejected() {
    let mut map = payload(NOW);
    map.remove("auth_date");
    assert!(telegram::verify(&map, BOT_TOKEN, 86400, NOW).is_err());
    let mut map = payload(NOW);
    map.remove("hash");
    assert!(telegram::verify(&map, BOT_TOKEN, 86400, NOW).is_err());
}

#[test]
fn webhook_secret_comparison() {
    assert!(telegram::webhook_secret_matches("s3cret-hook", "s3cret-hook"));
    assert!(!telegram::webhook_secret_matches("s3cret-hoo", "s3cret-hook"));
    assert!(!telegram::webhook_secret_matches("s3cret-hook!", "s3cret-hook"));
    assert!(!telegram::webhook_secret_matches("", "s3cret-hook"));
}
