use axum::http::StatusCode;
use quoteboard::auth::telegram;
use quoteboard::model::{Role, UserUpdate};
use serde_json::{Map, Value, json};
use test_utils::{TEST_PASSWORD, TestApp, TestRequest};

const BOT_TOKEN: &str = "123456:test-bot-token";
const TELEGRAM: &str = "[telegram]\nbot_token = \"123456:test-bot-token\"\nwebhook_secret = \"hook-secret\"";

fn widget_payload(auth_date: i64) -> Map<String, Value> {
    let mut map = json!({
        "id": 42,
        "first_name": "Ada",
        "username": "ada_tg",
        "auth_date": auth_date,
    })
    .as_object()
    .cloned()
    .unwrap();
    let hash = telegram::sign(&map, BOT_TOKEN);
    map.insert("hash".into(), json!(hash));
    map
}

#[tokio::test]
async fn register_then_login() {
    let app = TestApp::sqlite().await;
    let router = app.router();

    let res = TestRequest::post("/api/auth/register")
        .json(&json!({ "username": "ada", "email": "Ada@Example.com", "password": "Secret123" }))
        .send(&router)
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    let body = res.json();
    assert!(body["token"].is_string());
    assert_eq!(body["user"]["email"], "ada@example.com");
    assert_eq!(body["user"]["role"], "user");
    assert!(body["user"].get("password").is_none());

    let res = TestRequest::post("/api/auth/register")
        .json(&json!({ "username": "ada", "email": "other@example.com", "password": "Secret123" }))
        .send(&router)
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.json()["message"], "Username or email already exists");

    for login in ["ada", "ada@example.com"] {
        let res = TestRequest::post("/api/auth/login")
            .json(&json!({ "username": login, "password": "Secret123" }))
            .send(&router)
            .await;
        assert_eq!(res.status, StatusCode::OK, "{login}");
        assert!(res.json()["token"].is_string());
    }

    let user = app
        .state
        .backend
        .users
        .find_user_by_login("ada")
        .await
        .unwrap()
        .unwrap();
    assert!(user.last_login_at.is_some());
}

#[tokio::test]
async fn registration_validates_input() {
    let app = TestApp::sqlite().await;
    let res = TestRequest::post("/api/auth/register")
        .json(&json!({ "username": "a b", "email": "nope", "password": "weak" }))
        .send(&app.router())
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    let fields: Vec<_> = res.json()["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap().to_string())
        .collect();
    assert!(fields.contains(&"username".to_string()));
    assert!(fields.contains(&"email".to_string()));
    assert!(fields.contains(&"password".to_string()));
}

#[tokio::test]
async fn registration_can_be_closed() {
    let app = TestApp::sqlite_with("[auth]\nallow_registration = false").await;
    let res = TestRequest::post("/api/auth/register")
        .json(&json!({ "username": "ada", "email": "ada@example.com", "password": "Secret123" }))
        .send(&app.router())
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn login_failures_do_not_reveal_which_credential_was_wrong() {
    let app = TestApp::sqlite().await;
    let router = app.router();
    app.account("ada", Role::User).await;

    let wrong_password = TestRequest::post("/api/auth/login")
        .json(&json!({ "username": "ada", "password": "Wrong123" }))
        .send(&router)
        .await;
    let unknown_user = TestRequest::post("/api/auth/login")
        .json(&json!({ "username": "nobody", "password": "Wrong123" }))
        .send(&router)
        .await;
    assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_user.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password.json(), unknown_user.json());
    assert_eq!(wrong_password.json()["message"], "Invalid username or password");

    let res = TestRequest::post("/api/auth/login")
        .json(&json!({ "username": "ada" }))
        .send(&router)
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn disabled_accounts_cannot_log_in_or_use_tokens() {
    let app = TestApp::sqlite().await;
    let router = app.router();
    let (user, token) = app.account("ada", Role::User).await;
    let update = UserUpdate {
        is_active: Some(false),
        ..UserUpdate::default()
    };
    app.state.backend.users.update_user(user.id, update).await.unwrap();

    let res = TestRequest::post("/api/auth/login")
        .json(&json!({ "username": "ada", "password": TEST_PASSWORD }))
        .send(&router)
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.json()["message"], "Account is disabled");

    let res = TestRequest::get("/api/auth/verify").bearer(&token).send(&router).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn profile_and_verify_need_a_valid_token() {
    let app = TestApp::sqlite().await;
    let router = app.router();
    let (_, token) = app.account("ada", Role::User).await;

    let res = TestRequest::get("/api/auth/profile").bearer(&token).send(&router).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["user"]["username"], "ada");
    assert!(res.json()["user"].get("password").is_none());

    let res = TestRequest::get("/api/auth/verify").bearer(&token).send(&router).await;
    assert_eq!(res.json()["valid"], true);

    let res = TestRequest::get("/api/auth/profile").send(&router).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    let res = TestRequest::get("/api/auth/verify").bearer("garbage").send(&router).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = TestRequest::post("/api/auth/logout").send(&router).await;
    assert_eq!(res.status, StatusCode::OK);
}

#[tokio::test]
async fn password_change_requires_the_current_password() {
    let app = TestApp::sqlite().await;
    let router = app.router();
    let (_, token) = app.account("ada", Role::User).await;
    app.account("grace", Role::User).await;

    let res = TestRequest::put("/api/auth/profile")
        .bearer(&token)
        .json(&json!({ "newPassword": "Changed456" }))
        .send(&router)
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = TestRequest::put("/api/auth/profile")
        .bearer(&token)
        .json(&json!({ "newPassword": "Changed456", "currentPassword": "Wrong123" }))
        .send(&router)
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.json()["message"], "Current password is incorrect");

    let res = TestRequest::put("/api/auth/profile")
        .bearer(&token)
        .json(&json!({ "email": "grace@example.com" }))
        .send(&router)
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = TestRequest::put("/api/auth/profile")
        .bearer(&token)
        .json(&json!({
            "email": "ada@new.example.com",
            "newPassword": "Changed456",
            "currentPassword": TEST_PASSWORD,
        }))
        .send(&router)
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["user"]["email"], "ada@new.example.com");

    let res = TestRequest::post("/api/auth/login")
        .json(&json!({ "username": "ada", "password": "Changed456" }))
        .send(&router)
        .await;
    assert_eq!(res.status, StatusCode::OK);
}

#[tokio::test]
async fn telegram_login_opens_a_cookie_session() {
    let app = TestApp::sqlite_with(TELEGRAM).await;
    let router = app.router();
    let now = chrono::Utc::now().timestamp();

    let res = TestRequest::post("/api/auth/telegram")
        .json(&widget_payload(now))
        .send(&router)
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["ok"], true);
    assert_eq!(res.json()["user"]["id"], "42");
    let session = res.cookie("dxsess").unwrap();

    let res = TestRequest::get("/api/me").cookie("dxsess", &session).send(&router).await;
    assert_eq!(res.json()["user"]["name"], "Ada");

    let res = TestRequest::post("/api/quotes")
        .cookie("dxsess", &session)
        .json(&json!({ "text": "from telegram", "author": "Ada" }))
        .send(&router)
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.json()["quote"]["username"], "ada_tg");
    let quote = app.state.backend.quotes.get_quote(1).await.unwrap().unwrap();
    assert_eq!(quote.user_id.as_deref(), Some("tg:42"));

    let res = TestRequest::post("/api/logout").cookie("dxsess", &session).send(&router).await;
    assert_eq!(res.json()["ok"], true);
    let res = TestRequest::get("/api/me").cookie("dxsess", &session).send(&router).await;
    assert_eq!(res.json()["user"], Value::Null);
}

#[tokio::test]
async fn telegram_payloads_are_verified() {
    let app = TestApp::sqlite_with(TELEGRAM).await;
    let router = app.router();
    let now = chrono::Utc::now().timestamp();

    let mut tampered = widget_payload(now);
    tampered.insert("username".into(), json!("mallory"));
    let res = TestRequest::post("/api/auth/telegram").json(&tampered).send(&router).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = TestRequest::post("/api/auth/telegram")
        .json(&widget_payload(now - 2 * 86400))
        .send(&router)
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let mut missing = widget_payload(now);
    missing.remove("hash");
    let res = TestRequest::post("/api/auth/telegram").json(&missing).send(&router).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let unconfigured = TestApp::sqlite().await;
    let res = TestRequest::post("/api/auth/telegram")
        .json(&widget_payload(now))
        .send(&unconfigured.router())
        .await;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn webhook_checks_the_shared_secret() {
    let app = TestApp::sqlite_with(TELEGRAM).await;
    let router = app.router();
    let update = json!({ "update_id": 1 });

    let res = TestRequest::post("/webhook").json(&update).send(&router).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    let res = TestRequest::post("/webhook")
        .header("x-telegram-bot-secret", "wrong")
        .json(&update)
        .send(&router)
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    let res = TestRequest::post("/webhook")
        .header("x-telegram-bot-secret", "hook-secret")
        .json(&update)
        .send(&router)
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["ok"], true);
}
