use axum::http::StatusCode;
use quoteboard::model::{Role, UserUpdate};
use serde_json::json;
use test_utils::{TestApp, TestRequest};

fn body(text: &str, author: &str) -> serde_json::Value {
    json!({ "text": text, "author": author, "category": "life", "tags": ["a", " a ", "b"] })
}

#[tokio::test]
async fn anonymous_quote_lifecycle() {
    let app = TestApp::sqlite().await;
    let router = app.router();

    let res = TestRequest::get("/api/quotes").send(&router).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["quotes"], json!([]));
    assert_eq!(res.json()["pagination"]["total"], 0);

    let res = TestRequest::post("/api/quotes")
        .json(&body("Simplicity is prerequisite for reliability", "Dijkstra"))
        .send(&router)
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    let quote = &res.json()["quote"];
    assert_eq!(quote["id"], 1);
    assert_eq!(quote["isApproved"], true);
    assert_eq!(quote["tags"], json!(["a", "b"]));

    let res = TestRequest::get("/api/quotes/1").send(&router).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["quote"]["author"], "Dijkstra");

    let res = TestRequest::get("/api/quotes?author=dijk&limit=5").send(&router).await;
    assert_eq!(res.json()["quotes"].as_array().unwrap().len(), 1);
    assert_eq!(res.json()["pagination"]["currentPage"], 1);

    let res = TestRequest::get("/api/quotes/random/one").send(&router).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["quote"]["id"], 1);

    let res = TestRequest::get("/api/quotes/stats/overview").send(&router).await;
    assert_eq!(res.json()["stats"]["totalQuotes"], 1);
    assert_eq!(res.json()["stats"]["topAuthors"][0]["author"], "Dijkstra");
}

#[tokio::test]
async fn missing_quotes_are_not_found() {
    let app = TestApp::sqlite().await;
    let router = app.router();
    let res = TestRequest::get("/api/quotes/42").send(&router).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.json()["message"], "Quote not found");
    let res = TestRequest::get("/api/quotes/random/one").send(&router).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    let res = TestRequest::get("/api/quotes/abc").send(&router).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invalid_quotes_are_rejected_with_field_errors() {
    let app = TestApp::sqlite().await;
    let router = app.router();

    let res = TestRequest::post("/api/quotes")
        .json(&json!({ "text": "no author" }))
        .send(&router)
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    let errors = res.json()["errors"].clone();
    assert_eq!(errors[0]["field"], "author");

    let res = TestRequest::post("/api/quotes")
        .json(&body(&"x".repeat(1001), "someone"))
        .send(&router)
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.json()["errors"][0]["field"], "text");

    let res = TestRequest::post("/api/quotes")
        .header("content-type", "application/json")
        .send(&router)
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn posting_can_require_authentication() {
    let app = TestApp::sqlite_with("[quotes]\nrequire_auth = true").await;
    let router = app.router();
    let res = TestRequest::post("/api/quotes")
        .json(&body("text", "author"))
        .send(&router)
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let (_, token) = app.account("ada", Role::User).await;
    let res = TestRequest::post("/api/quotes")
        .bearer(&token)
        .json(&body("text", "author"))
        .send(&router)
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.json()["quote"]["username"], "ada");
}

#[tokio::test]
async fn unapproved_quotes_stay_hidden() {
    let app = TestApp::sqlite_with("[quotes]\nrequire_approval = true").await;
    let router = app.router();
    let (_, admin) = app.account("root", Role::Admin).await;

    let res = TestRequest::post("/api/quotes")
        .json(&body("pending", "someone"))
        .send(&router)
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.json()["quote"]["isApproved"], false);

    let res = TestRequest::get("/api/quotes").send(&router).await;
    assert_eq!(res.json()["pagination"]["total"], 0);
    let res = TestRequest::get("/api/quotes/1").send(&router).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    let res = TestRequest::get("/api/quotes/1").bearer(&admin).send(&router).await;
    assert_eq!(res.status, StatusCode::OK);

    let res = TestRequest::post("/api/quotes")
        .bearer(&admin)
        .json(&body("by staff", "someone"))
        .send(&router)
        .await;
    assert_eq!(res.json()["quote"]["isApproved"], true);
}

#[tokio::test]
async fn only_owners_and_staff_modify_quotes() {
    let app = TestApp::sqlite().await;
    let router = app.router();
    let (_, owner) = app.account("owner", Role::User).await;
    let (_, other) = app.account("other", Role::User).await;
    let (_, moderator) = app.account("mod", Role::Moderator).await;

    let res = TestRequest::post("/api/quotes")
        .bearer(&owner)
        .json(&body("mine", "me"))
        .send(&router)
        .await;
    let id = res.json()["quote"]["id"].as_i64().unwrap();
    let uri = format!("/api/quotes/{id}");

    let edit = json!({ "text": "edited" });
    let res = TestRequest::put(&uri).json(&edit).send(&router).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    let res = TestRequest::put(&uri).bearer(&other).json(&edit).send(&router).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    let res = TestRequest::delete(&uri).bearer(&other).send(&router).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = TestRequest::put(&uri).bearer(&owner).json(&edit).send(&router).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["quote"]["text"], "edited");
    let res = TestRequest::put(&uri)
        .bearer(&owner)
        .json(&json!({}))
        .send(&router)
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = TestRequest::delete(&uri).bearer(&moderator).send(&router).await;
    assert_eq!(res.status, StatusCode::OK);
    let res = TestRequest::get(&uri).send(&router).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stored_account_state_overrides_token_claims() {
    let app = TestApp::sqlite().await;
    let router = app.router();
    let (_, owner) = app.account("owner", Role::User).await;
    let (demoted, demoted_token) = app.account("exmod", Role::Moderator).await;
    let (disabled, disabled_token) = app.account("gone", Role::Moderator).await;

    let res = TestRequest::post("/api/quotes")
        .bearer(&owner)
        .json(&body("mine", "me"))
        .send(&router)
        .await;
    let uri = format!("/api/quotes/{}", res.json()["quote"]["id"]);

    let users = &app.state.backend.users;
    let demote = UserUpdate {
        role: Some(Role::User),
        ..UserUpdate::default()
    };
    users.update_user(demoted.id, demote).await.unwrap();
    let deactivate = UserUpdate {
        is_active: Some(false),
        ..UserUpdate::default()
    };
    users.update_user(disabled.id, deactivate).await.unwrap();

    let res = TestRequest::delete(&uri).bearer(&demoted_token).send(&router).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    let res = TestRequest::delete(&uri).bearer(&disabled_token).send(&router).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    let res = TestRequest::post("/api/quotes")
        .bearer(&disabled_token)
        .json(&body("still here", "me"))
        .send(&router)
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = TestRequest::get(&uri).send(&router).await;
    assert_eq!(res.status, StatusCode::OK);
}

#[tokio::test]
async fn submitter_address_is_only_shown_to_admins() {
    let app = TestApp::sqlite().await;
    let router = app.router();
    let (_, admin) = app.account("root", Role::Admin).await;
    TestRequest::post("/api/quotes")
        .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
        .header("user-agent", "tests")
        .json(&body("t", "a"))
        .send(&router)
        .await;

    let res = TestRequest::get("/api/quotes/1").send(&router).await;
    assert!(res.json()["quote"].get("ip").is_none());
    let res = TestRequest::get("/api/quotes/1").bearer(&admin).send(&router).await;
    assert_eq!(res.json()["quote"]["ip"], "203.0.113.9");
    assert_eq!(res.json()["quote"]["userAgent"], "tests");
}

#[tokio::test]
async fn document_backend_serves_the_same_routes() {
    let app = TestApp::github();
    let router = app.router();
    for (text, author) in [("a", "x"), ("b", "y")] {
        let res = TestRequest::post("/api/quotes")
            .json(&body(text, author))
            .send(&router)
            .await;
        assert_eq!(res.status, StatusCode::CREATED);
    }
    let res = TestRequest::get("/api/quotes").send(&router).await;
    let ids: Vec<_> = res.json()["quotes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|q| q["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![2, 1]);
    assert_eq!(app.remote.as_ref().unwrap().writes(), 2);
}

#[tokio::test]
async fn server_errors_carry_detail_outside_production() {
    let app = TestApp::github();
    app.remote.as_ref().unwrap().set_failing(true);
    let res = TestRequest::post("/api/quotes")
        .json(&body("t", "a"))
        .send(&app.router())
        .await;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.json()["status"], "error");
    assert!(res.json()["detail"].is_string());

    let app = TestApp::github_with("environment = \"production\"");
    app.remote.as_ref().unwrap().set_failing(true);
    let res = TestRequest::post("/api/quotes")
        .json(&body("t", "a"))
        .send(&app.router())
        .await;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(res.json().get("detail").is_none());
}
