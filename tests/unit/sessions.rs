use quoteboard::auth::{SessionStore, TelegramUser};
use std::time::Duration;

fn user(id: &str) -> TelegramUser {
    TelegramUser {
        id: id.into(),
        name: format!("User {id}"),
        username: None,
        photo_url: None,
    }
}

#[tokio::test(start_paused = true)]
async fn sessions_expire_after_the_ttl() {
    let sessions = SessionStore::new(Duration::from_secs(60));
    let id = sessions.create(user("42"));
    assert_eq!(sessions.get(&id).map(|u| u.id), Some("42".into()));

    tokio::time::advance(Duration::from_secs(59)).await;
    assert!(sessions.get(&id).is_some());
    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(sessions.get(&id).is_none());
    assert!(sessions.is_empty(), "expired session is dropped on access");
}

#[tokio::test(start_paused = true)]
async fn sweep_drops_only_expired_sessions() {
    let sessions = SessionStore::new(Duration::from_secs(60));
    let old = sessions.create(user("1"));
    sessions.create(user("2"));
    tokio::time::advance(Duration::from_secs(30)).await;
    let young = sessions.create(user("3"));
    assert_eq!(sessions.sweep(), 0);

    tokio::time::advance(Duration::from_secs(31)).await;
    assert_eq!(sessions.sweep(), 2);
    assert_eq!(sessions.len(), 1);
    assert!(sessions.get(&old).is_none());
    assert!(sessions.get(&young).is_some());
}

#[tokio::test]
async fn destroyed_sessions_are_gone() {
    let sessions = SessionStore::new(Duration::from_secs(60));
    let id = sessions.create(user("7"));
    assert!(sessions.destroy(&id));
    assert!(!sessions.destroy(&id));
    assert!(sessions.get(&id).is_none());
}
