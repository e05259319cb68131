use quoteboard::error::StorageError;
use quoteboard::model::{
    NewQuote, NewUser, PageRequest, QuoteFilter, QuoteUpdate, Role, UserFilter, UserUpdate,
};
use quoteboard::storage::Backend;
use test_utils::TestApp;

async fn backends() -> Vec<(&'static str, Backend)> {
    vec![
        ("sqlite", TestApp::sqlite().await.state.backend),
        ("github", TestApp::github().state.backend),
    ]
}

fn quote(text: &str, author: &str, category: &str, approved: bool) -> NewQuote {
    NewQuote {
        text: text.into(),
        author: author.into(),
        category: category.into(),
        tags: vec!["t".into()],
        is_approved: approved,
        ..NewQuote::default()
    }
}

fn user(name: &str) -> NewUser {
    NewUser {
        username: name.into(),
        email: format!("{name}@example.com"),
        password_hash: "hash".into(),
        role: Role::User,
        ip: Some("10.0.0.1".into()),
        user_agent: None,
    }
}

const PAGE: PageRequest = PageRequest { page: 1, limit: 50 };

#[tokio::test]
async fn quote_crud() {
    for (name, backend) in backends().await {
        let q = backend
            .quotes
            .create_quote(quote("Stay hungry", "Jobs", "life", true))
            .await
            .unwrap();
        assert_eq!(q.id, 1, "{name}");
        assert_eq!(q.tags, vec!["t".to_string()], "{name}");

        let fetched = backend.quotes.get_quote(q.id).await.unwrap().unwrap();
        assert_eq!(fetched.text, "Stay hungry", "{name}");

        let update = QuoteUpdate {
            text: Some("Stay foolish".into()),
            ..QuoteUpdate::default()
        };
        let updated = backend.quotes.update_quote(q.id, update).await.unwrap().unwrap();
        assert_eq!(updated.text, "Stay foolish", "{name}");
        assert_eq!(updated.author, "Jobs", "{name}");
        assert!(updated.updated_at >= updated.created_at, "{name}");

        assert!(
            backend
                .quotes
                .update_quote(99, QuoteUpdate::default())
                .await
                .unwrap()
                .is_none(),
            "{name}"
        );
        assert!(backend.quotes.delete_quote(q.id).await.unwrap(), "{name}");
        assert!(!backend.quotes.delete_quote(q.id).await.unwrap(), "{name}");
        assert!(backend.quotes.get_quote(q.id).await.unwrap().is_none(), "{name}");
    }
}

#[tokio::test]
async fn listing_filters_and_paginates() {
    for (name, backend) in backends().await {
        for i in 0..5 {
            backend
                .quotes
                .create_quote(quote(&format!("wisdom {i}"), "Seneca", "stoic", true))
                .await
                .unwrap();
        }
        backend
            .quotes
            .create_quote(quote("hidden", "Seneca", "stoic", false))
            .await
            .unwrap();
        backend
            .quotes
            .create_quote(quote("other", "Marcus", "life", true))
            .await
            .unwrap();

        let page = backend
            .quotes
            .list_quotes(&QuoteFilter::approved_only(), PageRequest { page: 2, limit: 4 })
            .await
            .unwrap();
        assert_eq!(page.total, 6, "{name}");
        assert_eq!(page.items.len(), 2, "{name}");
        let pagination = page.pagination();
        assert_eq!(pagination.total_pages, 2, "{name}");
        assert!(pagination.has_prev && !pagination.has_next, "{name}");

        let first = backend
            .quotes
            .list_quotes(&QuoteFilter::approved_only(), PAGE)
            .await
            .unwrap();
        assert_eq!(first.items[0].text, "other", "{name}: newest first");

        let filter = QuoteFilter {
            author: Some("sen".into()),
            ..QuoteFilter::approved_only()
        };
        let seneca = backend.quotes.list_quotes(&filter, PAGE).await.unwrap();
        assert_eq!(seneca.total, 5, "{name}");

        let filter = QuoteFilter {
            search: Some("WISDOM 3".into()),
            ..QuoteFilter::default()
        };
        let found = backend.quotes.list_quotes(&filter, PAGE).await.unwrap();
        assert_eq!(found.total, 1, "{name}");

        let filter = QuoteFilter {
            approved: Some(false),
            ..QuoteFilter::default()
        };
        let pending = backend.quotes.list_quotes(&filter, PAGE).await.unwrap();
        assert_eq!(pending.items.len(), 1, "{name}");
        assert_eq!(pending.items[0].text, "hidden", "{name}");
    }
}

#[tokio::test]
async fn random_quote_is_approved() {
    for (name, backend) in backends().await {
        assert!(backend.quotes.random_quote().await.unwrap().is_none(), "{name}");
        backend
            .quotes
            .create_quote(quote("visible", "A", "general", true))
            .await
            .unwrap();
        backend
            .quotes
            .create_quote(quote("pending", "B", "general", false))
            .await
            .unwrap();
        for _ in 0..10 {
            let q = backend.quotes.random_quote().await.unwrap().unwrap();
            assert_eq!(q.text, "visible", "{name}");
        }
    }
}

#[tokio::test]
async fn quote_stats_count_authors_and_categories() {
    for (name, backend) in backends().await {
        for (author, category) in [("B", "life"), ("A", "life"), ("B", "art"), ("C", "art"), ("A", "art")] {
            backend
                .quotes
                .create_quote(quote("x", author, category, true))
                .await
                .unwrap();
        }
        let stats = backend.quotes.quote_stats().await.unwrap();
        assert_eq!(stats.total_quotes, 5, "{name}");
        assert_eq!(stats.today_quotes, 5, "{name}");
        let authors: Vec<_> = stats
            .top_authors
            .iter()
            .map(|a| (a.author.as_str(), a.count))
            .collect();
        assert_eq!(authors, vec![("A", 2), ("B", 2), ("C", 1)], "{name}");
        assert_eq!(stats.category_stats["art"], 3, "{name}");
        assert_eq!(stats.category_stats["life"], 2, "{name}");

        let since = chrono::Utc::now() - chrono::Duration::days(7);
        let per_day = backend.quotes.quotes_per_day(since).await.unwrap();
        assert_eq!(per_day.iter().map(|d| d.count).sum::<u64>(), 5, "{name}");
    }
}

#[tokio::test]
async fn users_are_unique_and_found_by_login() {
    for (name, backend) in backends().await {
        let ada = backend.users.create_user(user("ada")).await.unwrap();
        assert_eq!(ada.role, Role::User, "{name}");
        assert!(ada.is_active, "{name}");

        let dup = backend.users.create_user(user("ada")).await;
        assert!(matches!(dup, Err(StorageError::Duplicate(_))), "{name}");
        let mut same_email = user("grace");
        same_email.email = "ADA@example.com".into();
        let dup = backend.users.create_user(same_email).await;
        assert!(matches!(dup, Err(StorageError::Duplicate(_))), "{name}");

        let by_name = backend.users.find_user_by_login("ADA").await.unwrap().unwrap();
        assert_eq!(by_name.id, ada.id, "{name}");
        let by_email = backend
            .users
            .find_user_by_login("ada@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, ada.id, "{name}");
        assert!(backend.users.find_user_by_login("nobody").await.unwrap().is_none(), "{name}");
    }
}

#[tokio::test]
async fn user_updates_and_listing() {
    for (name, backend) in backends().await {
        let ada = backend.users.create_user(user("ada")).await.unwrap();
        backend.users.create_user(user("grace")).await.unwrap();
        backend.users.create_user(user("linus")).await.unwrap();

        let update = UserUpdate {
            role: Some(Role::Admin),
            is_active: Some(false),
            last_login_at: Some(chrono::Utc::now()),
            ..UserUpdate::default()
        };
        let changed = backend.users.update_user(ada.id, update).await.unwrap().unwrap();
        assert_eq!(changed.role, Role::Admin, "{name}");
        assert!(!changed.is_active, "{name}");
        assert!(changed.last_login_at.is_some(), "{name}");
        assert!(
            backend
                .users
                .update_user(99, UserUpdate::default())
                .await
                .unwrap()
                .is_none(),
            "{name}"
        );

        let admins = UserFilter {
            role: Some(Role::Admin),
            ..UserFilter::default()
        };
        let page = backend.users.list_users(&admins, PAGE).await.unwrap();
        assert_eq!(page.total, 1, "{name}");
        let search = UserFilter {
            search: Some("GRA".into()),
            ..UserFilter::default()
        };
        let page = backend.users.list_users(&search, PAGE).await.unwrap();
        assert_eq!(page.items[0].username, "grace", "{name}");

        let stats = backend.users.user_stats().await.unwrap();
        assert_eq!(stats.total_users, 3, "{name}");
        assert_eq!(stats.active_users, 2, "{name}");
        assert_eq!(stats.today_users, 3, "{name}");
        assert_eq!(stats.role_stats["admin"], 1, "{name}");
        assert_eq!(stats.role_stats["user"], 2, "{name}");
    }
}

#[tokio::test]
async fn search_wildcards_match_literally() {
    for (name, backend) in backends().await {
        backend
            .quotes
            .create_quote(quote("plain text", "Anon", "life", true))
            .await
            .unwrap();
        backend
            .quotes
            .create_quote(quote("100% sure", "Anon", "life", true))
            .await
            .unwrap();

        for (needle, expected) in [("%", 1), ("_", 0), ("0% s", 1), ("plain_text", 0), ("!", 0)] {
            let filter = QuoteFilter {
                search: Some(needle.into()),
                ..QuoteFilter::default()
            };
            let found = backend.quotes.list_quotes(&filter, PAGE).await.unwrap();
            assert_eq!(found.total, expected, "{name}: search {needle:?}");
            for quote in &found.items {
                assert!(filter.matches(quote), "{name}: {needle:?}");
            }
        }

        backend.users.create_user(user("under_score")).await.unwrap();
        backend.users.create_user(user("underXscore")).await.unwrap();
        let search = UserFilter {
            search: Some("r_s".into()),
            ..UserFilter::default()
        };
        let page = backend.users.list_users(&search, PAGE).await.unwrap();
        assert_eq!(page.total, 1, "{name}");
        assert_eq!(page.items[0].username, "under_score", "{name}");
    }
}
