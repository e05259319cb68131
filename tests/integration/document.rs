use quoteboard::config::{GithubConfig, WritePolicy};
use async_trait::async_trait;
use quoteboard::document::{
    Collection, ContentsApi, Document, DocumentError, DocumentStore, Filter, MemoryContents,
    RemoteError, RemoteFile,
};
use serde_json::{Map, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use test_utils::test_config;

fn github_config(policy: WritePolicy) -> GithubConfig {
    let mut cfg = test_config("github", "").github;
    cfg.write_policy = policy;
    cfg
}

fn store(remote: &Arc<MemoryContents>, policy: WritePolicy) -> DocumentStore {
    DocumentStore::new(remote.clone(), &github_config(policy))
}

fn stored(remote: &MemoryContents) -> Document {
    Document::from_slice(&remote.content().unwrap()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn fetch_is_cached_within_the_freshness_window() {
    let remote = Arc::new(MemoryContents::with_content(
        Document::skeleton().to_vec().unwrap().as_slice(),
    ));
    let doc = store(&remote, WritePolicy::CheckRevision);

    doc.fetch().await;
    assert_eq!(remote.reads(), 1);
    tokio::time::advance(Duration::from_secs(299)).await;
    doc.fetch().await;
    assert_eq!(remote.reads(), 1);
    tokio::time::advance(Duration::from_secs(2)).await;
    doc.fetch().await;
    assert_eq!(remote.reads(), 2);
}

#[tokio::test]
async fn failed_read_without_cache_serves_the_skeleton() {
    let remote = Arc::new(MemoryContents::new());
    remote.set_failing(true);
    let doc = store(&remote, WritePolicy::CheckRevision).fetch().await;
    let skeleton = Document::skeleton();
    assert!(doc.items(Collection::Quotes).is_empty());
    assert!(doc.items(Collection::Users).is_empty());
    assert_eq!(doc.section("settings"), skeleton.section("settings"));
}

#[tokio::test(start_paused = true)]
async fn failed_read_serves_the_stale_cache() {
    let remote = Arc::new(MemoryContents::new());
    let doc = store(&remote, WritePolicy::CheckRevision);
    doc.add_to_collection(Collection::Quotes, json!({"text": "a", "author": "x"}))
        .await
        .unwrap();

    tokio::time::advance(Duration::from_secs(600)).await;
    remote.set_failing(true);
    let served = doc.fetch().await;
    assert_eq!(served.items(Collection::Quotes).len(), 1);
}

/// Remote that hangs for the client timeout before failing.
#[derive(Default)]
struct TimingOut {
    reads: AtomicUsize,
}

#[async_trait]
impl ContentsApi for TimingOut {
    async fn get(&self) -> Result<RemoteFile, RemoteError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        Err(RemoteError::Transport("timed out".into()))
    }

    async fn put(&self, _: &[u8], _: Option<&str>, _: &str) -> Result<String, RemoteError> {
        Err(RemoteError::Unavailable)
    }
}

#[tokio::test(start_paused = true)]
async fn outage_does_not_queue_reads_behind_the_lock() {
    let remote = Arc::new(TimingOut::default());
    let doc = Arc::new(DocumentStore::new(
        remote.clone(),
        &github_config(WritePolicy::CheckRevision),
    ));
    let started = tokio::time::Instant::now();
    let readers: Vec<_> = (0..5)
        .map(|_| {
            let doc = doc.clone();
            tokio::spawn(async move {
                doc.fetch().await;
                started.elapsed()
            })
        })
        .collect();
    for reader in readers {
        let waited = reader.await.unwrap();
        assert!(waited <= Duration::from_secs(11), "waited {waited:?}");
    }
    assert_eq!(remote.reads.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn reads_retry_the_remote_after_the_backoff() {
    let remote = Arc::new(MemoryContents::new());
    let doc = store(&remote, WritePolicy::CheckRevision);
    remote.set_failing(true);
    doc.fetch().await;
    assert_eq!(remote.reads(), 1);

    remote.set_failing(false);
    doc.fetch().await;
    assert_eq!(remote.reads(), 1);

    tokio::time::advance(Duration::from_secs(31)).await;
    doc.fetch().await;
    assert_eq!(remote.reads(), 2);
    doc.fetch().await;
    assert_eq!(remote.reads(), 2);
}

#[tokio::test]
async fn mutation_never_runs_against_a_fallback() {
    let remote = Arc::new(MemoryContents::new());
    remote.set_failing(true);
    let doc = store(&remote, WritePolicy::CheckRevision);
    let result = doc
        .add_to_collection(Collection::Quotes, json!({"text": "a", "author": "x"}))
        .await;
    assert!(matches!(result, Err(DocumentError::Remote(_))));
    assert_eq!(remote.writes(), 0);
}

#[tokio::test]
async fn ids_start_at_one_and_follow_the_maximum() {
    let remote = Arc::new(MemoryContents::new());
    let doc = store(&remote, WritePolicy::CheckRevision);
    let a = doc
        .add_to_collection(Collection::Quotes, json!({"text": "a", "author": "x"}))
        .await
        .unwrap();
    let b = doc
        .add_to_collection(Collection::Quotes, json!({"text": "b", "author": "y"}))
        .await
        .unwrap();
    assert_eq!(a["id"], 1);
    assert_eq!(b["id"], 2);
    assert!(a["createdAt"].is_string());

    let all = doc.find_in_collection(Collection::Quotes, &Filter::new()).await;
    assert_eq!(all.len(), 2);
    let by_author = doc
        .find_in_collection(Collection::Quotes, &Filter::new().field("author", "Y"))
        .await;
    assert_eq!(by_author.len(), 1);
    assert_eq!(by_author[0]["text"], "b");
}

#[tokio::test]
async fn ids_continue_after_the_largest_existing_id() {
    let mut seeded = Document::skeleton();
    seeded
        .items_mut(Collection::Quotes)
        .push(json!({"id": 41, "text": "old", "author": "x"}));
    let remote = Arc::new(MemoryContents::with_content(&seeded.to_vec().unwrap()));
    let doc = store(&remote, WritePolicy::CheckRevision);
    let added = doc
        .add_to_collection(Collection::Quotes, json!({"text": "new", "author": "y"}))
        .await
        .unwrap();
    assert_eq!(added["id"], 42);
}

#[tokio::test]
async fn overwrite_policy_loses_a_concurrent_addition() {
    let remote = Arc::new(MemoryContents::new());
    let first = store(&remote, WritePolicy::Overwrite);
    let second = store(&remote, WritePolicy::Overwrite);
    first.fetch().await;
    second.fetch().await;

    first
        .add_to_collection(Collection::Quotes, json!({"text": "a", "author": "x"}))
        .await
        .unwrap();
    second
        .add_to_collection(Collection::Quotes, json!({"text": "b", "author": "y"}))
        .await
        .unwrap();

    let quotes = stored(&remote).items(Collection::Quotes).to_vec();
    assert_eq!(quotes.len(), 1);
    assert_eq!(quotes[0]["text"], "b");
}

#[tokio::test]
async fn revision_check_keeps_both_concurrent_additions() {
    let remote = Arc::new(MemoryContents::new());
    let first = store(&remote, WritePolicy::CheckRevision);
    let second = store(&remote, WritePolicy::CheckRevision);
    first.fetch().await;
    second.fetch().await;

    first
        .add_to_collection(Collection::Quotes, json!({"text": "a", "author": "x"}))
        .await
        .unwrap();
    let b = second
        .add_to_collection(Collection::Quotes, json!({"text": "b", "author": "y"}))
        .await
        .unwrap();
    assert_eq!(b["id"], 2);

    let quotes = stored(&remote).items(Collection::Quotes).to_vec();
    let texts: Vec<_> = quotes.iter().map(|q| q["text"].clone()).collect();
    assert_eq!(texts, vec![json!("a"), json!("b")]);
}

#[tokio::test]
async fn failed_write_leaves_the_cache_untouched() {
    let remote = Arc::new(MemoryContents::new());
    let doc = store(&remote, WritePolicy::CheckRevision);
    doc.add_to_collection(Collection::Quotes, json!({"text": "a", "author": "x"}))
        .await
        .unwrap();

    remote.set_failing(true);
    assert!(
        doc.add_to_collection(Collection::Quotes, json!({"text": "b", "author": "y"}))
            .await
            .is_err()
    );
    remote.set_failing(false);

    let cached = doc.fetch().await;
    assert_eq!(cached.items(Collection::Quotes).len(), 1);
    assert_eq!(remote.writes(), 1);
}

#[tokio::test]
async fn update_and_remove_missing_items_fail() {
    let remote = Arc::new(MemoryContents::new());
    let doc = store(&remote, WritePolicy::CheckRevision);
    let err = doc
        .update_in_collection(Collection::Quotes, 9, Map::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentError::NotFound { id: 9, .. }));
    assert!(doc.remove_from_collection(Collection::Users, 9).await.is_err());
}

#[tokio::test]
async fn update_merges_fields_but_keeps_the_id() {
    let remote = Arc::new(MemoryContents::new());
    let doc = store(&remote, WritePolicy::CheckRevision);
    doc.add_to_collection(Collection::Quotes, json!({"text": "a", "author": "x"}))
        .await
        .unwrap();
    let updates = json!({"id": 77, "text": "changed"})
        .as_object()
        .cloned()
        .unwrap();
    let updated = doc
        .update_in_collection(Collection::Quotes, 1, updates)
        .await
        .unwrap();
    assert_eq!(updated["id"], 1);
    assert_eq!(updated["text"], "changed");
    assert_eq!(updated["author"], "x");
    assert!(doc.find_by_id(Collection::Quotes, 77).await.is_none());
}

#[tokio::test]
async fn settings_are_shallow_merged() {
    let remote = Arc::new(MemoryContents::new());
    let doc = store(&remote, WritePolicy::CheckRevision);
    let updates = json!({"require_approval": true}).as_object().cloned().unwrap();
    let settings = doc.update_settings(updates).await.unwrap();
    assert_eq!(settings["require_approval"], true);
    assert_eq!(settings["site_name"], "DarlingX");
    assert_eq!(stored(&remote).section("settings")["require_approval"], true);
}

#[tokio::test]
async fn clear_cache_forces_a_remote_read() {
    let remote = Arc::new(MemoryContents::new());
    let doc = store(&remote, WritePolicy::CheckRevision);
    doc.fetch().await;
    let reads = remote.reads();
    doc.clear_cache().await;
    doc.fetch().await;
    assert_eq!(remote.reads(), reads + 1);
}
