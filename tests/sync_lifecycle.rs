//! Integration tests for the feed lifecycle: register, synchronize, resync,
//! export.
//!
//! Feeds are served by a wiremock server and fetched with the real HTTP
//! fetcher and feed-rs extractor. Each test uses its own on-disk SQLite
//! database so concurrent workers get independent connections.

use std::time::Duration;

use planet::export;
use planet::feed::{FeedRsExtractor, FetchOptions, HttpFetcher};
use planet::storage::{Database, Feed, Post, StorageError};
use planet::sync::{ErrorKind, Shutdown, SyncOptions, Synchronizer};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

type TestSync = Synchronizer<HttpFetcher, FeedRsExtractor>;

struct Harness {
    server: MockServer,
    sync: TestSync,
    _dir: TempDir,
}

async fn harness(workers: usize) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("planet.db");
    let db = Database::open(db_path.to_str().unwrap()).await.unwrap();

    let fetcher = HttpFetcher::new(
        reqwest::Client::new(),
        FetchOptions {
            timeout: Duration::from_secs(5),
            max_retries: 0,
            retry_base_delay: Duration::from_millis(10),
            ..FetchOptions::default()
        },
    );
    let options = SyncOptions {
        workers,
        allow_private_hosts: true,
        ..SyncOptions::default()
    };

    Harness {
        server: MockServer::start().await,
        sync: Synchronizer::new(db, fetcher, FeedRsExtractor, options),
        _dir: dir,
    }
}

fn atom(title: &str, entries: &[(&str, &str)]) -> String {
    let body: String = entries
        .iter()
        .map(|(id, entry_title)| {
            format!(
                r#"<entry>
    <id>{id}</id>
    <title>{entry_title}</title>
    <link href="https://blog.example.com/{id}"/>
    <updated>2024-01-01T00:00:00Z</updated>
    <content type="html">{entry_title} body</content>
</entry>"#
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
<title>{title}</title>
<link rel="alternate" href="https://blog.example.com/"/>
<id>urn:feed:{title}</id>
<updated>2024-01-01T00:00:00Z</updated>
<author><name>Jane Doe</name></author>
{body}
</feed>"#
    )
}

async fn serve(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn register(h: &Harness, route: &str, body: String) -> Feed {
    serve(&h.server, route, body).await;
    h.sync
        .register_feed(&format!("{}{}", h.server.uri(), route), None)
        .await
        .unwrap()
}

async fn posts_of(db: &Database, feed_id: i64) -> Vec<Post> {
    db.with_transaction(move |tx| Box::pin(async move { tx.load_posts_by_feed(feed_id).await }))
        .await
        .unwrap()
}

async fn enabled_feeds(db: &Database) -> Vec<Feed> {
    db.with_transaction(|tx| Box::pin(async move { tx.load_enabled_feeds().await }))
        .await
        .unwrap()
}

// ============================================================================
// Synchronization
// ============================================================================

#[tokio::test]
async fn test_first_sync_stores_posts_in_feed_order() {
    let h = harness(2).await;
    let feed = register(&h, "/go.xml", atom("Go Blog", &[("b", "Beta"), ("a", "Alpha")])).await;
    assert!(posts_of(h.sync.database(), feed.id).await.is_empty());

    let report = h
        .sync
        .synchronize_all(enabled_feeds(h.sync.database()).await, Shutdown::never())
        .await;

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(*report.outcomes[0].result.as_ref().unwrap(), 2);

    let posts = posts_of(h.sync.database(), feed.id).await;
    let keys: Vec<&str> = posts.iter().map(|p| p.key.as_str()).collect();
    assert_eq!(keys, vec!["b", "a"]);
    assert_eq!(posts[0].title, "Beta");
    assert_eq!(posts[0].url.as_deref(), Some("https://blog.example.com/b"));
}

#[tokio::test]
async fn test_resync_is_idempotent() {
    let h = harness(2).await;
    let feed = register(&h, "/go.xml", atom("Go Blog", &[("a", "Alpha"), ("b", "Beta")])).await;
    let db = h.sync.database();

    h.sync.synchronize_all(enabled_feeds(db).await, Shutdown::never()).await;
    let first = posts_of(db, feed.id).await;

    let report = h.sync.synchronize_all(enabled_feeds(db).await, Shutdown::never()).await;
    assert_eq!(report.new_posts(), 0);
    assert_eq!(report.succeeded(), 1);

    let second = posts_of(db, feed.id).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_changed_feed_refreshes_known_posts_and_drops_missing() {
    let h = harness(1).await;
    let feed = register(&h, "/go.xml", atom("Go Blog", &[("a", "Old A"), ("gone", "Gone")])).await;
    let db = h.sync.database();

    h.sync.synchronize_all(enabled_feeds(db).await, Shutdown::never()).await;
    let before = posts_of(db, feed.id).await;
    let old_a = before.iter().find(|p| p.key == "a").cloned().unwrap();

    h.server.reset().await;
    serve(&h.server, "/go.xml", atom("Go Blog (new)", &[("a", "New A"), ("b", "B")])).await;

    let report = h.sync.synchronize_all(enabled_feeds(db).await, Shutdown::never()).await;
    assert_eq!(report.new_posts(), 1);

    let after = posts_of(db, feed.id).await;
    assert_eq!(after.len(), 2);
    assert_eq!(after[0].key, "a");
    assert_eq!(after[0].title, "New A");
    assert_eq!(after[0].id, old_a.id);
    assert_eq!(after[0].first_seen, old_a.first_seen);
    assert_eq!(after[1].key, "b");
    assert!(after.iter().all(|p| p.key != "gone"));

    let feed_id = feed.id;
    let refreshed = db
        .with_transaction(move |tx| Box::pin(async move { tx.load_feed(feed_id).await }))
        .await
        .unwrap();
    assert_eq!(refreshed.title, "Go Blog (new)");
    assert!(refreshed.refreshed_at.is_some());
}

#[tokio::test]
async fn test_new_post_at_top_of_feed() {
    let h = harness(1).await;
    let feed = register(&h, "/go.xml", atom("Go Blog", &[("a", "A"), ("b", "B")])).await;
    let db = h.sync.database();
    h.sync.synchronize_all(enabled_feeds(db).await, Shutdown::never()).await;
    let before = posts_of(db, feed.id).await;

    h.server.reset().await;
    serve(&h.server, "/go.xml", atom("Go Blog", &[("c", "C"), ("a", "A"), ("b", "B")])).await;

    for expected_new in [1, 0] {
        let report = h.sync.synchronize_all(enabled_feeds(db).await, Shutdown::never()).await;
        assert_eq!(*report.outcomes[0].result.as_ref().unwrap(), expected_new);
    }

    let after = posts_of(db, feed.id).await;
    let keys: Vec<&str> = after.iter().map(|p| p.key.as_str()).collect();
    assert_eq!(keys, vec!["c", "a", "b"]);
    assert_eq!(after[1].id, before[0].id);
    assert_eq!(after[2].id, before[1].id);
}

fn rss(items: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
<title>Link Blog</title>
<link>https://links.example.com/</link>
{items}
</channel></rss>"#
    )
}

#[tokio::test]
async fn test_guidless_items_are_stable_across_runs() {
    let h = harness(1).await;
    let items = "<item><title>One</title><link>https://links.example.com/1</link></item>\n\
                 <item><title>Two</title><link>https://links.example.com/2</link></item>";
    serve(&h.server, "/links.xml", rss(items)).await;
    let feed = h
        .sync
        .register_feed(&format!("{}/links.xml", h.server.uri()), Some("Link Curator"))
        .await
        .unwrap();
    let db = h.sync.database();

    let first = h.sync.synchronize_all(enabled_feeds(db).await, Shutdown::never()).await;
    assert_eq!(first.new_posts(), 2);
    let second = h.sync.synchronize_all(enabled_feeds(db).await, Shutdown::never()).await;
    assert_eq!(second.new_posts(), 0);

    let posts = posts_of(db, feed.id).await;
    let keys: Vec<&str> = posts.iter().map(|p| p.key.as_str()).collect();
    assert_eq!(keys, vec!["https://links.example.com/1", "https://links.example.com/2"]);

    // An item with neither guid nor link fails the feed and keeps stored posts
    h.server.reset().await;
    serve(&h.server, "/links.xml", rss("<item><title>Anonymous</title></item>")).await;
    let report = h.sync.synchronize_all(enabled_feeds(db).await, Shutdown::never()).await;
    assert_eq!(
        report.outcomes[0].result.as_ref().unwrap_err().kind(),
        ErrorKind::Extraction
    );
    assert_eq!(posts_of(db, feed.id).await, posts);
}

#[tokio::test]
async fn test_empty_feed_removes_all_posts() {
    let h = harness(1).await;
    let feed = register(&h, "/go.xml", atom("Go Blog", &[("a", "A"), ("b", "B")])).await;
    let db = h.sync.database();
    h.sync.synchronize_all(enabled_feeds(db).await, Shutdown::never()).await;
    assert_eq!(posts_of(db, feed.id).await.len(), 2);

    h.server.reset().await;
    serve(&h.server, "/go.xml", atom("Go Blog", &[])).await;

    let report = h.sync.synchronize_all(enabled_feeds(db).await, Shutdown::never()).await;
    assert_eq!(*report.outcomes[0].result.as_ref().unwrap(), 0);
    assert!(posts_of(db, feed.id).await.is_empty());
}

#[tokio::test]
async fn test_second_of_three_feeds_failing_is_isolated() {
    let h = harness(3).await;
    let first = register(&h, "/one.xml", atom("One", &[("1", "One")])).await;
    let second = register(&h, "/two.xml", atom("Two", &[("2", "Two")])).await;
    let third = register(&h, "/three.xml", atom("Three", &[("3", "Three")])).await;
    let db = h.sync.database();

    // The second feed starts failing after registration
    h.server.reset().await;
    serve(&h.server, "/one.xml", atom("One", &[("1", "One")])).await;
    Mock::given(method("GET"))
        .and(path("/two.xml"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&h.server)
        .await;
    serve(&h.server, "/three.xml", atom("Three", &[("3", "Three")])).await;

    let report = h.sync.synchronize_all(enabled_feeds(db).await, Shutdown::never()).await;

    let ids: Vec<i64> = report.outcomes.iter().map(|o| o.feed_id).collect();
    assert_eq!(ids, vec![first.id, second.id, third.id]);
    assert!(report.outcomes[0].is_ok());
    assert_eq!(
        report.outcomes[1].result.as_ref().unwrap_err().kind(),
        ErrorKind::Fetch
    );
    assert!(report.outcomes[2].is_ok());
    assert!(report.to_string().contains("FAIL"));

    assert_eq!(posts_of(db, first.id).await.len(), 1);
    assert!(posts_of(db, second.id).await.is_empty());
    assert_eq!(posts_of(db, third.id).await.len(), 1);
}

#[tokio::test]
async fn test_malformed_document_keeps_previous_posts() {
    let h = harness(1).await;
    let feed = register(&h, "/go.xml", atom("Go Blog", &[("a", "A")])).await;
    let db = h.sync.database();
    h.sync.synchronize_all(enabled_feeds(db).await, Shutdown::never()).await;

    h.server.reset().await;
    serve(&h.server, "/go.xml", "<html>not a feed".to_string()).await;

    let report = h.sync.synchronize_all(enabled_feeds(db).await, Shutdown::never()).await;
    assert_eq!(
        report.outcomes[0].result.as_ref().unwrap_err().kind(),
        ErrorKind::Extraction
    );
    let posts = posts_of(db, feed.id).await;
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].key, "a");
}

#[tokio::test]
async fn test_many_feeds_with_concurrent_workers() {
    let h = harness(4).await;
    let mut feeds = Vec::new();
    for i in 0..8 {
        let entries: Vec<(String, String)> =
            (0..i + 1).map(|j| (format!("f{}-{}", i, j), format!("Post {}", j))).collect();
        let refs: Vec<(&str, &str)> = entries.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
        feeds.push(register(&h, &format!("/feed{}.xml", i), atom(&format!("Feed {}", i), &refs)).await);
    }
    let db = h.sync.database();

    let report = h.sync.synchronize_all(enabled_feeds(db).await, Shutdown::never()).await;

    assert_eq!(report.succeeded(), 8);
    assert_eq!(report.new_posts(), (1..=8).sum::<usize>());
    for (i, feed) in feeds.iter().enumerate() {
        assert_eq!(report.outcomes[i].feed_id, feed.id);
        assert_eq!(posts_of(db, feed.id).await.len(), i + 1);
    }
}

#[tokio::test]
async fn test_disabled_feed_is_not_synchronized() {
    let h = harness(2).await;
    let feed = register(&h, "/go.xml", atom("Go Blog", &[("a", "A")])).await;
    let db = h.sync.database();

    let feed_id = feed.id;
    db.with_transaction(move |tx| Box::pin(async move { tx.set_feed_enabled(feed_id, false).await }))
        .await
        .unwrap();

    assert!(enabled_feeds(db).await.is_empty());
    let report = h.sync.synchronize_all(vec![Feed { enabled: false, ..feed.clone() }], Shutdown::never()).await;
    assert!(report.outcomes.is_empty());
    assert!(posts_of(db, feed.id).await.is_empty());
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_register_reads_metadata_from_feed() {
    let h = harness(1).await;
    let feed = register(&h, "/go.xml", atom("Go Blog", &[])).await;

    assert_eq!(feed.title, "Go Blog");
    assert_eq!(feed.author, "Jane Doe");
    assert_eq!(feed.website_url, "https://blog.example.com/");
    assert!(feed.enabled);
}

#[tokio::test]
async fn test_register_same_url_twice_conflicts() {
    let h = harness(1).await;
    let feed = register(&h, "/go.xml", atom("Go Blog", &[])).await;

    let err = h.sync.register_feed(&feed.url, None).await.unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_register_private_host_rejected_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("planet.db").to_str().unwrap())
        .await
        .unwrap();
    let sync = Synchronizer::new(
        db,
        HttpFetcher::new(reqwest::Client::new(), FetchOptions::default()),
        FeedRsExtractor,
        SyncOptions::default(),
    );

    let err = sync
        .register_feed("http://127.0.0.1:9/feed.xml", None)
        .await
        .unwrap_err();
    assert!(matches!(err, planet::sync::RegisterError::Validation(_)));
}

// ============================================================================
// Export
// ============================================================================

#[tokio::test]
async fn test_generate_after_sync() {
    let h = harness(2).await;
    register(&h, "/go.xml", atom("Go Blog", &[("a", "Alpha")])).await;
    let db = h.sync.database();
    h.sync.synchronize_all(enabled_feeds(db).await, Shutdown::never()).await;

    let out = tempfile::tempdir().unwrap();
    let path = export::write_snapshot(db, out.path()).await.unwrap();

    let value: serde_json::Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
    assert_eq!(value["feeds"][0]["title"], "Go Blog");
    assert_eq!(value["feeds"][0]["posts"][0]["key"], "a");
    assert_eq!(value["feeds"][0]["posts"][0]["title"], "Alpha");
}

#[tokio::test]
async fn test_storage_errors_surface_as_conflicts() {
    let h = harness(1).await;
    let feed = register(&h, "/go.xml", atom("Go Blog", &[])).await;
    let db = h.sync.database();

    let dup = planet::storage::NewFeed {
        url: feed.url.clone(),
        metadata: Default::default(),
        enabled: true,
    };
    let err = db
        .with_transaction(move |tx| Box::pin(async move { tx.insert_feed(&dup).await }))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict(_)));
}
