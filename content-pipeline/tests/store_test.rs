mod common;

use chrono::Utc;
use common::init_tracing;
use content_pipeline::{GenerationHistory, GenerationRecord, QuotaLedger, SqliteStore};
use futures::future::join_all;
use std::sync::Arc;

async fn store() -> SqliteStore {
    SqliteStore::connect("sqlite::memory:").await.unwrap()
}

#[tokio::test]
async fn test_unknown_user_has_initial_quota() {
    init_tracing();

    let store = store().await;
    assert_eq!(store.balance("nobody").await.unwrap().remaining, 0);
    assert!(!store.debit("nobody").await.unwrap());

    let generous = self::store().await.with_initial_quota(2);
    assert_eq!(generous.balance("new").await.unwrap().remaining, 2);
    assert!(generous.debit("new").await.unwrap());

    let balance = generous.balance("new").await.unwrap();
    assert_eq!(balance.remaining, 1);
    assert_eq!(balance.total_used, 1);
}

#[tokio::test]
async fn test_debit_never_goes_negative() {
    init_tracing();

    let store = store().await;
    let balance = store.credit("alice", 2).await.unwrap();
    assert_eq!(balance.remaining, 2);

    assert!(store.debit("alice").await.unwrap());
    assert!(store.debit("alice").await.unwrap());
    assert!(!store.debit("alice").await.unwrap());

    let balance = store.balance("alice").await.unwrap();
    assert_eq!(balance.remaining, 0);
    assert_eq!(balance.total_used, 2);

    let balance = store.credit("alice", 5).await.unwrap();
    assert_eq!(balance.remaining, 5);
    assert_eq!(balance.total_used, 2);
}

#[tokio::test]
async fn test_concurrent_debits_respect_balance() {
    init_tracing();

    let store = Arc::new(store().await);
    store.credit("bob", 3).await.unwrap();

    let debits = (0..10).map(|_| {
        let store = store.clone();
        async move { store.debit("bob").await.unwrap() }
    });
    let granted = join_all(debits).await.into_iter().filter(|ok| *ok).count();

    assert_eq!(granted, 3);
    let balance = store.balance("bob").await.unwrap();
    assert_eq!(balance.remaining, 0);
    assert_eq!(balance.total_used, 3);
}

#[tokio::test]
async fn test_users_are_independent() {
    init_tracing();

    let store = store().await;
    store.credit("alice", 1).await.unwrap();
    store.credit("bob", 1).await.unwrap();

    assert!(store.debit("alice").await.unwrap());
    assert!(!store.debit("alice").await.unwrap());
    assert_eq!(store.balance("bob").await.unwrap().remaining, 1);
}

#[tokio::test]
async fn test_history_newest_first() {
    init_tracing();

    let store = store().await;
    for (i, user) in ["alice", "bob", "alice"].iter().enumerate() {
        store
            .record(GenerationRecord {
                id: format!("gen-{}", i),
                user_id: user.to_string(),
                topic: format!("topic {}", i),
                article_url: format!("https://news.example.com/{}", i),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    let alice = store.recent_for_user("alice", 10).await.unwrap();
    let ids: Vec<&str> = alice.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["gen-2", "gen-0"]);
    assert_eq!(alice[0].article_url, "https://news.example.com/2");

    assert_eq!(store.recent_for_user("alice", 1).await.unwrap().len(), 1);
    assert!(store.recent_for_user("carol", 10).await.unwrap().is_empty());
}
