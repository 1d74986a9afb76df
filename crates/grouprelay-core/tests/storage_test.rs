//! Integration tests for the PostgreSQL group store.
//!
//! These tests need a reachable database in `DATABASE_URL` and are ignored by
//! default. Run them with `cargo test -p grouprelay-core -- --ignored`.

#![allow(clippy::unwrap_used)]

use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use grouprelay_core::{Fragment, GroupKey, GroupStore, PostgresGroupStore, SenderInfo};
use serde_json::json;
use sqlx::PgPool;

async fn store() -> PostgresGroupStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for storage tests");
    let pool = PgPool::connect(&url).await.unwrap();
    let store = PostgresGroupStore::new(pool);
    store.migrate().await.unwrap();
    store
}

fn unique_key(prefix: &str) -> GroupKey {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    GroupKey::new(format!("{prefix}-{nanos}"))
}

fn sender() -> SenderInfo {
    let mut info = SenderInfo::new();
    info.insert("from".to_string(), json!({"id": 42}));
    info
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn migrate_is_idempotent_and_healthy() {
    let store = store().await;
    store.migrate().await.unwrap();
    store.health_check().await.unwrap();
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn append_and_drain_preserve_order() {
    let store = store().await;
    let key = unique_key("order");

    for (i, media) in ["a", "b", "c"].iter().enumerate() {
        let count =
            store.append(&key, Fragment::new(*media, "", i as i64), &sender()).await.unwrap();
        assert_eq!(count, i + 1);
    }

    let record = store.drain(&key).await.unwrap().unwrap();
    let refs: Vec<_> = record.fragments.iter().map(|f| f.media_ref.as_str()).collect();
    assert_eq!(refs, ["a", "b", "c"]);
    assert_eq!(record.sender_info, sender());

    assert!(store.drain(&key).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn marker_expiry_uses_window() {
    let store = store().await;
    let key = unique_key("marker");

    assert!(store.is_quiescence_expired(&key).await.unwrap());

    store.mark_quiescence(&key, Duration::from_millis(300)).await.unwrap();
    assert!(!store.is_quiescence_expired(&key).await.unwrap());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(store.is_quiescence_expired(&key).await.unwrap());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_drains_yield_one_record() {
    let store = Arc::new(store().await);
    let key = unique_key("race");

    for i in 0..5 {
        store.append(&key, Fragment::new(format!("m{i}"), "", i), &sender()).await.unwrap();
    }
    store.mark_quiescence(&key, Duration::from_secs(1)).await.unwrap();

    let drains = (0..8).map(|_| {
        let store = store.clone();
        let key = key.clone();
        tokio::spawn(async move { store.drain(&key).await.unwrap() })
    });

    let records: Vec<_> =
        join_all(drains).await.into_iter().filter_map(|r| r.unwrap()).collect();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].fragments.len(), 5);
    assert!(store.is_quiescence_expired(&key).await.unwrap());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn stale_keys_report_idle_groups() {
    let store = store().await;
    let key = unique_key("stale");

    store.append(&key, Fragment::new("a", "", 1), &sender()).await.unwrap();
    store.mark_quiescence(&key, Duration::from_millis(100)).await.unwrap();

    assert!(!store.stale_keys(Duration::from_millis(200)).await.unwrap().contains(&key));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(store.stale_keys(Duration::from_millis(200)).await.unwrap().contains(&key));

    store.drain(&key).await.unwrap();
}
