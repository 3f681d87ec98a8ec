//! Integration tests for the durable key/value store.
//!
//! Exercises the store the way the pipeline does: many concurrent
//! operations sharing one connection, purges under load, and reopening
//! over an existing directory.

use imageforge::store::{DiskStore, StoreConfig, StoreError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Blob {
    label: String,
    payload: Vec<u8>,
}

fn blob(label: &str) -> Blob {
    Blob {
        label: label.to_string(),
        payload: vec![0xAB; 64],
    }
}

fn store_at(root: &TempDir, database: &str, store: &str) -> DiskStore<Blob> {
    DiskStore::new(
        StoreConfig::new(database, store, 1).with_root(root.path().to_path_buf()),
    )
}

#[tokio::test]
async fn heavy_concurrent_traffic_settles_consistently() {
    let root = TempDir::new().unwrap();
    let store = store_at(&root, "db", "records");

    let mut handles = Vec::new();
    for i in 0..32 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let key = format!("key-{}", i);
            store.set(&key, blob(&format!("v{}", i))).await?;
            // Overlapping reads share the same open connection.
            let value = store.get(&key).await?;
            Ok::<Option<Blob>, StoreError>(value)
        }));
    }

    for handle in handles {
        let value = handle.await.unwrap().unwrap();
        assert!(value.is_some());
    }
    assert_eq!(store.len().await.unwrap(), 32);
}

#[tokio::test]
async fn purge_under_interleaved_access_respects_recency() {
    let root = TempDir::new().unwrap();
    let store = store_at(&root, "db", "records");

    for i in 0..6 {
        store
            .set(&format!("key-{}", i), blob(&format!("v{}", i)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // Touch the two oldest; they should now outlive the middle entries.
    store.get("key-0").await.unwrap();
    store.get("key-1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    store.purge(3).await.unwrap();

    assert_eq!(store.len().await.unwrap(), 3);
    for survivor in ["key-0", "key-1", "key-5"] {
        assert!(
            store.get(survivor).await.unwrap().is_some(),
            "{} should have survived",
            survivor
        );
    }
    for evicted in ["key-2", "key-3", "key-4"] {
        assert!(
            store.get(evicted).await.unwrap().is_none(),
            "{} should have been evicted",
            evicted
        );
    }
}

#[tokio::test]
async fn stores_within_one_database_are_isolated() {
    let root = TempDir::new().unwrap();
    let store_a = store_at(&root, "db", "alpha");
    let store_b = store_at(&root, "db", "beta");

    store_a.set("key", blob("alpha")).await.unwrap();
    assert!(store_b.get("key").await.unwrap().is_none());
    assert_eq!(store_b.len().await.unwrap(), 0);
}

#[tokio::test]
async fn reopen_rebuilds_the_index_and_skips_foreign_files() {
    let root = TempDir::new().unwrap();

    {
        let store = store_at(&root, "db", "records");
        for i in 0..4 {
            store
                .set(&format!("key-{}", i), blob(&format!("v{}", i)))
                .await
                .unwrap();
        }
    }

    // Drop unrelated files into the store directory; the reopen scan
    // must not trip over them.
    let dir = root.path().join("db").join("records");
    std::fs::write(dir.join("notes.txt"), "not a record").unwrap();
    std::fs::write(dir.join("broken.entry"), "{ not json").unwrap();

    let reopened = store_at(&root, "db", "records");
    assert_eq!(reopened.len().await.unwrap(), 4);
    for i in 0..4 {
        assert!(reopened.get(&format!("key-{}", i)).await.unwrap().is_some());
    }
}

#[tokio::test]
async fn get_all_matches_individual_gets() {
    let root = TempDir::new().unwrap();
    let store = store_at(&root, "db", "records");

    for i in 0..5 {
        store
            .set(&format!("key-{}", i), blob(&format!("v{}", i)))
            .await
            .unwrap();
    }

    let mut labels: Vec<String> = store
        .get_all()
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.label)
        .collect();
    labels.sort();
    assert_eq!(labels, vec!["v0", "v1", "v2", "v3", "v4"]);
}
