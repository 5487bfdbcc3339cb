use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio::time::Duration;

use super::*;
use crate::ConfigDoc;

fn doc(id: &str, key: &str) -> ConfigDoc {
    ConfigDoc {
        id: id.to_string(),
        key: key.to_string(),
        value: "v".to_string(),
        domain: "default".to_string(),
        project: "mall".to_string(),
        labels: HashMap::from([("env".to_string(), "testing".to_string())]),
        ..Default::default()
    }
}

#[tokio::test]
async fn put_should_bump_revision_monotonically() {
    let store = MemoryStore::new();

    let r1 = store.put(&doc("1", "a")).unwrap();
    let r2 = store.put(&doc("2", "b")).unwrap();

    assert!(r2 > r1);
    assert_eq!(store.revision("default").await.unwrap(), r2);
}

#[tokio::test]
async fn list_should_return_all_docs_and_current_revision() {
    let store = MemoryStore::new();
    store.put(&doc("1", "a")).unwrap();
    store.put(&doc("2", "b")).unwrap();

    let rsp = store.list("kvs").await.unwrap();
    assert_eq!(rsp.kvs.len(), 2);
    assert_eq!(rsp.revision, 2);
}

#[tokio::test]
async fn get_should_return_not_found_for_missing_id() {
    let store = MemoryStore::new();
    assert!(store.get("default", "mall", "nope").await.is_err());
}

#[tokio::test]
async fn delete_missing_doc_should_error_without_bumping_revision() {
    let store = MemoryStore::new();
    store.put(&doc("1", "a")).unwrap();

    assert!(store.delete("nope").is_err());
    assert_eq!(store.revision("default").await.unwrap(), 1);
}

#[tokio::test]
async fn watch_should_stream_mutations_after_from_revision() {
    let store = std::sync::Arc::new(MemoryStore::new());
    store.put(&doc("1", "a")).unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    let watcher = store.clone();
    tokio::spawn(async move {
        let _ = watcher.watch("kvs", 2, tx).await;
    });
    // give the watcher time to subscribe
    tokio::time::sleep(Duration::from_millis(20)).await;

    store.put(&doc("2", "b")).unwrap();
    store.delete("1").unwrap();

    let put = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert_eq!(put.action, WatchAction::Put);
    assert_eq!(put.revision, 2);

    let del = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert_eq!(del.action, WatchAction::Delete);
    assert_eq!(del.revision, 3);
    let deleted = ConfigDoc::decode(&del.kvs[0]).unwrap();
    assert_eq!(deleted.id, "1");
}

#[tokio::test]
async fn put_should_stamp_create_and_update_revisions() {
    let store = MemoryStore::new();
    store.put(&doc("1", "a")).unwrap();
    store.put(&doc("1", "a2")).unwrap();

    let raw = store.get("default", "mall", "1").await.unwrap();
    let stored = ConfigDoc::decode(&raw).unwrap();
    assert_eq!(stored.create_revision, 1);
    assert_eq!(stored.update_revision, 2);
    assert_eq!(stored.key, "a2");
}
