use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tonic::async_trait;

use super::*;
use crate::ConfigDoc;
use crate::ListResponse;
use crate::MemoryStore;
use crate::MockStore;
use crate::RawDoc;
use crate::Result;
use crate::SearchRequest;
use crate::Settings;
use crate::Store;
use crate::StoreError;
use crate::WatchBatch;

fn settings() -> Arc<Settings> {
    Arc::new(Settings::default())
}

fn raw(json: &str) -> RawDoc {
    json.as_bytes().to_vec()
}

fn exact_request(labels: &[(&str, &str)]) -> SearchRequest {
    SearchRequest {
        domain: "default".to_string(),
        project: "mall".to_string(),
        labels: labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        exact_labels: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn cache_put_should_store_one_doc_per_id() {
    let tests: Vec<(&str, Vec<RawDoc>, u64)> = vec![
        ("put 0 docs, cache should store 0 docs", vec![], 0),
        (
            "put 1 doc, cache should store 1 doc",
            vec![raw(
                r#"{"id":"1", "key":"withFruit", "value":"no", "labels":{"environment":"testing"}}"#,
            )],
            1,
        ),
        (
            "put 2 docs with different ids, cache should store 2 docs",
            vec![
                raw(r#"{"id":"1", "key":"withFruit", "value":"no", "labels":{"environment":"testing"}}"#),
                raw(r#"{"id":"2", "key":"withToys", "value":"yes", "labels":{"environment":"testing"}}"#),
            ],
            2,
        ),
        (
            "put 2 docs with the same id, cache should store 1 doc",
            vec![
                raw(r#"{"id":"1", "key":"withFruit", "value":"no", "labels":{"environment":"testing"}}"#),
                raw(r#"{"id":"1", "key":"withToys", "value":"yes", "labels":{"environment":"testing"}}"#),
            ],
            1,
        ),
    ];

    for (name, kvs, want) in tests {
        let cache = RevisionedCache::new(Arc::new(MemoryStore::new()), settings());
        cache.cache_put(&kvs);
        assert_eq!(cache.doc_count(), want, "{}", name);
    }
}

#[tokio::test]
async fn cache_put_should_skip_malformed_docs() {
    let cache = RevisionedCache::new(Arc::new(MemoryStore::new()), settings());
    cache.cache_put(&[
        raw("{broken json"),
        raw(r#"{"id":"1", "key":"ok", "labels":{"environment":"testing"}}"#),
    ]);
    assert_eq!(cache.doc_count(), 1);
}

#[tokio::test]
async fn cache_delete_should_remove_only_named_ids() {
    let seed = vec![
        raw(r#"{"id":"1", "key":"withFruit", "value":"no", "labels":{"environment":"testing"}}"#),
        raw(r#"{"id":"2", "key":"withToys", "value":"yes", "labels":{"environment":"testing"}}"#),
    ];

    let tests: Vec<(&str, Vec<RawDoc>, u64)> = vec![
        ("delete 0 docs, cache should keep 2 docs", vec![], 2),
        (
            "delete id=1, cache should keep 1 doc",
            vec![raw(
                r#"{"id":"1", "key":"withFruit", "value":"no", "labels":{"environment":"testing"}}"#,
            )],
            1,
        ),
        (
            "delete id=1 and id=2, cache should keep 0 docs",
            vec![
                raw(r#"{"id":"1", "key":"withFruit", "value":"no", "labels":{"environment":"testing"}}"#),
                raw(r#"{"id":"2", "key":"withToys", "value":"yes", "labels":{"environment":"testing"}}"#),
            ],
            0,
        ),
        (
            "delete non-exist id=0, cache should keep 2 docs",
            vec![raw(
                r#"{"id":"0", "key":"withFruit", "value":"no", "labels":{"environment":"testing"}}"#,
            )],
            2,
        ),
    ];

    for (name, kvs, want) in tests {
        let cache = RevisionedCache::new(Arc::new(MemoryStore::new()), settings());
        cache.cache_put(&seed);
        cache.cache_delete(&kvs);
        assert_eq!(cache.doc_count(), want, "{}", name);
    }
}

#[tokio::test]
async fn repeated_put_of_same_doc_is_idempotent() {
    let cache = RevisionedCache::new(Arc::new(MemoryStore::new()), settings());
    let kv = raw(r#"{"id":"1", "key":"withFruit", "labels":{"environment":"testing"}}"#);

    cache.cache_put(std::slice::from_ref(&kv));
    cache.cache_put(std::slice::from_ref(&kv));

    assert_eq!(cache.doc_count(), 1);
    let key = cache_key("", "", &HashMap::from([("environment".to_string(), "testing".to_string())]));
    assert_eq!(cache.id_set(&key).unwrap().len(), 1);
}

#[tokio::test]
async fn delete_on_absent_id_does_not_corrupt_index() {
    let cache = RevisionedCache::new(Arc::new(MemoryStore::new()), settings());
    cache.cache_put(&[raw(
        r#"{"id":"1", "key":"withFruit", "labels":{"environment":"testing"}}"#,
    )]);

    // same labels, unknown id; and a doc under a never-seen cache key
    cache.cache_delete(&[
        raw(r#"{"id":"99", "key":"x", "labels":{"environment":"testing"}}"#),
        raw(r#"{"id":"98", "key":"y", "labels":{"region":"west"}}"#),
    ]);

    let key = cache_key("", "", &HashMap::from([("environment".to_string(), "testing".to_string())]));
    assert!(cache.id_set(&key).unwrap().contains("1"));
    assert_eq!(cache.doc_count(), 1);
}

#[tokio::test]
async fn end_to_end_put_overwrite_delete_scenario() {
    let cache = RevisionedCache::new(Arc::new(MemoryStore::new()), settings());

    cache.cache_put(&[raw(
        r#"{"id":"1", "key":"withFruit", "value":"no", "labels":{"environment":"testing"}}"#,
    )]);
    assert_eq!(cache.doc_count(), 1);

    // same id, different key: overwrites, count stays 1
    cache.cache_put(&[raw(
        r#"{"id":"1", "key":"withToys", "value":"yes", "labels":{"environment":"testing"}}"#,
    )]);
    assert_eq!(cache.doc_count(), 1);

    cache.cache_delete(&[raw(
        r#"{"id":"1", "key":"withToys", "value":"yes", "labels":{"environment":"testing"}}"#,
    )]);
    assert_eq!(cache.doc_count(), 0);
}

#[tokio::test]
async fn search_should_not_handle_greedy_label_queries() {
    let cache = RevisionedCache::new(Arc::new(MemoryStore::new()), settings());
    let mut req = exact_request(&[("app", "mall")]);
    req.exact_labels = false;

    assert!(cache.search(&req).await.unwrap().is_none());
}

#[tokio::test]
async fn search_should_register_unknown_shape_and_answer_empty() {
    let mut mock = MockStore::new();
    mock.expect_get().times(0);
    let cache = RevisionedCache::new(Arc::new(mock), settings());

    let req = exact_request(&[("app", "mall")]);
    let first = cache.search(&req).await.unwrap().unwrap();
    assert_eq!(first.total, 0);

    // the registered empty id-set answers without any store traffic
    let second = cache.search(&req).await.unwrap().unwrap();
    assert_eq!(second.total, 0);
}

#[tokio::test]
async fn search_with_exact_labels_never_returns_supersets_or_subsets() {
    let cache = RevisionedCache::new(Arc::new(MemoryStore::new()), settings());
    cache.cache_put(&[
        raw(r#"{"id":"1", "key":"k1", "domain":"default", "project":"mall", "labels":{"a":"1"}}"#),
        raw(r#"{"id":"2", "key":"k2", "domain":"default", "project":"mall", "labels":{"a":"1","b":"2"}}"#),
        raw(r#"{"id":"3", "key":"k3", "domain":"default", "project":"mall"}"#),
    ]);

    let result = cache
        .search(&exact_request(&[("a", "1")]))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(result.total, 1);
    assert_eq!(result.data[0].id, "1");
}

#[tokio::test]
async fn search_should_backfill_expired_docs_from_store() {
    let store = Arc::new(MemoryStore::new());
    let doc = ConfigDoc {
        id: "1".to_string(),
        key: "withFruit".to_string(),
        domain: "default".to_string(),
        project: "mall".to_string(),
        labels: HashMap::from([("a".to_string(), "1".to_string())]),
        ..Default::default()
    };
    store.put(&doc).unwrap();

    let cache = RevisionedCache::new(store.clone(), settings());
    cache.cache_put(&[store.get("default", "mall", "1").await.unwrap()]);
    cache.evict_doc("1");
    assert_eq!(cache.doc_count(), 0);

    let result = cache
        .search(&exact_request(&[("a", "1")]))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(result.total, 1);
    assert_eq!(result.data[0].id, "1");
    // the fetched doc is written back into the TTL store
    assert_eq!(cache.doc_count(), 1);
}

#[tokio::test]
async fn search_should_omit_ids_whose_fetch_fails() {
    let store = Arc::new(MemoryStore::new());
    let cache = RevisionedCache::new(store.clone(), settings());
    cache.cache_put(&[
        raw(r#"{"id":"1", "key":"k1", "domain":"default", "project":"mall", "labels":{"a":"1"}}"#),
        raw(r#"{"id":"2", "key":"k2", "domain":"default", "project":"mall", "labels":{"a":"1"}}"#),
    ]);
    // only doc 1 exists in the store once the TTL copies are gone
    store
        .put(&ConfigDoc {
            id: "1".to_string(),
            key: "k1".to_string(),
            domain: "default".to_string(),
            project: "mall".to_string(),
            labels: HashMap::from([("a".to_string(), "1".to_string())]),
            ..Default::default()
        })
        .unwrap();
    cache.evict_doc("1");
    cache.evict_doc("2");

    let result = cache
        .search(&exact_request(&[("a", "1")]))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(result.total, 1);
    assert_eq!(result.data[0].id, "1");
}

#[tokio::test]
async fn search_should_apply_status_and_key_filters() {
    let cache = RevisionedCache::new(Arc::new(MemoryStore::new()), settings());
    cache.cache_put(&[
        raw(r#"{"id":"1", "key":"timeout", "domain":"default", "project":"mall", "labels":{"a":"1"}, "status":"enabled"}"#),
        raw(r#"{"id":"2", "key":"timeout", "domain":"default", "project":"mall", "labels":{"a":"1"}, "status":"disabled"}"#),
        raw(r#"{"id":"3", "key":"retries", "domain":"default", "project":"mall", "labels":{"a":"1"}, "status":"enabled"}"#),
    ]);

    let mut req = exact_request(&[("a", "1")]);
    req.status = Some("enabled".to_string());
    req.key_regex = Some(regex::Regex::new("^time").unwrap());

    let result = cache.search(&req).await.unwrap().unwrap();
    assert_eq!(result.total, 1);
    assert_eq!(result.data[0].id, "1");
}

#[tokio::test]
async fn search_fanout_should_be_bounded() {
    struct SlowStore {
        docs: HashMap<String, RawDoc>,
        current: AtomicUsize,
        max_seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Store for SlowStore {
        async fn list(&self, _namespace: &str) -> Result<ListResponse> {
            unimplemented!("not used")
        }

        async fn get(&self, _domain: &str, _project: &str, id: &str) -> Result<RawDoc> {
            let running = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            self.docs
                .get(id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound { id: id.to_string() }.into())
        }

        async fn watch(
            &self,
            _namespace: &str,
            _from_revision: i64,
            _sink: mpsc::Sender<WatchBatch>,
        ) -> Result<()> {
            unimplemented!("not used")
        }

        async fn revision(&self, _domain: &str) -> Result<i64> {
            Ok(0)
        }
    }

    let mut docs = HashMap::new();
    let mut kvs = Vec::new();
    for i in 0..8 {
        let json = format!(
            r#"{{"id":"{i}", "key":"k{i}", "domain":"default", "project":"mall", "labels":{{"a":"1"}}}}"#
        );
        docs.insert(i.to_string(), json.as_bytes().to_vec());
        kvs.push(json.as_bytes().to_vec());
    }

    let max_seen = Arc::new(AtomicUsize::new(0));
    let store = Arc::new(SlowStore {
        docs,
        current: AtomicUsize::new(0),
        max_seen: max_seen.clone(),
    });

    let mut settings = Settings::default();
    settings.cache.search_fanout_limit = 2;
    let cache = RevisionedCache::new(store, Arc::new(settings));
    cache.cache_put(&kvs);
    for i in 0..8 {
        cache.evict_doc(&i.to_string());
    }

    let result = cache
        .search(&exact_request(&[("a", "1")]))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(result.total, 8);
    assert!(max_seen.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn watch_error_should_reset_revision_and_next_cycle_lists_again() {
    let list_calls = Arc::new(AtomicUsize::new(0));
    let list_calls_clone = list_calls.clone();

    let mut mock = MockStore::new();
    mock.expect_list().returning(move |_| {
        list_calls_clone.fetch_add(1, Ordering::SeqCst);
        Ok(ListResponse {
            kvs: vec![],
            revision: 5,
        })
    });
    mock.expect_watch()
        .returning(|_, _, _| Err(StoreError::WatchClosed.into()));

    let cache = RevisionedCache::new(Arc::new(mock), settings());
    let cancel = CancellationToken::new();

    let result = cache.list_watch(&cancel).await;
    assert!(result.is_err());
    assert_eq!(cache.current_revision(), 0);
    assert_eq!(list_calls.load(Ordering::SeqCst), 1);

    // the next cycle rebuilds the mirror with a full list before watching
    let _ = cache.list_watch(&cancel).await;
    assert_eq!(list_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn refresh_loop_should_exit_on_cancellation() {
    let mut mock = MockStore::new();
    mock.expect_list().returning(|_| {
        Ok(ListResponse {
            kvs: vec![],
            revision: 1,
        })
    });
    mock.expect_watch().returning(|_, _, _| {
        // pretend the session died right away
        Err(StoreError::WatchClosed.into())
    });

    let cache = RevisionedCache::new(Arc::new(mock), settings());
    let cancel = CancellationToken::new();

    let runner = cache.clone();
    let cancel_clone = cancel.clone();
    let handle = tokio::spawn(async move {
        runner.run(cancel_clone).await;
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("refresh loop should stop after cancellation")
        .unwrap();
}
