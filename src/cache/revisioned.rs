use std::collections::HashSet;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use autometrics::autometrics;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use moka::sync::Cache as TtlCache;
use tokio::sync::mpsc;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::cache_key;
use crate::utils;
use crate::ConfigDoc;
use crate::RawDoc;
use crate::Result;
use crate::SearchRequest;
use crate::SearchResult;
use crate::Settings;
use crate::Store;
use crate::StoreError;
use crate::WatchAction;
use crate::WatchBatch;
use crate::API_SLO;
use crate::CACHE_HIT_TOTAL;
use crate::CACHE_MISS_TOTAL;
use crate::CACHE_RESYNC_TOTAL;
use crate::WATCH_CHANNEL_SIZE;

/// Ids of every document sharing one cache key.
pub type DocIdSet = HashSet<String>;

/// In-memory mirror of the store, kept current by a list-then-watch loop.
///
/// Two structures back it: the id-set index (cache key -> document ids,
/// authoritative for hit/miss decisions) and a TTL document store (id ->
/// decoded document, refilled on demand). Index entries are only ever
/// emptied, never removed, so a query shape pays the "index not exists"
/// path at most once.
pub struct RevisionedCache {
    store: Arc<dyn Store>,
    settings: Arc<Settings>,
    revision: AtomicI64,
    index: DashMap<String, DocIdSet>,
    docs: TtlCache<String, Arc<ConfigDoc>>,
    fanout: Arc<Semaphore>,
}

impl RevisionedCache {
    pub fn new(store: Arc<dyn Store>, settings: Arc<Settings>) -> Arc<Self> {
        let docs = TtlCache::builder()
            .time_to_live(settings.cache.doc_ttl())
            .build();
        let fanout = Arc::new(Semaphore::new(settings.cache.search_fanout_limit));
        Arc::new(Self {
            store,
            settings,
            revision: AtomicI64::new(0),
            index: DashMap::new(),
            docs,
            fanout,
        })
    }

    /// Refresh loop; runs until `cancel` fires. Every failed cycle resets
    /// the tracked revision so the next cycle rebuilds the mirror with a
    /// full list, with backoff growing across consecutive failures.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("start to list and watch");
        let mut retries = 0usize;
        loop {
            let mut next_period = self.settings.cache.refresh_interval();
            if let Err(e) = self.list_watch(&cancel).await {
                retries += 1;
                CACHE_RESYNC_TOTAL.inc();
                next_period = utils::delay(retries, &self.settings.retry);
                warn!("list and watch cycle failed (attempt {}): {}", retries, e);
            } else {
                retries = 0;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("stop to list and watch");
                    return;
                }
                _ = sleep(next_period) => {}
            }
        }
    }

    pub(crate) async fn list_watch(&self, cancel: &CancellationToken) -> Result<()> {
        let namespace = self.settings.cache.namespace.clone();
        let rsp = match self.store.list(&namespace).await {
            Ok(rsp) => rsp,
            Err(e) => {
                error!(
                    "list namespace {} failed, current rev: {}, err {}",
                    namespace,
                    self.revision.load(Ordering::SeqCst),
                    e
                );
                return Err(e);
            }
        };
        self.revision.store(rsp.revision, Ordering::SeqCst);
        self.cache_put(&rsp.kvs);

        let start_rev = self.revision.load(Ordering::SeqCst);
        let (tx, mut rx) = mpsc::channel(WATCH_CHANNEL_SIZE);
        let watch = self.store.watch(&namespace, start_rev + 1, tx);
        tokio::pin!(watch);
        let session_timeout = self.settings.cache.watch_session_timeout();
        let session = sleep(session_timeout);
        tokio::pin!(session);

        loop {
            tokio::select! {
                res = &mut watch => {
                    // drain anything delivered before the session died
                    while let Ok(batch) = rx.try_recv() {
                        self.apply(batch);
                    }
                    return match res {
                        Ok(()) => Ok(()),
                        Err(e) => {
                            error!(
                                "watch namespace {} failed, start rev: {}+1->{}->0, err {}",
                                namespace,
                                start_rev,
                                self.revision.load(Ordering::SeqCst),
                                e
                            );
                            self.revision.store(0, Ordering::SeqCst);
                            Err(e)
                        }
                    };
                }
                Some(batch) = rx.recv() => {
                    self.apply(batch);
                }
                _ = &mut session => {
                    error!(
                        "watch session on {} expired after {:?}, start rev: {}+1->{}->0",
                        namespace,
                        session_timeout,
                        start_rev,
                        self.revision.load(Ordering::SeqCst),
                    );
                    self.revision.store(0, Ordering::SeqCst);
                    return Err(StoreError::WatchSessionExpired(session_timeout).into());
                }
                _ = cancel.cancelled() => {
                    return Ok(());
                }
            }
        }
    }

    fn apply(&self, batch: WatchBatch) {
        self.revision.store(batch.revision, Ordering::SeqCst);
        match batch.action {
            WatchAction::Put => self.cache_put(&batch.kvs),
            WatchAction::Delete => self.cache_delete(&batch.kvs),
        }
    }

    pub(crate) fn cache_put(&self, kvs: &[RawDoc]) {
        for raw in kvs {
            let doc = match ConfigDoc::decode(raw) {
                Ok(doc) => doc,
                Err(e) => {
                    error!("failed to unmarshal kv, err {}", e);
                    continue;
                }
            };
            let key = cache_key(&doc.domain, &doc.project, &doc.labels);
            let id = doc.id.clone();
            self.docs.insert(id.clone(), Arc::new(doc));
            match self.index.entry(key) {
                Entry::Occupied(mut e) => {
                    e.get_mut().insert(id);
                }
                Entry::Vacant(e) => {
                    info!("cache key {} not exists", e.key());
                    e.insert(DocIdSet::from([id]));
                }
            }
        }
    }

    pub(crate) fn cache_delete(&self, kvs: &[RawDoc]) {
        for raw in kvs {
            let doc = match ConfigDoc::decode(raw) {
                Ok(doc) => doc,
                Err(e) => {
                    error!("failed to unmarshal kv, err {}", e);
                    continue;
                }
            };
            let key = cache_key(&doc.domain, &doc.project, &doc.labels);
            self.docs.invalidate(&doc.id);
            match self.index.get_mut(&key) {
                Some(mut ids) => {
                    ids.remove(&doc.id);
                }
                None => {
                    // the cache may have resynchronized under us
                    error!("cache key {} not exists", key);
                }
            }
        }
    }

    /// Serve an exact-label query from the mirror. Returns `Ok(None)` when
    /// the request is not cache-eligible and the caller must go to the
    /// store directly.
    #[autometrics(objective = API_SLO)]
    pub async fn search(&self, req: &SearchRequest) -> Result<Option<SearchResult>> {
        debug!("using cache to search kv");

        if !req.exact_labels {
            debug!("not an exact-label query, cache does not handle it");
            return Ok(None);
        }

        let key = cache_key(&req.domain, &req.project, &req.labels);
        let ids: Vec<String> = match self.index.entry(key) {
            Entry::Occupied(e) => e.get().iter().cloned().collect(),
            Entry::Vacant(e) => {
                // remember the query shape; an empty id-set answers "no
                // matches" from cache on every later request
                info!("cache key {} not exists", e.key());
                e.insert(DocIdSet::new());
                return Ok(Some(SearchResult::default()));
            }
        };

        let mut found: Vec<Arc<ConfigDoc>> = Vec::with_capacity(ids.len());
        let mut misses: Vec<String> = Vec::new();
        for id in ids {
            match self.docs.get(&id) {
                Some(doc) => {
                    CACHE_HIT_TOTAL.inc();
                    found.push(doc);
                }
                None => {
                    CACHE_MISS_TOTAL.inc();
                    misses.push(id);
                }
            }
        }

        let mut fetches = FuturesUnordered::new();
        for id in misses {
            let store = self.store.clone();
            let fanout = self.fanout.clone();
            let domain = req.domain.clone();
            let project = req.project.clone();
            fetches.push(async move {
                let _permit = fanout.acquire_owned().await.ok()?;
                let raw = match store.get(&domain, &project, &id).await {
                    Ok(raw) => raw,
                    Err(e) => {
                        error!("get kv {} failed: {}", id, e);
                        return None;
                    }
                };
                match ConfigDoc::decode(&raw) {
                    Ok(doc) => Some(Arc::new(doc)),
                    Err(e) => {
                        error!("decode kv {} failed: {}", id, e);
                        None
                    }
                }
            });
        }
        while let Some(fetched) = fetches.next().await {
            if let Some(doc) = fetched {
                self.docs.insert(doc.id.clone(), doc.clone());
                found.push(doc);
            }
        }

        let mut data = Vec::with_capacity(found.len());
        for doc in found {
            if let Some(status) = &req.status {
                if doc.status != *status {
                    continue;
                }
            }
            if let Some(re) = &req.key_regex {
                if !re.is_match(&doc.key) {
                    continue;
                }
            }
            data.push((*doc).clone());
        }
        let total = data.len();
        Ok(Some(SearchResult { data, total }))
    }

    pub fn current_revision(&self) -> i64 {
        self.revision.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn doc_count(&self) -> u64 {
        self.docs.run_pending_tasks();
        self.docs.entry_count()
    }

    #[cfg(test)]
    pub(crate) fn id_set(&self, key: &str) -> Option<DocIdSet> {
        self.index.get(key).map(|e| e.value().clone())
    }

    #[cfg(test)]
    pub(crate) fn evict_doc(&self, id: &str) {
        self.docs.invalidate(&id.to_string());
        self.docs.run_pending_tasks();
    }
}
