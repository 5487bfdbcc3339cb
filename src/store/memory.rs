//! In-memory store: the loopback-cluster and test companion to
//! [`SledStore`]. Mutations bump a single store-wide revision counter,
//! etcd style, and fan out to watch sessions through the hub.

use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tonic::async_trait;
use tracing::debug;

use super::ListResponse;
use super::Store;
use super::WatchAction;
use super::WatchBatch;
use super::WatchHub;
use crate::ConfigDoc;
use crate::RawDoc;
use crate::Result;
use crate::StoreError;
use crate::WATCH_CHANNEL_SIZE;

pub struct MemoryStore {
    docs: DashMap<String, RawDoc>,
    revision: AtomicI64,
    hub: WatchHub,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            docs: DashMap::new(),
            revision: AtomicI64::new(0),
            hub: WatchHub::new(WATCH_CHANNEL_SIZE * 16),
        }
    }

    /// Insert or replace a document, stamping it with the bumped revision.
    pub fn put(&self, doc: &ConfigDoc) -> Result<i64> {
        let rev = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        let mut stamped = doc.clone();
        stamped.update_revision = rev;
        if stamped.create_revision == 0 {
            // preserve the original create revision across overwrites
            stamped.create_revision = self
                .docs
                .get(&stamped.id)
                .and_then(|e| ConfigDoc::decode(e.value()).ok())
                .map(|d| d.create_revision)
                .filter(|r| *r != 0)
                .unwrap_or(rev);
        }
        let raw = stamped.encode()?;
        self.docs.insert(stamped.id.clone(), raw.clone());
        debug!("put doc {} at revision {}", stamped.id, rev);
        self.hub.notify(WatchBatch {
            action: WatchAction::Put,
            kvs: vec![raw],
            revision: rev,
        });
        Ok(rev)
    }

    /// Remove a document by id.
    pub fn delete(&self, id: &str) -> Result<i64> {
        let (_, raw) = self
            .docs
            .remove(id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        let rev = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("deleted doc {} at revision {}", id, rev);
        self.hub.notify(WatchBatch {
            action: WatchAction::Delete,
            kvs: vec![raw],
            revision: rev,
        });
        Ok(rev)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list(&self, _namespace: &str) -> Result<ListResponse> {
        let kvs = self.docs.iter().map(|e| e.value().clone()).collect();
        Ok(ListResponse {
            kvs,
            revision: self.revision.load(Ordering::SeqCst),
        })
    }

    async fn get(&self, _domain: &str, _project: &str, id: &str) -> Result<RawDoc> {
        self.docs
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() }.into())
    }

    async fn watch(
        &self,
        _namespace: &str,
        from_revision: i64,
        sink: mpsc::Sender<WatchBatch>,
    ) -> Result<()> {
        let stream = self.hub.subscribe();

        // replay puts at or after the requested revision, the way a
        // revisioned store serves historical watch windows; duplicates
        // with the live stream are harmless because puts are idempotent
        let replay: Vec<RawDoc> = self
            .docs
            .iter()
            .filter(|e| {
                ConfigDoc::decode(e.value())
                    .map(|d| d.update_revision >= from_revision)
                    .unwrap_or(false)
            })
            .map(|e| e.value().clone())
            .collect();
        if !replay.is_empty() {
            let batch = WatchBatch {
                action: WatchAction::Put,
                kvs: replay,
                revision: self.revision.load(Ordering::SeqCst),
            };
            if sink.send(batch).await.is_err() {
                return Err(StoreError::WatchClosed.into());
            }
        }

        self.hub.forward(stream, from_revision, sink).await
    }

    async fn revision(&self, _domain: &str) -> Result<i64> {
        Ok(self.revision.load(Ordering::SeqCst))
    }
}
