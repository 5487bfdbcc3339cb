//! Embedded persistent store on sled trees.
//!
//! Documents live in one tree keyed by id; the store-wide revision counter
//! lives in a metadata tree and is bumped inside the same logical mutation.
//! Watch sessions are served from the in-process hub, so a watch only sees
//! mutations made through this handle's lifetime. The cache's list-then-
//! watch protocol never needs historical replay.

use std::path::Path;
use std::sync::Arc;

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

// Sled database tree namespaces
const KVS_TREE: &str = "kvs";
const META_TREE: &str = "meta";
const META_KEY_REVISION: &[u8] = b"revision";

pub struct SledStore {
    #[allow(dead_code)]
    db: sled::Db,
    kvs: sled::Tree,
    meta: sled::Tree,
    hub: WatchHub,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Arc<Self>> {
        let db = sled::open(path)?;
        let kvs = db.open_tree(KVS_TREE)?;
        let meta = db.open_tree(META_TREE)?;
        Ok(Arc::new(Self {
            db,
            kvs,
            meta,
            hub: WatchHub::new(WATCH_CHANNEL_SIZE * 16),
        }))
    }

    fn bump_revision(&self) -> Result<i64> {
        let new = self.meta.update_and_fetch(META_KEY_REVISION, |old| {
            let next = old.map(decode_rev).unwrap_or(0) + 1;
            Some(next.to_be_bytes().to_vec())
        })?;
        Ok(new.as_deref().map(decode_rev).unwrap_or(0))
    }

    fn current_revision(&self) -> Result<i64> {
        Ok(self
            .meta
            .get(META_KEY_REVISION)?
            .as_deref()
            .map(decode_rev)
            .unwrap_or(0))
    }

    /// Insert or replace a document, stamping it with the bumped revision.
    pub fn put(&self, doc: &ConfigDoc) -> Result<i64> {
        let rev = self.bump_revision()?;
        let mut stamped = doc.clone();
        stamped.update_revision = rev;
        if stamped.create_revision == 0 {
            // preserve the original create revision across overwrites
            stamped.create_revision = self
                .kvs
                .get(stamped.id.as_bytes())?
                .and_then(|v| ConfigDoc::decode(&v).ok())
                .map(|d| d.create_revision)
                .filter(|r| *r != 0)
                .unwrap_or(rev);
        }
        let raw = stamped.encode()?;
        self.kvs.insert(stamped.id.as_bytes(), raw.clone())?;
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
        let raw = self
            .kvs
            .remove(id.as_bytes())?
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        let rev = self.bump_revision()?;
        debug!("deleted doc {} at revision {}", id, rev);
        self.hub.notify(WatchBatch {
            action: WatchAction::Delete,
            kvs: vec![raw.to_vec()],
            revision: rev,
        });
        Ok(rev)
    }
}

#[async_trait]
impl Store for SledStore {
    async fn list(&self, _namespace: &str) -> Result<ListResponse> {
        let mut kvs = Vec::new();
        for entry in self.kvs.iter() {
            let (_, value) = entry?;
            kvs.push(value.to_vec());
        }
        Ok(ListResponse {
            kvs,
            revision: self.current_revision()?,
        })
    }

    async fn get(&self, _domain: &str, _project: &str, id: &str) -> Result<RawDoc> {
        self.kvs
            .get(id.as_bytes())?
            .map(|v| v.to_vec())
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
        let mut replay: Vec<RawDoc> = Vec::new();
        for entry in self.kvs.iter() {
            let (_, value) = entry?;
            let keep = ConfigDoc::decode(&value)
                .map(|d| d.update_revision >= from_revision)
                .unwrap_or(false);
            if keep {
                replay.push(value.to_vec());
            }
        }
        if !replay.is_empty() {
            let batch = WatchBatch {
                action: WatchAction::Put,
                kvs: replay,
                revision: self.current_revision()?,
            };
            if sink.send(batch).await.is_err() {
                return Err(StoreError::WatchClosed.into());
            }
        }

        self.hub.forward(stream, from_revision, sink).await
    }

    async fn revision(&self, _domain: &str) -> Result<i64> {
        self.current_revision()
    }
}

fn decode_rev(raw: &[u8]) -> i64 {
    let mut buf = [0u8; 8];
    if raw.len() == 8 {
        buf.copy_from_slice(raw);
    }
    i64::from_be_bytes(buf)
}
