//! Authoritative store contract and the two shipped implementations.
//!
//! The cache consumes stores exclusively through the [`Store`] trait:
//! a revisioned full list, point gets, and a watch primitive that streams
//! mutation batches from a given revision. Documents cross this boundary as
//! raw bytes so decode failures stay skippable at the cache layer.

mod memory;
mod sled_store;
pub use memory::*;
pub use sled_store::*;

#[cfg(test)]
mod memory_test;

use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tonic::async_trait;

#[cfg(test)]
use mockall::automock;
#[cfg(test)]
use mockall::predicate::*;

use crate::RawDoc;
use crate::Result;
use crate::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchAction {
    Put,
    Delete,
}

/// One batch of mutations delivered by a watch session, stamped with the
/// store revision after the mutation.
#[derive(Debug, Clone)]
pub struct WatchBatch {
    pub action: WatchAction,
    pub kvs: Vec<RawDoc>,
    pub revision: i64,
}

/// Full-scan result: every document in the namespace plus the revision the
/// scan observed.
#[derive(Debug, Clone, Default)]
pub struct ListResponse {
    pub kvs: Vec<RawDoc>,
    pub revision: i64,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Scan all documents under a namespace.
    async fn list(&self, namespace: &str) -> Result<ListResponse>;

    /// Raw bytes of one document by id.
    async fn get(&self, domain: &str, project: &str, id: &str) -> Result<RawDoc>;

    /// Stream mutation batches with revision greater than `from_revision`
    /// into `sink`. Returns only when the session dies; the caller bounds
    /// the session lifetime and treats any return as a resync signal.
    async fn watch(
        &self,
        namespace: &str,
        from_revision: i64,
        sink: mpsc::Sender<WatchBatch>,
    ) -> Result<()>;

    /// Current revision for a domain.
    async fn revision(&self, domain: &str) -> Result<i64>;
}

/// Fan-out point between store mutations and watch sessions. Both shipped
/// stores notify it on every mutation; each watch session holds one
/// subscription and forwards into the caller's sink.
#[derive(Debug)]
pub(crate) struct WatchHub {
    tx: broadcast::Sender<WatchBatch>,
}

impl WatchHub {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub(crate) fn notify(&self, batch: WatchBatch) {
        // no live watchers is not an error
        let _ = self.tx.send(batch);
    }

    /// Subscribe before replaying a snapshot so a mutation racing the
    /// replay is seen on the live stream instead of dropping into the gap.
    pub(crate) fn subscribe(&self) -> BroadcastStream<WatchBatch> {
        BroadcastStream::new(self.tx.subscribe())
    }

    pub(crate) async fn forward(
        &self,
        stream: BroadcastStream<WatchBatch>,
        from_revision: i64,
        sink: mpsc::Sender<WatchBatch>,
    ) -> Result<()> {
        let mut stream = stream;
        while let Some(item) = stream.next().await {
            match item {
                Ok(batch) => {
                    if batch.revision < from_revision {
                        continue;
                    }
                    if sink.send(batch).await.is_err() {
                        return Err(StoreError::WatchClosed.into());
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(n)) => {
                    return Err(StoreError::WatchLagged(n).into())
                }
            }
        }
        Err(StoreError::WatchClosed.into())
    }
}
