use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::BusConfig;
use crate::ChangeEvent;
use crate::TopicRegistry;
use crate::EVENTS_DEDUPED_TOTAL;

/// Receives decoded change events off the transport and turns them into
/// observer wakeups.
///
/// In immediate mode every event fires on receipt. In batched mode (the
/// default) events are deduplicated by canonical string into a pending
/// set, drained either when the set reaches the batch size or on the
/// flush interval, whichever comes first. A burst of identical writes
/// then costs one wakeup sweep instead of one per write.
pub struct EventHandler {
    registry: Arc<TopicRegistry>,
    pending: DashMap<String, ChangeEvent>,
    pending_count: AtomicUsize,
    config: BusConfig,
}

impl EventHandler {
    pub fn new(registry: Arc<TopicRegistry>, config: BusConfig) -> Self {
        Self {
            registry,
            pending: DashMap::new(),
            pending_count: AtomicUsize::new(0),
            config,
        }
    }

    /// Entry point for one decoded event.
    pub fn handle(&self, event: ChangeEvent) {
        debug!("kv event: {}", event.key);
        if self.config.immediate {
            // never retain events, not recommended
            self.registry.find_topic_and_fire(&event);
        } else {
            self.merge_and_save(event);
        }
    }

    fn merge_and_save(&self, event: ChangeEvent) {
        let id = event.to_string();
        match self.pending.entry(id) {
            Entry::Occupied(e) => {
                debug!("ignore same event: {}", e.key());
                EVENTS_DEDUPED_TOTAL.inc();
            }
            Entry::Vacant(e) => {
                e.insert(event);
                self.pending_count.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// Drain the pending set, firing every event through topic matching.
    pub(crate) fn fire_events(&self) {
        let ids: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, event)) = self.pending.remove(&id) {
                self.pending_count.fetch_sub(1, Ordering::SeqCst);
                self.registry.find_topic_and_fire(&event);
            }
        }
    }

    /// Periodic flush; also sweeps out observers past their TTL. Runs for
    /// the bus lifetime until cancelled.
    pub async fn run_flush(&self, cancel: CancellationToken) {
        loop {
            if self.pending_count.load(Ordering::SeqCst) >= self.config.event_batch_size {
                self.fire_events();
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = sleep(self.config.event_batch_interval()) => {}
            }
            self.fire_events();
            self.registry.expire_observers(self.config.observer_ttl());
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending_count.load(Ordering::SeqCst)
    }
}
