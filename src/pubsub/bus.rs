use std::sync::Arc;

use autometrics::autometrics;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;

use crate::BroadcastTransport;
use crate::ChangeEvent;
use crate::EventHandler;
use crate::Observer;
use crate::Result;
use crate::Settings;
use crate::Topic;
use crate::TopicRegistry;
use crate::API_SLO;
use crate::EVENTS_LOST_TOTAL;
use crate::EVENTS_PUBLISHED_TOTAL;
use crate::EVENT_KV_CHANGE;

/// Cluster-wide change notification bus.
///
/// One explicit instance per process, wired to a transport at
/// construction: incoming broadcast messages of the recognized event type
/// are decoded and handed to the [`EventHandler`]; locally published
/// events go out through the transport, which also loops them back to
/// this node. Constructed per instance so tests can run several
/// independent buses side by side.
pub struct NotificationBus {
    transport: Arc<dyn BroadcastTransport>,
    registry: Arc<TopicRegistry>,
    handler: Arc<EventHandler>,
    settings: Arc<Settings>,
}

impl NotificationBus {
    pub fn new(transport: Arc<dyn BroadcastTransport>, settings: Arc<Settings>) -> Arc<Self> {
        let registry = Arc::new(TopicRegistry::new());
        let handler = Arc::new(EventHandler::new(registry.clone(), settings.bus.clone()));

        let ingress_handler = handler.clone();
        transport.set_ingress(Arc::new(move |event_type: &str, payload: &[u8]| {
            if event_type != EVENT_KV_CHANGE {
                return;
            }
            match ChangeEvent::decode(payload) {
                Ok(event) => ingress_handler.handle(event),
                Err(_) => error!("invalid json: {}", String::from_utf8_lossy(payload)),
            }
        }));

        Arc::new(Self {
            transport,
            registry,
            handler,
            settings,
        })
    }

    /// Join the cluster and start the flush loop. The loop stops when
    /// `cancel` fires.
    pub async fn start(&self, cancel: CancellationToken) -> Result<()> {
        let seeds = self.settings.cluster.peer_seeds.clone();
        if !seeds.is_empty() {
            self.transport.join(&seeds).await?;
            info!("joined notification cluster via {:?}", seeds);
        }

        let handler = self.handler.clone();
        tokio::spawn(async move {
            handler.run_flush(cancel).await;
        });
        Ok(())
    }

    /// Broadcast a change event to the whole cluster. Failures are lost
    /// events, not errors: the affected pollers time out and re-poll
    /// against the revision counter instead.
    #[autometrics(objective = API_SLO)]
    pub async fn publish(&self, event: &ChangeEvent) {
        let payload = match event.encode() {
            Ok(payload) => payload,
            Err(e) => {
                EVENTS_LOST_TOTAL.inc();
                error!("lost event {}: {}", event, e);
                return;
            }
        };
        match self.transport.publish(EVENT_KV_CHANGE, &payload).await {
            Ok(()) => {
                EVENTS_PUBLISHED_TOTAL.inc();
            }
            Err(e) => {
                EVENTS_LOST_TOTAL.inc();
                error!("lost event {}: {}", event, e);
            }
        }
    }

    /// Observe key changes by (key or labels) or (key and labels); the
    /// observer is delivered at most one matching event.
    pub fn observe_once(&self, observer: Observer, topic: &Topic) -> Result<String> {
        self.registry.observe_once(observer, topic)
    }

    /// Deregister an observer whose poll timed out without an event.
    pub fn remove_observer(&self, id: &str, topic: &Topic) -> Result<()> {
        self.registry.remove_observer(id, topic)
    }

    pub fn registry(&self) -> Arc<TopicRegistry> {
        self.registry.clone()
    }

    #[cfg(test)]
    pub(crate) fn handler(&self) -> Arc<EventHandler> {
        self.handler.clone()
    }
}
