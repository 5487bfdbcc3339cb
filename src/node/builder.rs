use std::sync::Arc;

use crate::BroadcastTransport;
use crate::ConfigNode;
use crate::NotificationBus;
use crate::PeerBroadcast;
use crate::PollingCache;
use crate::Result;
use crate::RevisionedCache;
use crate::Settings;
use crate::SledStore;
use crate::Store;

/// Builds a [`ConfigNode`]. Collaborators default to the production
/// pieces (sled store, gRPC peer broadcast) and can be swapped for
/// in-memory ones in tests.
pub struct NodeBuilder {
    settings: Arc<Settings>,
    store: Option<Arc<dyn Store>>,
    transport: Option<Arc<dyn BroadcastTransport>>,
}

impl NodeBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
            store: None,
            transport: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn BroadcastTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<ConfigNode> {
        let settings = self.settings;

        let store = match self.store {
            Some(store) => store,
            None => SledStore::open(&settings.cluster.db_root_dir)?,
        };

        let (transport, peer_endpoint): (Arc<dyn BroadcastTransport>, Option<PeerBroadcast>) =
            match self.transport {
                Some(transport) => (transport, None),
                None => {
                    let peer = PeerBroadcast::new(settings.clone());
                    (Arc::new(peer.clone()), Some(peer))
                }
            };

        let cache = RevisionedCache::new(store.clone(), settings.clone());
        let bus = NotificationBus::new(transport, settings.clone());

        Ok(ConfigNode {
            settings,
            store,
            cache,
            bus,
            polling: Arc::new(PollingCache::new()),
            peer_endpoint,
        })
    }
}
