use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::NotificationBus;
use crate::PeerBroadcast;
use crate::PollingCache;
use crate::RevisionedCache;
use crate::Result;
use crate::Settings;
use crate::Store;

pub struct ConfigNode {
    pub settings: Arc<Settings>,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) cache: Arc<RevisionedCache>,
    pub(crate) bus: Arc<NotificationBus>,
    pub(crate) polling: Arc<PollingCache>,
    /// Present when this node runs the gRPC broadcast endpoint itself;
    /// absent when a transport was injected (loopback, tests).
    pub(crate) peer_endpoint: Option<PeerBroadcast>,
}

impl ConfigNode {
    /// Bring the node up: serve the broadcast endpoint, join the cluster,
    /// start the flush loop and the cache refresh loop, then park until
    /// cancellation.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        if let Some(endpoint) = &self.peer_endpoint {
            endpoint.serve(cancel.clone()).await?;
        }

        self.bus.start(cancel.clone()).await?;

        let cache = self.cache.clone();
        let refresh_cancel = cancel.clone();
        tokio::spawn(async move {
            cache.run(refresh_cancel).await;
        });

        info!("node {} is up", self.settings.cluster.member_name());
        cancel.cancelled().await;
        info!("node {} shutting down", self.settings.cluster.member_name());
        Ok(())
    }

    pub fn store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    pub fn cache(&self) -> Arc<RevisionedCache> {
        self.cache.clone()
    }

    pub fn bus(&self) -> Arc<NotificationBus> {
        self.bus.clone()
    }

    pub fn polling_cache(&self) -> Arc<PollingCache> {
        self.polling.clone()
    }
}
