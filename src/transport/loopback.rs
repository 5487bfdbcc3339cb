//! In-memory broadcast hub. Every transport created from one hub is a
//! cluster member; publishing on any of them delivers synchronously to
//! all of them, the publisher included, mirroring how the gossip layer
//! delivers a node's own user events back to it.

use std::sync::Arc;
use std::sync::Weak;

use parking_lot::RwLock;
use tonic::async_trait;

use super::BroadcastTransport;
use super::IngressHandler;
use crate::Result;
use crate::DEFAULT_EVENT_PAYLOAD_LIMIT;

type MemberList = Arc<RwLock<Vec<Weak<LoopbackTransport>>>>;

#[derive(Default)]
pub struct LoopbackHub {
    members: MemberList,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport registered as a member of this hub.
    pub fn transport(&self, name: &str) -> Arc<LoopbackTransport> {
        let member = Arc::new(LoopbackTransport {
            name: name.to_string(),
            members: self.members.clone(),
            ingress: RwLock::new(None),
        });
        self.members.write().push(Arc::downgrade(&member));
        member
    }
}

pub struct LoopbackTransport {
    name: String,
    members: MemberList,
    ingress: RwLock<Option<IngressHandler>>,
}

impl LoopbackTransport {
    fn deliver(&self, event_type: &str, payload: &[u8]) {
        let ingress = self.ingress.read().clone();
        if let Some(ingress) = ingress {
            ingress(event_type, payload);
        }
    }
}

#[async_trait]
impl BroadcastTransport for LoopbackTransport {
    async fn join(&self, _seeds: &[String]) -> Result<()> {
        // membership was established when the hub created this transport
        Ok(())
    }

    async fn publish(&self, event_type: &str, payload: &[u8]) -> Result<()> {
        if payload.len() > DEFAULT_EVENT_PAYLOAD_LIMIT {
            return Err(crate::TransportError::PayloadExceeded {
                size: payload.len(),
                limit: DEFAULT_EVENT_PAYLOAD_LIMIT,
            }
            .into());
        }
        let members = self.members.read().clone();
        for member in members {
            if let Some(member) = member.upgrade() {
                member.deliver(event_type, payload);
            }
        }
        Ok(())
    }

    fn set_ingress(&self, ingress: IngressHandler) {
        *self.ingress.write() = Some(ingress);
    }

    fn member_name(&self) -> String {
        self.name.clone()
    }
}
