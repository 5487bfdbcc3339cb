//! Cluster membership and best-effort broadcast.
//!
//! The bus treats this layer purely as "unreliable broadcast": join a
//! cluster through seed addresses and fan small payloads out to every
//! live member. No ordering, no exactly-once, no delivery guarantee.
//! Two implementations ship: an in-memory loopback hub for tests and
//! single-node deployments, and a gRPC peer fan-out for real clusters.

mod grpc;
mod loopback;
pub use grpc::*;
pub use loopback::*;


pub(crate) mod proto {
    tonic::include_proto!("labkv.broadcast");
}

use std::sync::Arc;

use tonic::async_trait;

#[cfg(test)]
use mockall::automock;
#[cfg(test)]
use mockall::predicate::*;

use crate::Result;

/// Callback invoked once per delivered broadcast message with the
/// event-type tag and the raw payload.
pub type IngressHandler = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait BroadcastTransport: Send + Sync + 'static {
    /// Join the cluster through one or more seed addresses. An empty seed
    /// list is a single-node cluster and succeeds trivially.
    async fn join(&self, seeds: &[String]) -> Result<()>;

    /// Broadcast a payload to all live members, the local one included.
    /// Best-effort: per-member delivery failures are not reported.
    async fn publish(&self, event_type: &str, payload: &[u8]) -> Result<()>;

    /// Install the receive callback. Messages arriving before this is set
    /// are dropped.
    fn set_ingress(&self, ingress: IngressHandler);

    /// Name this transport identifies itself with to peers.
    fn member_name(&self) -> String;
}
