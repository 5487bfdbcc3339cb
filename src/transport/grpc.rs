//! gRPC-backed broadcast transport.
//!
//! Each node runs a small Broadcast endpoint. Joining dials the seed
//! addresses, announces the local member, and merges the member lists the
//! seeds answer with; publishing fans an envelope out to every known
//! member over cached channels. Per-peer failures are logged and dropped,
//! never retried: the layer above treats the whole path as lossy.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tonic::async_trait;
use tonic::transport::Channel;
use tonic::transport::Endpoint;
use tonic::transport::Server;
use tonic::Request;
use tonic::Response;
use tonic::Status;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::proto::broadcast_client::BroadcastClient;
use super::proto::broadcast_server::Broadcast;
use super::proto::broadcast_server::BroadcastServer;
use super::proto::EventEnvelope;
use super::proto::JoinRequest;
use super::proto::Member;
use super::proto::MemberList;
use super::proto::PublishAck;
use super::BroadcastTransport;
use super::IngressHandler;
use crate::utils;
use crate::ClusterConfig;
use crate::Result;
use crate::Settings;
use crate::TransportError;

const JOIN_MAX_RETRIES: usize = 3;

#[derive(Clone)]
pub struct PeerBroadcast {
    inner: Arc<PeerInner>,
}

struct PeerInner {
    local: Member,
    members: ArcSwap<Vec<Member>>,
    channels: DashMap<String, Channel>,
    ingress: RwLock<Option<IngressHandler>>,
    settings: Arc<Settings>,
}

impl PeerBroadcast {
    pub fn new(settings: Arc<Settings>) -> Self {
        let local = Member {
            name: settings.cluster.member_name(),
            address: settings.cluster.peer_address(),
        };
        Self {
            inner: Arc::new(PeerInner {
                members: ArcSwap::from_pointee(vec![local.clone()]),
                local,
                channels: DashMap::new(),
                ingress: RwLock::new(None),
                settings,
            }),
        }
    }

    /// Start the broadcast endpoint; returns once the listener task is
    /// spawned. The server drains when `cancel` fires.
    pub async fn serve(&self, cancel: CancellationToken) -> Result<()> {
        let addr = self.inner.settings.cluster.listen_peer_addr;
        let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
        health_reporter
            .set_serving::<BroadcastServer<BroadcastService>>()
            .await;

        let service = BroadcastServer::new(BroadcastService {
            inner: self.inner.clone(),
        });
        let shutdown = cancel.cancelled_owned();
        info!("broadcast endpoint listening on {}", addr);
        tokio::spawn(async move {
            if let Err(e) = Server::builder()
                .add_service(health_service)
                .add_service(service)
                .serve_with_shutdown(addr, shutdown)
                .await
            {
                error!("broadcast endpoint stopped: {}", e);
            }
        });
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn member_addresses(&self) -> Vec<String> {
        self.inner
            .members
            .load()
            .iter()
            .map(|m| m.address.clone())
            .collect()
    }
}

impl PeerInner {
    async fn connect(addr: &str, settings: &ClusterConfig) -> Result<Channel> {
        Endpoint::try_from(format!("http://{}", addr))
            .map_err(|_| TransportError::InvalidUri(addr.into()))?
            .connect_timeout(Duration::from_millis(settings.connect_timeout_in_ms))
            .timeout(Duration::from_millis(settings.request_timeout_in_ms))
            .connect()
            .await
            .map_err(|err| {
                error!("connect to {} failed: {}", addr, err);
                TransportError::ConnectError.into()
            })
    }

    async fn client(&self, addr: &str) -> Result<BroadcastClient<Channel>> {
        if let Some(channel) = self.channels.get(addr) {
            return Ok(BroadcastClient::new(channel.clone()));
        }
        let channel = Self::connect(addr, &self.settings.cluster).await?;
        self.channels.insert(addr.to_string(), channel.clone());
        Ok(BroadcastClient::new(channel))
    }

    async fn join_seed(&self, seed: &str) -> Result<Vec<Member>> {
        let mut client = self.client(seed).await?;
        let rsp = client
            .join(JoinRequest {
                member: Some(self.local.clone()),
            })
            .await
            .map_err(|s| TransportError::TonicStatusError(Box::new(s)))?;
        Ok(rsp.into_inner().members)
    }

    fn merge_members(&self, incoming: Vec<Member>) {
        self.members.rcu(|current| {
            let mut next = (**current).clone();
            for member in &incoming {
                if !next.iter().any(|m| m.address == member.address) {
                    next.push(member.clone());
                }
            }
            next
        });
    }

    /// One push round so members discovered through a seed also learn
    /// about us without waiting for traffic.
    async fn announce(inner: &Arc<Self>) {
        let members = inner.members.load_full();
        for member in members.iter() {
            if member.address == inner.local.address {
                continue;
            }
            let inner = inner.clone();
            let addr = member.address.clone();
            tokio::spawn(async move {
                match inner.client(&addr).await {
                    Ok(mut client) => {
                        if let Err(e) = client
                            .join(JoinRequest {
                                member: Some(inner.local.clone()),
                            })
                            .await
                        {
                            warn!("announce to {} failed: {}", addr, e);
                        }
                    }
                    Err(e) => warn!("announce to {} failed: {}", addr, e),
                }
            });
        }
    }

    fn deliver_local(&self, event_type: &str, payload: &[u8]) {
        let ingress = self.ingress.read().clone();
        if let Some(ingress) = ingress {
            ingress(event_type, payload);
        }
    }
}

#[async_trait]
impl BroadcastTransport for PeerBroadcast {
    async fn join(&self, seeds: &[String]) -> Result<()> {
        if seeds.is_empty() {
            return Ok(());
        }
        let settings = &self.inner.settings.cluster;
        let mut joined = false;
        for seed in seeds {
            let result = utils::task_with_timeout_and_exponential_backoff(
                || self.inner.join_seed(seed),
                JOIN_MAX_RETRIES,
                Duration::from_millis(settings.connect_timeout_in_ms),
                Duration::from_millis(settings.request_timeout_in_ms),
            )
            .await;
            match result {
                Ok(members) => {
                    self.inner.merge_members(members);
                    joined = true;
                    info!("joined cluster via seed {}", seed);
                }
                Err(e) => warn!("join via seed {} failed: {}", seed, e),
            }
        }
        if !joined {
            return Err(TransportError::JoinFailed(seeds.to_vec()).into());
        }
        PeerInner::announce(&self.inner).await;
        Ok(())
    }

    async fn publish(&self, event_type: &str, payload: &[u8]) -> Result<()> {
        let limit = self.inner.settings.bus.event_payload_limit;
        if payload.len() > limit {
            return Err(TransportError::PayloadExceeded {
                size: payload.len(),
                limit,
            }
            .into());
        }

        // a node always sees its own events
        self.inner.deliver_local(event_type, payload);

        let envelope = EventEnvelope {
            event_type: event_type.to_string(),
            payload: payload.to_vec(),
            origin: self.inner.local.name.clone(),
        };
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let members = inner.members.load_full();
            let mut sends = FuturesUnordered::new();
            for member in members.iter() {
                if member.address == inner.local.address {
                    continue;
                }
                let inner = inner.clone();
                let envelope = envelope.clone();
                let addr = member.address.clone();
                sends.push(async move {
                    match inner.client(&addr).await {
                        Ok(mut client) => {
                            if let Err(e) = client.publish(envelope).await {
                                warn!("publish to {} failed: {}", addr, e);
                                inner.channels.remove(&addr);
                            }
                        }
                        Err(e) => warn!("publish to {} failed: {}", addr, e),
                    }
                });
            }
            while sends.next().await.is_some() {}
        });
        Ok(())
    }

    fn set_ingress(&self, ingress: IngressHandler) {
        *self.inner.ingress.write() = Some(ingress);
    }

    fn member_name(&self) -> String {
        self.inner.local.name.clone()
    }
}

pub(crate) struct BroadcastService {
    inner: Arc<PeerInner>,
}

#[tonic::async_trait]
impl Broadcast for BroadcastService {
    async fn join(
        &self,
        request: Request<JoinRequest>,
    ) -> std::result::Result<Response<MemberList>, Status> {
        if let Some(member) = request.into_inner().member {
            info!("member {} joined via {}", member.name, member.address);
            self.inner.merge_members(vec![member]);
        }
        Ok(Response::new(MemberList {
            members: (*self.inner.members.load_full()).clone(),
        }))
    }

    async fn publish(
        &self,
        request: Request<EventEnvelope>,
    ) -> std::result::Result<Response<PublishAck>, Status> {
        let envelope = request.into_inner();
        self.inner
            .deliver_local(&envelope.event_type, &envelope.payload);
        Ok(Response::new(PublishAck {}))
    }
}
