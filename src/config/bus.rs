use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;
use crate::DEFAULT_EVENT_BATCH_INTERVAL_MS;
use crate::DEFAULT_EVENT_BATCH_SIZE;
use crate::DEFAULT_EVENT_PAYLOAD_LIMIT;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BusConfig {
    /// Fire events on receipt instead of batching. Never retains events;
    /// offers no protection against duplicate bursts.
    #[serde(default)]
    pub immediate: bool,

    /// Pending-event count that triggers an early flush
    #[serde(default = "default_event_batch_size")]
    pub event_batch_size: usize,

    /// Interval between periodic flushes
    #[serde(default = "default_event_batch_interval_ms")]
    pub event_batch_interval_ms: u64,

    /// Broadcast payload ceiling in bytes
    #[serde(default = "default_event_payload_limit")]
    pub event_payload_limit: usize,

    /// Observers older than this are dropped during flush passes. Must
    /// exceed the longest long-poll wait the HTTP layer allows.
    #[serde(default = "default_observer_ttl_secs")]
    pub observer_ttl_secs: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            immediate: false,
            event_batch_size: default_event_batch_size(),
            event_batch_interval_ms: default_event_batch_interval_ms(),
            event_payload_limit: default_event_payload_limit(),
            observer_ttl_secs: default_observer_ttl_secs(),
        }
    }
}

impl BusConfig {
    pub fn validate(&self) -> Result<()> {
        if self.event_batch_size == 0 {
            return Err(Error::InvalidConfig("event_batch_size must be positive".into()));
        }
        if self.event_batch_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "event_batch_interval_ms must be positive".into(),
            ));
        }
        if self.observer_ttl_secs == 0 {
            return Err(Error::InvalidConfig("observer_ttl_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn event_batch_interval(&self) -> Duration {
        Duration::from_millis(self.event_batch_interval_ms)
    }

    pub fn observer_ttl(&self) -> Duration {
        Duration::from_secs(self.observer_ttl_secs)
    }
}

fn default_event_batch_size() -> usize {
    DEFAULT_EVENT_BATCH_SIZE
}
fn default_event_batch_interval_ms() -> u64 {
    DEFAULT_EVENT_BATCH_INTERVAL_MS
}
fn default_event_payload_limit() -> usize {
    DEFAULT_EVENT_PAYLOAD_LIMIT
}
fn default_observer_ttl_secs() -> u64 {
    3600
}
