use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    /// Store namespace the cache mirrors
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// TTL of entries in the document store. An expired entry is re-fetched
    /// on demand; only the id-set index decides cache hits.
    #[serde(default = "default_doc_ttl_secs")]
    pub doc_ttl_secs: u64,

    /// Bounded lifetime of one watch session before a forced resync
    #[serde(default = "default_watch_session_timeout_secs")]
    pub watch_session_timeout_secs: u64,

    /// Floor interval between refresh-loop iterations
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,

    /// Upper bound on concurrent store fetches during one Search
    #[serde(default = "default_search_fanout_limit")]
    pub search_fanout_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            doc_ttl_secs: default_doc_ttl_secs(),
            watch_session_timeout_secs: default_watch_session_timeout_secs(),
            refresh_interval_ms: default_refresh_interval_ms(),
            search_fanout_limit: default_search_fanout_limit(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(Error::InvalidConfig("cache namespace cannot be empty".into()));
        }
        if self.watch_session_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "watch_session_timeout_secs must be positive".into(),
            ));
        }
        if self.search_fanout_limit == 0 {
            return Err(Error::InvalidConfig(
                "search_fanout_limit must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn doc_ttl(&self) -> Duration {
        Duration::from_secs(self.doc_ttl_secs)
    }

    pub fn watch_session_timeout(&self) -> Duration {
        Duration::from_secs(self.watch_session_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

fn default_namespace() -> String {
    crate::PREFIX_KVS.to_string()
}
fn default_doc_ttl_secs() -> u64 {
    1800
}
fn default_watch_session_timeout_secs() -> u64 {
    3600
}
fn default_refresh_interval_ms() -> u64 {
    1000
}
fn default_search_fanout_limit() -> usize {
    64
}
