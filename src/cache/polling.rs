//! Topic-keyed cache of the last long-poll answer. Exchanges space for
//! time: a wakeup can respond with the stored answer instead of re-running
//! the query when nothing moved since.

use dashmap::DashMap;

use crate::SearchResult;

#[derive(Debug, Clone, Default)]
pub struct DbResult {
    pub revision: i64,
    pub kvs: SearchResult,
    /// A stored failure is replayed to readers until overwritten.
    pub error: Option<String>,
}

#[derive(Debug, Default)]
pub struct PollingCache {
    m: DashMap<String, DbResult>,
}

impl PollingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the cached query result for a topic, if any.
    pub fn read(&self, topic: &str) -> Option<DbResult> {
        self.m.get(topic).map(|e| e.value().clone())
    }

    pub fn write(&self, topic: &str, result: DbResult) {
        self.m.insert(topic.to_string(), result);
    }
}
